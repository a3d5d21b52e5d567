//! CTF-specific machinery: TSDL metadata, the packet message iterator,
//! and the per-stream iterator wrapping it (§4.B supplement, §4.G, §4.H).

pub mod metadata;
pub mod msg_iter;
pub mod stream_iter;
