//! The pull byte-source capability the CTF message iterator decodes
//! against (§4.D). [`crate::medium::file`] implements it over a
//! memory-mapped stream file group; [`crate::live::viewer_client`]'s
//! consumer implements it over the LTTng-live wire protocol.

pub mod file;

use crate::error::ErrorKind;
use crate::trace_ir::StreamClassId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("medium I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation not supported by this medium")]
    Unsupported,

    #[error("stream class {requested:?} does not match the medium's bound stream class {bound:?}")]
    StreamClassMismatch {
        bound: StreamClassId,
        requested: StreamClassId,
    },

    #[error("seek offset {0} is out of range for this medium")]
    SeekOutOfRange(u64),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Unsupported => ErrorKind::Unsupported,
            Error::StreamClassMismatch { .. } => ErrorKind::InvalidState,
            Error::SeekOutOfRange(_) => ErrorKind::InvalidArgument,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Status {
    Ok,
    Eof,
    Again,
}

/// A resolved association between a stream class and a concrete logical
/// stream; `borrow_stream` fails if a medium is asked to serve a second,
/// different stream class (§4.D point 4).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct StreamHandle {
    pub stream_class: StreamClassId,
    pub stream_id: u64,
}

/// The pull byte source the CTF message iterator (§4.G) decodes against.
///
/// `request_bytes` fills an internal buffer and returns its length;
/// callers read it back via [`Medium::buffer`]. The buffer is only valid
/// until the next `request_bytes`/`seek`/`switch_packet` call, mirroring
/// the borrow rule in §4.D.1.
pub trait Medium {
    /// Fills the internal buffer with up to `max` bytes starting at the
    /// current offset. `Status::Ok` guarantees `1..=max` bytes are now in
    /// [`Medium::buffer`].
    fn request_bytes(&mut self, max: usize) -> Result<Status, Error>;

    /// The bytes most recently filled by `request_bytes`.
    fn buffer(&self) -> &[u8];

    /// Absolute byte offset within the logical byte stream, optional.
    fn seek(&mut self, _absolute_offset: u64) -> Result<Status, Error> {
        Err(Error::Unsupported)
    }

    /// Hints that the next `request_bytes` must return bytes starting at
    /// the next packet boundary; used by multi-file stream groups.
    fn switch_packet(&mut self) -> Result<Status, Error> {
        Err(Error::Unsupported)
    }

    /// Resolves the target logical stream for a packet header. A medium
    /// bound to stream class X asked to resolve stream class Y is an
    /// error (§4.D point 4).
    fn borrow_stream(
        &mut self,
        stream_class: StreamClassId,
        stream_id: u64,
    ) -> Result<StreamHandle, Error>;
}
