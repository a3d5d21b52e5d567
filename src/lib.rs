//! A streaming trace-processing core: a pull-based graph runtime of
//! source/filter/sink components, a CTF binary trace reader, and an
//! LTTng-live network trace source.
//!
//! Conceptually a CTF trace is organized as (from the babeltrace2 docs):
//! * Trace (every physical stream belongs to one logical trace)
//!   - One or more streams (timelines)
//!     * A series of events
//!
//! # Crate layout
//!
//! * [`value`] — the dynamically-typed parameter/config tree threaded
//!   through component params and query results.
//! * [`field_type`] — the CTF field-type arena (integers, floats,
//!   structs, variants, arrays, sequences) with freeze/validate/copy.
//! * [`clock`] — clock classes and cycles-to-nanoseconds conversion.
//! * [`trace_ir`] — trace/stream-class/event-class intermediate
//!   representation built up while reading metadata.
//! * [`message`] — the pulled message sum type and its tie-break order.
//! * [`medium`] — the byte-source abstraction (`request_bytes`/`seek`/
//!   `switch_packet`) a CTF message iterator reads through; [`medium::file`]
//!   implements it over memory-mapped stream files.
//! * [`index`] — the `.idx` packet-index binary format.
//! * [`ctf`] — the TSDL metadata parser, the bit-level packet decoder,
//!   and the per-stream iterator built on top of a [`medium::Medium`].
//! * [`muxer`] — the N-way timestamp merge across stream iterators.
//! * [`trimmer`] — absolute/relative window clipping.
//! * [`graph`] — components, ports, connections, the cooperative
//!   scheduler, and MIP negotiation.
//! * [`query`] — the synchronous side-channel query executor.
//! * [`live`] — the LTTng-live wire protocol, viewer client, and session
//!   manager.
//! * [`error`] — the top-level error type composing every subsystem's
//!   own error enum.
//! * [`config`] — layered runtime configuration.
//! * [`types`] — small shared newtypes ([`types::Interruptor`],
//!   [`types::RetryDurationUs`], [`types::LogLevel`],
//!   [`types::SessionNotFoundAction`]).

#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod ctf;
pub mod error;
pub mod field_type;
pub mod graph;
pub mod index;
pub mod live;
pub mod medium;
pub mod message;
pub mod muxer;
pub mod query;
pub mod trace_ir;
pub mod tracing;
pub mod trimmer;
pub mod types;
pub mod value;
