//! Top-level error type for the crate (§7).
//!
//! Each subsystem (value, field_type, medium, ctf::msg_iter, index, live,
//! graph, query, config) defines its own `thiserror`-derived `Error` enum
//! with a `kind()` accessor; this type composes them with
//! `#[error(transparent)]`, which forwards both `Display` and
//! `std::error::Error::source()` so the causal chain built up by each layer
//! survives unflattened up to whatever collaborator (e.g. a CLI) wants to
//! print it top-down.
//!
//! `Again` and `Interrupted` are carved out as their own kind-only variants:
//! per the propagation policy they never chain a cause, they just
//! short-circuit back to the sink's caller.

use thiserror::Error;

/// Distinct, non-string-typed error kinds (§7). Every subsystem error
/// reports one of these via `kind()`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    InvalidState,
    Protocol,
    DecodeMalformed,
    Io,
    ClockOverflow,
    NoMatch,
    Interrupted,
    Again,
    OutOfMemory,
    Unsupported,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] crate::value::Error),

    #[error(transparent)]
    FieldType(#[from] crate::field_type::Error),

    #[error(transparent)]
    Clock(#[from] crate::clock::Error),

    #[error(transparent)]
    Medium(#[from] crate::medium::Error),

    #[error(transparent)]
    Index(#[from] crate::index::Error),

    #[error(transparent)]
    Metadata(#[from] crate::ctf::metadata::Error),

    #[error(transparent)]
    MsgIter(#[from] crate::ctf::msg_iter::Error),

    #[error(transparent)]
    Wire(#[from] crate::live::wire::Error),

    #[error(transparent)]
    Muxer(#[from] crate::muxer::Error),

    #[error(transparent)]
    Trimmer(#[from] crate::trimmer::Error),

    #[error(transparent)]
    Graph(#[from] crate::graph::Error),

    #[error(transparent)]
    LiveSession(#[from] crate::live::session_manager::Error),

    #[error(transparent)]
    Query(#[from] crate::query::Error),

    #[error(transparent)]
    Config(#[from] crate::config::Error),

    #[error("operation would block, retry after the configured back-off")]
    Again,

    #[error("operation was interrupted")]
    Interrupted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Value(e) => e.kind(),
            Error::FieldType(e) => e.kind(),
            Error::Clock(e) => e.kind(),
            Error::Medium(e) => e.kind(),
            Error::Index(e) => e.kind(),
            Error::Metadata(e) => e.kind(),
            Error::MsgIter(e) => e.kind(),
            Error::Wire(e) => e.kind(),
            Error::Muxer(e) => e.kind(),
            Error::Trimmer(e) => e.kind(),
            Error::Graph(e) => e.kind(),
            Error::LiveSession(e) => e.kind(),
            Error::Query(e) => e.kind(),
            Error::Config(e) => e.kind(),
            Error::Again => ErrorKind::Again,
            Error::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub fn is_again(&self) -> bool {
        self.kind() == ErrorKind::Again
    }

    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }

    /// Walks the `std::error::Error::source()` chain top-down, yielding
    /// `self` first. Collaborators (e.g. a CLI) use this to print a causal
    /// chain; the core itself never formats it.
    pub fn causes(&self) -> impl Iterator<Item = &(dyn std::error::Error + 'static)> {
        struct Causes<'a>(Option<&'a (dyn std::error::Error + 'static)>);
        impl<'a> Iterator for Causes<'a> {
            type Item = &'a (dyn std::error::Error + 'static);
            fn next(&mut self) -> Option<Self::Item> {
                let cur = self.0.take()?;
                self.0 = cur.source();
                Some(cur)
            }
        }
        Causes(Some(self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
