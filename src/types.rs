//! Small shared newtypes threaded through the graph runtime and the CTF/live
//! medium implementations: the process-wide interrupter flag, the default
//! retry back-off duration, and the log-level/session-policy newtypes used
//! by component params.

use derive_more::{Display, From, Into};
use serde::Deserialize;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;

/// A shared, cloneable cancellation flag. Settable from any thread (e.g. a
/// signal handler) and checked at every I/O boundary and scheduling
/// rotation (§5).
#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct Interruptor(Arc<AtomicBool>);

impl Interruptor {
    pub fn new() -> Self {
        Interruptor(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(SeqCst)
    }
}

impl Default for Interruptor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, From, Into, Display,
)]
#[repr(transparent)]
pub struct RetryDurationUs(pub u64);

impl Default for RetryDurationUs {
    fn default() -> Self {
        // 100ms
        RetryDurationUs(100000)
    }
}

impl FromStr for RetryDurationUs {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RetryDurationUs(s.trim().parse::<u64>()?))
    }
}

impl From<RetryDurationUs> for std::time::Duration {
    fn from(r: RetryDurationUs) -> Self {
        std::time::Duration::from_micros(r.0)
    }
}

/// Component/graph logging verbosity, distinct from the process-wide
/// `tracing` subscriber level: this is a per-component parameter threaded
/// through the query executor and component init.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    #[default]
    None,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "none" => LogLevel::None,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            other => return Err(format!("unknown log level '{other}'")),
        })
    }
}

/// The policy a live session manager applies when zero sessions are found
/// matching the requested target/session name (§4.M).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionNotFoundAction {
    #[default]
    Continue,
    Fail,
    End,
}

impl FromStr for SessionNotFoundAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "continue" => SessionNotFoundAction::Continue,
            "fail" => SessionNotFoundAction::Fail,
            "end" => SessionNotFoundAction::End,
            other => return Err(format!("unknown session-not-found-action '{other}'")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_duration_default_is_100ms() {
        assert_eq!(RetryDurationUs::default().0, 100_000);
        assert_eq!(
            std::time::Duration::from(RetryDurationUs::default()),
            std::time::Duration::from_millis(100)
        );
    }

    #[test]
    fn interruptor_shares_state_across_clones() {
        let a = Interruptor::new();
        let b = a.clone();
        assert!(!a.is_set());
        b.set();
        assert!(a.is_set());
    }

    #[test]
    fn log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("bogus".parse::<LogLevel>().is_err());
    }
}
