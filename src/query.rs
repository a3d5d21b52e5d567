//! Synchronous query executor (§4.L): a side-channel RPC into a
//! component class, independent of the graph's own pull scheduling.

use crate::error::ErrorKind;
use crate::types::{Interruptor, LogLevel, RetryDurationUs};
use crate::value::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("component class '{0}' does not expose query object '{1}'")]
    UnknownObject(String, String),

    #[error("query was interrupted before completing")]
    Interrupted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownObject(..) => ErrorKind::NotFound,
            Error::Interrupted => ErrorKind::Interrupted,
        }
    }
}

/// Standard query object names (§4.L).
pub mod objects {
    pub const SUPPORT_INFO: &str = "babeltrace.support-info";
    pub const TRACE_INFOS: &str = "babeltrace.trace-infos";
    pub const SESSIONS: &str = "sessions";
    pub const METADATA_INFO: &str = "metadata-info";
}

/// A component class's query handler: given an object name and params,
/// returns a value, signals retry-later via `Error::Again`, or reports
/// the object is unsupported.
pub trait Queryable {
    fn query(&self, object_name: &str, params: &Value) -> crate::error::Result<Value>;
}

/// Owns the logging level and interrupter shared across queries against
/// one or more component classes, retrying `Again` with the same
/// back-off the graph scheduler uses.
pub struct QueryExecutor {
    interruptor: Interruptor,
    log_level: LogLevel,
    retry_duration: Duration,
}

impl QueryExecutor {
    pub fn new(interruptor: Interruptor, log_level: LogLevel, retry_duration: RetryDurationUs) -> Self {
        QueryExecutor {
            interruptor,
            log_level,
            retry_duration: retry_duration.into(),
        }
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Issues one query, retrying on `Error::Again` until it succeeds,
    /// fails outright, or the interrupter is set.
    pub fn query(&self, class: &dyn Queryable, object_name: &str, params: &Value) -> crate::error::Result<Value> {
        loop {
            if self.interruptor.is_set() {
                return Err(crate::error::Error::Interrupted);
            }
            match class.query(object_name, params) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_again() => {
                    std::thread::sleep(self.retry_duration);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FlakyClass {
        remaining_agains: Cell<u32>,
    }

    impl Queryable for FlakyClass {
        fn query(&self, object_name: &str, _params: &Value) -> crate::error::Result<Value> {
            if object_name != objects::SUPPORT_INFO {
                return Err(crate::error::Error::Query(Error::UnknownObject(
                    "flaky".to_string(),
                    object_name.to_string(),
                )));
            }
            if self.remaining_agains.get() > 0 {
                self.remaining_agains.set(self.remaining_agains.get() - 1);
                return Err(crate::error::Error::Again);
            }
            Ok(Value::f64(0.75))
        }
    }

    #[test]
    fn retries_again_until_success() {
        let exec = QueryExecutor::new(Interruptor::new(), LogLevel::None, RetryDurationUs(1));
        let class = FlakyClass {
            remaining_agains: Cell::new(2),
        };
        let v = exec.query(&class, objects::SUPPORT_INFO, &Value::null()).unwrap();
        assert_eq!(v, Value::f64(0.75));
    }

    #[test]
    fn unknown_object_is_not_retried() {
        let exec = QueryExecutor::new(Interruptor::new(), LogLevel::None, RetryDurationUs(1));
        let class = FlakyClass {
            remaining_agains: Cell::new(0),
        };
        let err = exec.query(&class, "bogus", &Value::null()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn stops_retrying_once_interrupted() {
        let interruptor = Interruptor::new();
        interruptor.set();
        let exec = QueryExecutor::new(interruptor, LogLevel::None, RetryDurationUs(1));
        let class = FlakyClass {
            remaining_agains: Cell::new(5),
        };
        let err = exec.query(&class, objects::SUPPORT_INFO, &Value::null()).unwrap_err();
        assert!(err.is_interrupted());
    }
}
