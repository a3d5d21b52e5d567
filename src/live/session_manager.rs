//! Per-connection live session/trace state (§4.M), grounded on
//! `lttng-live.h`'s `lttng_live_session`/`lttng_live_trace` structs and
//! `lttng_live_add_session`/`lttng_live_need_new_streams`.

use crate::clock::ClockClassId;
use crate::error::ErrorKind;
use crate::types::SessionNotFoundAction;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no live sessions matched the requested target and the policy is 'fail'")]
    NoSessionsFound,

    #[error("session {0} was explicitly closed by the relay")]
    SessionClosed(u64),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoSessionsFound => ErrorKind::NotFound,
            Error::SessionClosed(_) => ErrorKind::InvalidState,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MetadataStreamState {
    Needed,
    NotNeeded,
    Closed,
}

pub struct Trace {
    pub id: u64,
    pub metadata_stream_state: MetadataStreamState,
    pub metadata_accumulated: Vec<u8>,
    pub stream_iterator_ids: Vec<u64>,
    pub clock_class: Option<ClockClassId>,
}

impl Trace {
    pub fn new(id: u64) -> Self {
        Trace {
            id,
            metadata_stream_state: MetadataStreamState::Needed,
            metadata_accumulated: Vec::new(),
            stream_iterator_ids: Vec::new(),
            clock_class: None,
        }
    }
}

pub struct Session {
    pub id: u64,
    pub hostname: String,
    pub name: String,
    pub attached: bool,
    pub traces: HashMap<u64, Trace>,
    pub new_streams_needed: bool,
    pub closed: bool,
    pub lazy_stream_msg_init: bool,
}

impl Session {
    pub fn new(id: u64, hostname: impl Into<String>, name: impl Into<String>) -> Self {
        Session {
            id,
            hostname: hostname.into(),
            name: name.into(),
            attached: false,
            traces: HashMap::new(),
            new_streams_needed: true,
            closed: false,
            lazy_stream_msg_init: true,
        }
    }
}

/// Owns every session discovered on one viewer connection and applies
/// the `session_not_found_action` policy when a discovery pass turns up
/// nothing (§4.M).
pub struct SessionManager {
    sessions: HashMap<u64, Session>,
    not_found_action: SessionNotFoundAction,
    discovery_attempts: u64,
}

impl SessionManager {
    pub fn new(not_found_action: SessionNotFoundAction) -> Self {
        SessionManager {
            sessions: HashMap::new(),
            not_found_action,
            discovery_attempts: 0,
        }
    }

    pub fn add_session(&mut self, id: u64, hostname: impl Into<String>, name: impl Into<String>) -> &mut Session {
        self.sessions.entry(id).or_insert_with(|| Session::new(id, hostname, name))
    }

    pub fn session_mut(&mut self, id: u64) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Called after a discovery pass that found zero sessions. Returns
    /// `Ok(true)` when the caller should retry (policy `Continue`),
    /// `Ok(false)` when it should treat the trace as cleanly finished
    /// (policy `End`), or `Err` when it should fail (policy `Fail`).
    pub fn on_zero_sessions_found(&mut self) -> Result<bool, Error> {
        self.discovery_attempts += 1;
        match self.not_found_action {
            SessionNotFoundAction::Continue => Ok(true),
            SessionNotFoundAction::End => Ok(false),
            SessionNotFoundAction::Fail => Err(Error::NoSessionsFound),
        }
    }

    pub fn discovery_attempts(&self) -> u64 {
        self.discovery_attempts
    }

    /// All sessions are done once every one of them is marked closed.
    pub fn all_closed(&self) -> bool {
        !self.sessions.is_empty() && self.sessions.values().all(|s| s.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_policy_keeps_retrying() {
        let mut mgr = SessionManager::new(SessionNotFoundAction::Continue);
        assert_eq!(mgr.on_zero_sessions_found().unwrap(), true);
        assert_eq!(mgr.discovery_attempts(), 1);
    }

    #[test]
    fn end_policy_stops_without_error() {
        let mut mgr = SessionManager::new(SessionNotFoundAction::End);
        assert_eq!(mgr.on_zero_sessions_found().unwrap(), false);
    }

    #[test]
    fn fail_policy_errors() {
        let mut mgr = SessionManager::new(SessionNotFoundAction::Fail);
        assert!(mgr.on_zero_sessions_found().is_err());
    }

    #[test]
    fn all_closed_requires_at_least_one_session() {
        let mgr = SessionManager::new(SessionNotFoundAction::Continue);
        assert!(!mgr.all_closed());
    }

    #[test]
    fn add_session_then_close_marks_all_closed() {
        let mut mgr = SessionManager::new(SessionNotFoundAction::Continue);
        mgr.add_session(1, "host", "my-session");
        assert!(!mgr.all_closed());
        mgr.session_mut(1).unwrap().closed = true;
        assert!(mgr.all_closed());
    }
}
