//! The per-stream iterator (§4.H): owns one medium and one CTF message
//! iterator, tracking liveness state the muxer (§4.I) reads.

use crate::ctf::msg_iter::MsgIter;
use crate::error::{Error as TopError, Result as TopResult};
use crate::medium::Medium;
use crate::message::{ClockSnapshot, Message};
use crate::trace_ir::StreamClassId;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum State {
    ActiveNoData,
    QuiescentNoData,
    Quiescent,
    ActiveData,
    Eof,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PullStatus {
    Ok,
    Again,
    End,
}

/// Owns one medium and the CTF message iterator decoding it (§4.H).
/// `pull` loops internally on whatever a concrete medium treats as a
/// retry-without-suspending condition and only ever returns
/// `Ok`/`Again`/`End` upward, per the retry-loop contract.
pub struct StreamIter<M: Medium> {
    inner: MsgIter<M>,
    state: State,
    last_inactivity_ts: Option<ClockSnapshot>,
    current_inactivity_ts: Option<ClockSnapshot>,
    current_msg: Option<Message>,
    current_msg_ts_ns: Option<i64>,
    has_stream_hung_up: bool,
    viewer_stream_id: Option<u64>,
    ctf_stream_class_id: StreamClassId,
}

impl<M: Medium> StreamIter<M> {
    pub fn new(inner: MsgIter<M>, ctf_stream_class_id: StreamClassId, viewer_stream_id: Option<u64>) -> Self {
        StreamIter {
            inner,
            state: State::ActiveNoData,
            last_inactivity_ts: None,
            current_inactivity_ts: None,
            current_msg: None,
            current_msg_ts_ns: None,
            has_stream_hung_up: false,
            viewer_stream_id,
            ctf_stream_class_id,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ctf_stream_class_id(&self) -> StreamClassId {
        self.ctf_stream_class_id
    }

    pub fn viewer_stream_id(&self) -> Option<u64> {
        self.viewer_stream_id
    }

    pub fn has_stream_hung_up(&self) -> bool {
        self.has_stream_hung_up
    }

    pub fn current_msg_ts_ns(&self) -> Option<i64> {
        self.current_msg_ts_ns
    }

    /// Takes ownership of the currently-fetched message, leaving the
    /// iterator's slot empty (§4.I "clear the winner's slot").
    pub fn take_current_msg(&mut self) -> Option<Message> {
        self.current_msg_ts_ns = None;
        self.current_msg.take()
    }

    pub fn peek_current_msg(&self) -> Option<&Message> {
        self.current_msg.as_ref()
    }

    pub fn has_msg_ready(&self) -> bool {
        self.current_msg.is_some()
    }

    /// Fetches the next message into `current_msg` if the slot is empty.
    /// Returns `End` once the underlying iterator is exhausted and the
    /// slot stays empty, `Again` when the medium would block, `Ok` once a
    /// message is ready (whether freshly fetched or already pending).
    pub fn pull(&mut self) -> TopResult<PullStatus> {
        if self.current_msg.is_some() {
            return Ok(PullStatus::Ok);
        }
        if self.state == State::Eof {
            return Ok(PullStatus::End);
        }
        match self.inner.next_message() {
            Ok(Some(msg)) => {
                self.apply_state_transition(&msg);
                self.current_msg_ts_ns = msg.ts_ns().or(self
                    .current_inactivity_ts
                    .as_ref()
                    .map(|s| s.ts_ns));
                self.current_msg = Some(msg);
                Ok(PullStatus::Ok)
            }
            Ok(None) => {
                self.state = State::Eof;
                self.has_stream_hung_up = true;
                Ok(PullStatus::End)
            }
            Err(TopError::Again) => {
                self.state = State::ActiveNoData;
                Err(TopError::Again)
            }
            Err(e) => Err(e),
        }
    }

    fn apply_state_transition(&mut self, msg: &Message) {
        match msg {
            Message::MsgIteratorInactivity { ts, .. } => {
                self.last_inactivity_ts = self.current_inactivity_ts;
                self.current_inactivity_ts = Some(*ts);
                self.state = State::Quiescent;
            }
            Message::StreamEnd { .. } => {
                self.state = State::Eof;
            }
            _ => {
                self.state = State::ActiveData;
            }
        }
    }
}

/// The capability the muxer (§4.I) pulls through: one buffered "current
/// message" slot plus liveness state. Implemented for [`StreamIter`]
/// against a real medium, and in tests against synthetic sources so the
/// merge/tie-break/monotonicity logic can be exercised without CTF bytes.
pub trait PullSource {
    fn has_msg_ready(&self) -> bool;
    fn pull(&mut self) -> TopResult<PullStatus>;
    fn state(&self) -> State;
    fn current_msg_ts_ns(&self) -> Option<i64>;
    fn peek_current_msg(&self) -> Option<&Message>;
    fn take_current_msg(&mut self) -> Option<Message>;
}

impl<M: Medium> PullSource for StreamIter<M> {
    fn has_msg_ready(&self) -> bool {
        self.has_msg_ready()
    }

    fn pull(&mut self) -> TopResult<PullStatus> {
        self.pull()
    }

    fn state(&self) -> State {
        self.state()
    }

    fn current_msg_ts_ns(&self) -> Option<i64> {
        self.current_msg_ts_ns()
    }

    fn peek_current_msg(&self) -> Option<&Message> {
        self.peek_current_msg()
    }

    fn take_current_msg(&mut self) -> Option<Message> {
        self.take_current_msg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::file::FileMedium;
    use crate::message::StreamId;
    use crate::trace_ir::Trace;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn pull_drains_to_end_on_empty_medium() {
        let f = NamedTempFile::new().unwrap();
        f.as_file().set_len(0).unwrap();
        let medium = FileMedium::open([f.path()]).unwrap();
        let trace = Trace::new("t");
        let msg_iter = MsgIter::new(medium, trace, StreamId(0), StreamClassId(0));
        let mut stream_iter = StreamIter::new(msg_iter, StreamClassId(0), None);

        loop {
            match stream_iter.pull().unwrap() {
                PullStatus::End => break,
                PullStatus::Ok => {
                    stream_iter.take_current_msg();
                }
                PullStatus::Again => panic!("file medium never returns Again"),
            }
        }
        assert_eq!(stream_iter.state(), State::Eof);
        assert!(stream_iter.has_stream_hung_up());
    }

    #[test]
    fn pull_is_idempotent_while_slot_is_full() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 8]).unwrap();
        f.flush().unwrap();
        let medium = FileMedium::open([f.path()]).unwrap();
        let mut trace = Trace::new("t");
        trace
            .add_stream_class(crate::trace_ir::StreamClass::new(StreamClassId(0)))
            .unwrap();
        let msg_iter = MsgIter::new(medium, trace, StreamId(0), StreamClassId(0));
        let mut stream_iter = StreamIter::new(msg_iter, StreamClassId(0), None);

        stream_iter.pull().unwrap();
        assert!(stream_iter.has_msg_ready());
        stream_iter.pull().unwrap();
        assert!(stream_iter.has_msg_ready());
    }
}
