//! Trims an upstream message sequence to an absolute nanosecond window
//! (§4.J), parsing `begin`/`end` bounds the way the ambient stack already
//! parses timestamp-adjacent CLI input: via `chrono`.

use crate::clock::ClockClassId;
use crate::error::ErrorKind;
use crate::message::{ClockSnapshot, Message, StreamId};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed trim bound '{0}': not a recognised absolute or relative timestamp")]
    BadBound(String),

    #[error("trim window end ({end}) is before its begin ({begin})")]
    EndBeforeBegin { begin: i64, end: i64 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// One endpoint of a trim window: either an absolute date-time (parsed
/// via `chrono`, optionally GMT) or a relative offset in seconds from
/// the stream's own first timestamp, resolved once that's known.
#[derive(Copy, Clone, Debug)]
pub enum Bound {
    AbsoluteNs(i64),
    RelativeSeconds(f64),
}

/// Parses a bound string. Accepts RFC 3339 (`2024-01-01T00:00:00Z`),
/// `YYYY-MM-DD HH:MM:SS[.fffffffff]` (interpreted as UTC when `gmt` is
/// true, otherwise as a naive local-offset-less timestamp), or a bare
/// `[+-]?[0-9]+(\.[0-9]+)?` relative-seconds offset.
pub fn parse_bound(s: &str, gmt: bool) -> Result<Bound, Error> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Bound::AbsoluteNs(dt.timestamp_nanos_opt().unwrap_or(0)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        let ns = if gmt {
            DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
                .timestamp_nanos_opt()
                .unwrap_or(0)
        } else {
            naive.and_utc().timestamp_nanos_opt().unwrap_or(0)
        };
        return Ok(Bound::AbsoluteNs(ns));
    }
    if let Ok(secs) = s.parse::<f64>() {
        return Ok(Bound::RelativeSeconds(secs));
    }
    Err(Error::BadBound(s.to_string()))
}

#[derive(Default)]
struct StreamTrimState {
    sent_begin_inactivity: bool,
    ended: bool,
}

/// Clips an upstream message sequence to `[begin_ns, end_ns]` (either
/// bound optional meaning unbounded), synthesising boundary messages per
/// §4.J's ordering: inactivity at window start (once per stream), then
/// stream messages, then final inactivity at window end.
pub struct Trimmer {
    begin_ns: Option<i64>,
    end_ns: Option<i64>,
    clock_class: ClockClassId,
    stream_state: std::collections::HashMap<u64, StreamTrimState>,
    ended_streams: HashSet<u64>,
    emitted_final_inactivity: bool,
}

impl Trimmer {
    pub fn new(begin_ns: Option<i64>, end_ns: Option<i64>, clock_class: ClockClassId) -> Result<Self, Error> {
        if let (Some(b), Some(e)) = (begin_ns, end_ns) {
            if e < b {
                return Err(Error::EndBeforeBegin { begin: b, end: e });
            }
        }
        Ok(Trimmer {
            begin_ns,
            end_ns,
            clock_class,
            stream_state: std::collections::HashMap::new(),
            ended_streams: HashSet::new(),
            emitted_final_inactivity: false,
        })
    }

    /// Processes one upstream message, returning zero or more output
    /// messages (boundary synthesis can expand one input into several).
    pub fn process(&mut self, msg: Message) -> Vec<Message> {
        let stream = msg.stream();
        let ts_ns = msg.ts_ns();

        if let Some(ts) = ts_ns {
            if let Some(begin) = self.begin_ns {
                if ts < begin {
                    return Vec::new();
                }
            }
            if let Some(end) = self.end_ns {
                if ts > end {
                    self.ended_streams.insert(stream.0);
                    return Vec::new();
                }
            }
        }

        let mut out = Vec::new();
        let state = self.stream_state.entry(stream.0).or_default();
        if !state.sent_begin_inactivity {
            if let Some(begin) = self.begin_ns {
                out.push(Message::MsgIteratorInactivity {
                    stream,
                    ts: ClockSnapshot {
                        clock_class: self.clock_class,
                        cycles: 0,
                        ts_ns: begin,
                    },
                });
            }
            state.sent_begin_inactivity = true;
        }

        if matches!(msg, Message::StreamEnd { .. }) {
            state.ended = true;
        }
        out.push(msg);
        out
    }

    /// Call once the upstream is exhausted: emits the final inactivity
    /// message at the window end for every stream that hadn't already
    /// ended (§4.J ordering, last step).
    pub fn finalize(&mut self) -> Vec<Message> {
        if self.emitted_final_inactivity {
            return Vec::new();
        }
        self.emitted_final_inactivity = true;
        let Some(end) = self.end_ns else {
            return Vec::new();
        };
        self.stream_state
            .iter()
            .filter(|(_, s)| !s.ended)
            .map(|(&id, _)| Message::MsgIteratorInactivity {
                stream: StreamId(id),
                ts: ClockSnapshot {
                    clock_class: self.clock_class,
                    cycles: 0,
                    ts_ns: end,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(stream: u64, ts_ns: i64) -> Message {
        Message::PacketBeginning {
            stream: StreamId(stream),
            ts: Some(ClockSnapshot {
                clock_class: ClockClassId(0),
                cycles: 0,
                ts_ns,
            }),
        }
    }

    #[test]
    fn drops_messages_outside_window() {
        let mut t = Trimmer::new(Some(100), Some(200), ClockClassId(0)).unwrap();
        assert!(t.process(event(0, 50)).is_empty());
        assert!(!t.process(event(0, 150)).is_empty());
        assert!(t.process(event(0, 250)).is_empty());
    }

    #[test]
    fn emits_begin_inactivity_once_per_stream() {
        let mut t = Trimmer::new(Some(100), Some(200), ClockClassId(0)).unwrap();
        let out1 = t.process(event(0, 150));
        assert_eq!(out1.len(), 2);
        assert!(matches!(out1[0], Message::MsgIteratorInactivity { .. }));
        let out2 = t.process(event(0, 160));
        assert_eq!(out2.len(), 1);
    }

    #[test]
    fn finalize_emits_end_inactivity_for_unfinished_streams() {
        let mut t = Trimmer::new(Some(100), Some(200), ClockClassId(0)).unwrap();
        t.process(event(0, 150));
        let final_msgs = t.finalize();
        assert_eq!(final_msgs.len(), 1);
        assert!(matches!(final_msgs[0], Message::MsgIteratorInactivity { ts, .. } if ts.ts_ns == 200));
    }

    #[test]
    fn rejects_end_before_begin() {
        assert!(matches!(
            Trimmer::new(Some(200), Some(100), ClockClassId(0)),
            Err(Error::EndBeforeBegin { .. })
        ));
    }

    #[test]
    fn parses_relative_and_rfc3339_bounds() {
        assert!(matches!(parse_bound("5.5", false), Ok(Bound::RelativeSeconds(_))));
        assert!(matches!(
            parse_bound("2024-01-01T00:00:00Z", false),
            Ok(Bound::AbsoluteNs(_))
        ));
        assert!(parse_bound("not-a-timestamp", false).is_err());
    }
}
