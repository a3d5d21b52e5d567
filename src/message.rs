//! The pulled message sum type and its total order for tie-breaking
//! (§3, §5 "Ordering").

use crate::trace_ir::{EventClassId, StreamClassId};

/// Stable identity for the stream a message belongs to, used as the
/// primary tie-break key and to correlate per-stream watermark state in
/// the muxer (§4.I).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct StreamId(pub u64);

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ClockSnapshot {
    pub clock_class: crate::clock::ClockClassId,
    pub cycles: u64,
    pub ts_ns: i64,
}

#[derive(Clone, Debug)]
pub struct EventPayload {
    pub event_class: EventClassId,
    pub ts: Option<ClockSnapshot>,
}

#[derive(Clone, Debug)]
pub enum Message {
    StreamBeginning {
        stream: StreamId,
        stream_class: StreamClassId,
    },
    PacketBeginning {
        stream: StreamId,
        ts: Option<ClockSnapshot>,
    },
    Event {
        stream: StreamId,
        payload: EventPayload,
    },
    DiscardedEvents {
        stream: StreamId,
        count: Option<u64>,
        begin: ClockSnapshot,
        end: ClockSnapshot,
    },
    DiscardedPackets {
        stream: StreamId,
        count: Option<u64>,
        begin: ClockSnapshot,
        end: ClockSnapshot,
    },
    MsgIteratorInactivity {
        stream: StreamId,
        ts: ClockSnapshot,
    },
    PacketEnd {
        stream: StreamId,
        ts: Option<ClockSnapshot>,
    },
    StreamEnd {
        stream: StreamId,
    },
}

impl Message {
    pub fn stream(&self) -> StreamId {
        match self {
            Message::StreamBeginning { stream, .. }
            | Message::PacketBeginning { stream, .. }
            | Message::Event { stream, .. }
            | Message::DiscardedEvents { stream, .. }
            | Message::DiscardedPackets { stream, .. }
            | Message::MsgIteratorInactivity { stream, .. }
            | Message::PacketEnd { stream, .. }
            | Message::StreamEnd { stream } => *stream,
        }
    }

    /// `msg_ts_ns`: the timestamp the muxer sorts on. Messages with no
    /// timestamp (stream/packet boundaries with no clock, `StreamEnd`)
    /// inherit the stream's last known `ts_ns` at the call site — the
    /// muxer supplies that externally since `Message` itself is
    /// timestamp-agnostic for boundary variants.
    pub fn ts_ns(&self) -> Option<i64> {
        match self {
            Message::StreamBeginning { .. } | Message::StreamEnd { .. } => None,
            Message::PacketBeginning { ts, .. } | Message::PacketEnd { ts, .. } => {
                ts.as_ref().map(|s| s.ts_ns)
            }
            Message::Event { payload, .. } => payload.ts.as_ref().map(|s| s.ts_ns),
            Message::DiscardedEvents { end, .. } | Message::DiscardedPackets { end, .. } => {
                Some(end.ts_ns)
            }
            Message::MsgIteratorInactivity { ts, .. } => Some(ts.ts_ns),
        }
    }

    /// Priority used as the second tie-break key (§5 "Ordering"): lower
    /// sorts first.
    fn kind_priority(&self) -> u8 {
        match self {
            Message::StreamBeginning { .. } => 0,
            Message::PacketBeginning { .. } => 1,
            Message::Event { .. } => 2,
            Message::DiscardedEvents { .. } => 3,
            Message::DiscardedPackets { .. } => 4,
            Message::MsgIteratorInactivity { .. } => 5,
            Message::PacketEnd { .. } => 6,
            Message::StreamEnd { .. } => 7,
        }
    }
}

/// Total order over `(msg_ts_ns, stream_id, kind_priority, stream pointer
/// identity)` (§5). The muxer is expected to have already compared
/// `msg_ts_ns` upstream; this compares the remaining tie-break keys given
/// two messages already known to share a timestamp. Returns
/// `std::cmp::Ordering` plus whether the tie-break bottomed out at the
/// unstable pointer-identity step (caller logs a warning when it has).
pub fn compare_messages(
    a: &Message,
    a_identity: usize,
    b: &Message,
    b_identity: usize,
) -> (std::cmp::Ordering, bool) {
    use std::cmp::Ordering;

    match a.stream().0.cmp(&b.stream().0) {
        Ordering::Equal => {}
        other => return (other, false),
    }
    match a.kind_priority().cmp(&b.kind_priority()) {
        Ordering::Equal => {}
        other => return (other, false),
    }
    (a_identity.cmp(&b_identity), a_identity != b_identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockClassId;

    fn snap(ts_ns: i64) -> ClockSnapshot {
        ClockSnapshot {
            clock_class: ClockClassId(0),
            cycles: 0,
            ts_ns,
        }
    }

    #[test]
    fn stream_id_is_primary_tie_break() {
        let a = Message::StreamBeginning {
            stream: StreamId(1),
            stream_class: StreamClassId(0),
        };
        let b = Message::StreamBeginning {
            stream: StreamId(2),
            stream_class: StreamClassId(0),
        };
        let (ord, _) = compare_messages(&a, 0, &b, 0);
        assert_eq!(ord, std::cmp::Ordering::Less);
    }

    #[test]
    fn kind_priority_breaks_same_stream_ties() {
        let a = Message::StreamBeginning {
            stream: StreamId(1),
            stream_class: StreamClassId(0),
        };
        let b = Message::PacketBeginning {
            stream: StreamId(1),
            ts: Some(snap(10)),
        };
        let (ord, unstable) = compare_messages(&a, 0, &b, 0);
        assert_eq!(ord, std::cmp::Ordering::Less);
        assert!(!unstable);
    }

    #[test]
    fn identity_tie_break_is_flagged_unstable() {
        let a = Message::StreamEnd { stream: StreamId(1) };
        let b = Message::StreamEnd { stream: StreamId(1) };
        let (_, unstable) = compare_messages(&a, 1, &b, 2);
        assert!(unstable);
    }

    #[test]
    fn event_ts_ns_reads_through_payload() {
        let m = Message::Event {
            stream: StreamId(0),
            payload: EventPayload {
                event_class: EventClassId(3),
                ts: Some(snap(123)),
            },
        };
        assert_eq!(m.ts_ns(), Some(123));
    }
}
