//! Trace, stream class, and event class (§3).
//!
//! These own the [`field_type::Arena`] and [`clock::Registry`] built for a
//! single piece of metadata (one `TraceClass` per CTF trace directory, per
//! §4.B/§9's arena-of-indices design note).

use crate::clock::{ClockClassId, Registry as ClockRegistry};
use crate::field_type::{Arena as FtArena, FieldTypeId};
use crate::value::Value;
use std::collections::HashMap;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct StreamClassId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EventClassId(pub u64);

#[derive(Clone, Debug)]
pub struct EventClass {
    pub id: EventClassId,
    pub name: String,
    pub context_ft: Option<FieldTypeId>,
    pub payload_ft: Option<FieldTypeId>,
}

#[derive(Clone, Debug)]
pub struct StreamClass {
    pub id: StreamClassId,
    pub default_clock_class: Option<ClockClassId>,
    pub packet_context_ft: Option<FieldTypeId>,
    pub event_header_ft: Option<FieldTypeId>,
    pub event_common_context_ft: Option<FieldTypeId>,
    event_classes: HashMap<EventClassId, EventClass>,
    frozen: bool,
}

impl StreamClass {
    pub fn new(id: StreamClassId) -> Self {
        StreamClass {
            id,
            default_clock_class: None,
            packet_context_ft: None,
            event_header_ft: None,
            event_common_context_ft: None,
            event_classes: HashMap::new(),
            frozen: false,
        }
    }

    pub fn event_class(&self, id: EventClassId) -> Option<&EventClass> {
        self.event_classes.get(&id)
    }

    pub fn add_event_class(&mut self, ec: EventClass) -> Result<(), AlreadyUsedError> {
        if self.frozen {
            return Err(AlreadyUsedError);
        }
        self.event_classes.insert(ec.id, ec);
        Ok(())
    }
}

/// Stream/event classes are immutable after first use (§3); attempting to
/// add to one after the trace has started producing messages is a logic
/// error in the caller, not a recoverable runtime condition.
#[derive(Debug, thiserror::Error)]
#[error("stream class is immutable after first use")]
pub struct AlreadyUsedError;

/// Environment fields a trace records about its origin (§3): uuid,
/// hostname, domain, vpid, procname, plus any other metadata-declared
/// key/value pair.
#[derive(Clone, Debug, Default)]
pub struct TraceEnvironment {
    pub uuid: Option<uuid::Uuid>,
    pub hostname: Option<String>,
    pub domain: Option<String>,
    pub vpid: Option<i64>,
    pub procname: Option<String>,
    pub other: HashMap<String, Value>,
}

#[derive(Clone, Debug)]
pub struct Trace {
    pub name: String,
    pub environment: TraceEnvironment,
    pub field_types: FtArena,
    pub clocks: ClockRegistry,
    stream_classes: HashMap<StreamClassId, StreamClass>,
    frozen: bool,
}

impl Trace {
    pub fn new(name: impl Into<String>) -> Self {
        Trace {
            name: name.into(),
            environment: TraceEnvironment::default(),
            field_types: FtArena::new(),
            clocks: ClockRegistry::new(),
            stream_classes: HashMap::new(),
            frozen: false,
        }
    }

    pub fn add_stream_class(&mut self, sc: StreamClass) -> Result<(), AlreadyUsedError> {
        if self.frozen {
            return Err(AlreadyUsedError);
        }
        self.stream_classes.insert(sc.id, sc);
        Ok(())
    }

    pub fn stream_class(&self, id: StreamClassId) -> Option<&StreamClass> {
        self.stream_classes.get(&id)
    }

    pub fn stream_class_mut(&mut self, id: StreamClassId) -> Option<&mut StreamClass> {
        self.stream_classes.get_mut(&id)
    }

    /// Marks the trace (and every stream class it owns) as in-use; called
    /// the first time a message iterator attaches to one of its streams.
    pub fn mark_in_use(&mut self) {
        self.frozen = true;
        for sc in self.stream_classes.values_mut() {
            sc.frozen = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_stream_class(id: u64) -> StreamClass {
        StreamClass {
            id: StreamClassId(id as usize),
            default_clock_class: None,
            packet_context_ft: None,
            event_header_ft: None,
            event_common_context_ft: None,
            event_classes: HashMap::new(),
            frozen: false,
        }
    }

    #[test]
    fn add_event_class_then_freeze_blocks_further_adds() {
        let mut sc = new_stream_class(0);
        sc.add_event_class(EventClass {
            id: EventClassId(1),
            name: "sched_switch".into(),
            context_ft: None,
            payload_ft: None,
        })
        .unwrap();
        assert!(sc.event_class(EventClassId(1)).is_some());

        let mut trace = Trace::new("t");
        trace.add_stream_class(sc).unwrap();
        trace.mark_in_use();

        let sc = trace.stream_class_mut(StreamClassId(0)).unwrap();
        let result = sc.add_event_class(EventClass {
            id: EventClassId(2),
            name: "late".into(),
            context_ft: None,
            payload_ft: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn trace_rejects_stream_class_after_mark_in_use() {
        let mut trace = Trace::new("t");
        trace.mark_in_use();
        assert!(trace.add_stream_class(new_stream_class(0)).is_err());
    }
}
