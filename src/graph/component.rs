//! Component entities (§4.K): `{kind, class, name, log_level, params,
//! user_data}`, plus the `SinkComponent` trait — sink iterators are the
//! only self-driving entities in the cooperative scheduler.

use crate::error::Result;
use crate::types::LogLevel;
use crate::value::Value;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ComponentKind {
    Source,
    Filter,
    Sink,
}

/// Result of driving a sink once (§4.K scheduling).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RunStatus {
    Ok,
    Again,
    End,
}

/// A self-driving sink: `consume` pulls whatever it needs from its
/// connected input ports and does one unit of work. The graph scheduler
/// never inspects what's on the other end of the connection; that's
/// entirely the sink's own wiring (muxer, trimmer, raw stream iterator).
pub trait SinkComponent {
    fn consume(&mut self) -> Result<RunStatus>;

    /// Called once per `add_ports_on_new_stream` opportunity for sinks
    /// that also discover ports dynamically (rare, but the lifecycle
    /// allows it uniformly across component kinds).
    fn add_ports_on_new_stream(&mut self) -> Result<()> {
        Ok(())
    }

    fn finalize(&mut self) {}
}

pub(crate) struct ComponentEntry {
    pub(crate) kind: ComponentKind,
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) log_level: LogLevel,
    pub(crate) params: Value,
    pub(crate) ports: Vec<crate::graph::port::PortId>,
    pub(crate) sink: Option<Box<dyn SinkComponent>>,
    pub(crate) finalized: bool,
}

impl ComponentEntry {
    pub(crate) fn new(kind: ComponentKind, class: impl Into<String>, name: impl Into<String>, log_level: LogLevel, params: Value) -> Self {
        ComponentEntry {
            kind,
            class: class.into(),
            name: name.into(),
            log_level,
            params,
            ports: Vec::new(),
            sink: None,
            finalized: false,
        }
    }
}
