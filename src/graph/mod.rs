//! The graph runtime (§4.K): components, ports, connections, a
//! single-threaded cooperative scheduler, MIP negotiation, and a
//! glob-matched auto-connect listener for ports added at runtime.

pub mod component;
pub mod connection;
pub mod mip;
pub mod port;

use crate::error::{Error as TopError, ErrorKind, Result as TopResult};
use crate::types::{Interruptor, LogLevel};
use crate::value::Value;
use component::{ComponentEntry, ComponentKind, RunStatus, SinkComponent};
use connection::Connection;
use glob::Pattern;
use port::{ComponentId, ConnectionId, Direction, MessageIterator, Port, PortId};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("component name '{0}' is already in use in this graph")]
    DuplicateComponentName(String),

    #[error("port name '{0}' is already in use on component '{1}'")]
    DuplicatePortName(String, String),

    #[error("port {0:?} has the wrong direction for this operation")]
    WrongDirection(PortId),

    #[error("output port {0:?} already has a connection")]
    OutPortAlreadyConnected(PortId),

    #[error("input port {0:?} already has a connection")]
    InPortAlreadyConnected(PortId),

    #[error("connecting {upstream:?} to {downstream:?} violates the source/filter/sink type rule")]
    TypeMismatch { upstream: PortId, downstream: PortId },

    #[error("unknown port {0:?}")]
    UnknownPort(PortId),

    #[error("unknown component {0:?}")]
    UnknownComponent(ComponentId),

    #[error("auto-connect glob pattern '{0}' is malformed: {1}")]
    BadGlob(String, glob::PatternError),

    #[error("port-added listener failed while attaching {0:?}: {1}")]
    ListenerFailed(PortId, String),

    #[error(transparent)]
    Mip(#[from] mip::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateComponentName(_) | Error::DuplicatePortName(..) => ErrorKind::AlreadyExists,
            Error::WrongDirection(_)
            | Error::OutPortAlreadyConnected(_)
            | Error::InPortAlreadyConnected(_)
            | Error::TypeMismatch { .. }
            | Error::BadGlob(..) => ErrorKind::InvalidArgument,
            Error::UnknownPort(_) | Error::UnknownComponent(_) => ErrorKind::NotFound,
            Error::ListenerFailed(..) => ErrorKind::InvalidState,
            Error::Mip(e) => e.kind(),
        }
    }
}

/// One auto-connect rule: an output port whose `component:port` matches
/// `out_glob` is attached to the first as-yet-unconnected input port
/// whose `component:port` matches `in_glob` (§4.K "Port-added listener").
struct AutoConnectRule {
    out_glob: Pattern,
    in_glob: Pattern,
}

pub struct Graph {
    components: Vec<ComponentEntry>,
    ports: Vec<Port>,
    connections: Vec<Connection>,
    auto_connect_rules: Vec<AutoConnectRule>,
    interruptor: Interruptor,
    again_sleep: Duration,
    mip_version: u32,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            components: Vec::new(),
            ports: Vec::new(),
            connections: Vec::new(),
            auto_connect_rules: Vec::new(),
            interruptor: Interruptor::new(),
            again_sleep: Duration::from_millis(100),
            mip_version: 0,
        }
    }

    /// Negotiates the MIP version across the participating component
    /// classes before any component is added (§4.K "MIP negotiation").
    pub fn new_with_mip(supported_by_class: &[Vec<u32>]) -> Result<Self, Error> {
        let mip_version = mip::negotiate(supported_by_class)?;
        let mut g = Self::new();
        g.mip_version = mip_version;
        Ok(g)
    }

    pub fn mip_version(&self) -> u32 {
        self.mip_version
    }

    pub fn add_interrupter(&mut self, interruptor: Interruptor) {
        self.interruptor = interruptor;
    }

    pub fn interruptor(&self) -> &Interruptor {
        &self.interruptor
    }

    pub fn set_again_sleep(&mut self, d: Duration) {
        self.again_sleep = d;
    }

    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        class: impl Into<String>,
        name: impl Into<String>,
        log_level: LogLevel,
        params: Value,
    ) -> Result<ComponentId, Error> {
        let name = name.into();
        if self.components.iter().any(|c| c.name == name) {
            return Err(Error::DuplicateComponentName(name));
        }
        let id = ComponentId(self.components.len());
        self.components.push(ComponentEntry::new(kind, class, name, log_level, params));
        Ok(id)
    }

    pub fn set_sink(&mut self, component: ComponentId, sink: Box<dyn SinkComponent>) -> Result<(), Error> {
        let entry = self.component_mut(component)?;
        entry.sink = Some(sink);
        Ok(())
    }

    /// Adds an input port. Fires the auto-connect listener immediately,
    /// so any already-registered unconnected Out port matching a rule
    /// attaches right away.
    pub fn add_in_port(&mut self, component: ComponentId, name: impl Into<String>) -> Result<PortId, Error> {
        let port_id = self.push_port(component, Direction::In, name)?;
        self.on_port_added(port_id)?;
        Ok(port_id)
    }

    /// Adds an output port together with the message iterator it feeds
    /// downstream (§4.K: a source/filter's iterator is what its Out port
    /// *is*, so the two always arrive together). Fires the auto-connect
    /// listener once the iterator is in place.
    pub fn add_out_port(
        &mut self,
        component: ComponentId,
        name: impl Into<String>,
        iterator: Box<dyn MessageIterator>,
    ) -> Result<PortId, Error> {
        let port_id = self.push_port(component, Direction::Out, name)?;
        self.ports[port_id.0].iterator = Some(iterator);
        self.on_port_added(port_id)?;
        Ok(port_id)
    }

    fn push_port(&mut self, component: ComponentId, direction: Direction, name: impl Into<String>) -> Result<PortId, Error> {
        let name = name.into();
        {
            let entry = self.component(component)?;
            for &pid in &entry.ports {
                if self.ports[pid.0].name == name {
                    return Err(Error::DuplicatePortName(name, entry.name.clone()));
                }
            }
        }
        let port_id = PortId(self.ports.len());
        self.ports.push(Port::new(direction, component, name));
        self.component_mut(component)?.ports.push(port_id);
        Ok(port_id)
    }

    pub fn connect(&mut self, upstream: PortId, downstream: PortId) -> Result<ConnectionId, Error> {
        {
            let up = self.port(upstream)?;
            let down = self.port(downstream)?;
            if up.direction != Direction::Out {
                return Err(Error::WrongDirection(upstream));
            }
            if down.direction != Direction::In {
                return Err(Error::WrongDirection(downstream));
            }
            if up.connection.is_some() {
                return Err(Error::OutPortAlreadyConnected(upstream));
            }
            if down.connection.is_some() {
                return Err(Error::InPortAlreadyConnected(downstream));
            }
            let up_kind = self.components[up.owner.0].kind;
            let down_kind = self.components[down.owner.0].kind;
            if !connection::type_check(up_kind, down_kind) {
                return Err(Error::TypeMismatch { upstream, downstream });
            }
        }

        let iterator = self.port_mut(upstream)?.iterator.take();
        let conn_id = ConnectionId(self.connections.len());
        self.connections.push(Connection { upstream, downstream });
        self.port_mut(upstream)?.connection = Some(conn_id);
        let down = self.port_mut(downstream)?;
        down.connection = Some(conn_id);
        down.iterator = iterator;
        Ok(conn_id)
    }

    pub fn add_auto_connect_rule(&mut self, out_glob: &str, in_glob: &str) -> Result<(), Error> {
        let out_pat = Pattern::new(out_glob).map_err(|e| Error::BadGlob(out_glob.to_string(), e))?;
        let in_pat = Pattern::new(in_glob).map_err(|e| Error::BadGlob(in_glob.to_string(), e))?;
        self.auto_connect_rules.push(AutoConnectRule { out_glob: out_pat, in_glob: in_pat });
        Ok(())
    }

    fn port_qualified_name(&self, port: PortId) -> String {
        let p = &self.ports[port.0];
        format!("{}:{}", self.components[p.owner.0].name, p.name)
    }

    /// Runs auto-connect rules against a newly added port (§4.K
    /// "Port-added listener"). A listener error aborts the enclosing
    /// `add_port` call, matching "A listener error aborts the current
    /// `run` call" for the runtime-discovery case.
    fn on_port_added(&mut self, added: PortId) -> Result<(), Error> {
        let added_name = self.port_qualified_name(added);
        let added_dir = self.ports[added.0].direction;

        let rules: Vec<(Pattern, Pattern)> = self
            .auto_connect_rules
            .iter()
            .map(|r| (r.out_glob.clone(), r.in_glob.clone()))
            .collect();

        for (out_glob, in_glob) in rules {
            match added_dir {
                Direction::Out if out_glob.matches(&added_name) => {
                    if let Some(target) = self.find_unconnected_port(Direction::In, &in_glob) {
                        self.connect(added, target)
                            .map_err(|e| Error::ListenerFailed(added, e.to_string()))?;
                    }
                }
                Direction::In if in_glob.matches(&added_name) => {
                    if let Some(source) = self.find_unconnected_port(Direction::Out, &out_glob) {
                        self.connect(source, added)
                            .map_err(|e| Error::ListenerFailed(added, e.to_string()))?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn find_unconnected_port(&self, direction: Direction, pat: &Pattern) -> Option<PortId> {
        self.ports.iter().enumerate().find_map(|(i, p)| {
            if p.direction == direction && p.connection.is_none() && pat.matches(&self.port_qualified_name(PortId(i))) {
                Some(PortId(i))
            } else {
                None
            }
        })
    }

    /// One scheduling rotation through every not-yet-finalized sink
    /// (§4.K "Scheduling"). Checks the interrupter before any sleep.
    pub fn run(&mut self) -> TopResult<RunStatus> {
        if self.interruptor.is_set() {
            return Err(TopError::Interrupted);
        }

        let sink_indices: Vec<usize> = self
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ComponentKind::Sink && !c.finalized)
            .map(|(i, _)| i)
            .collect();

        if sink_indices.is_empty() {
            return Ok(RunStatus::End);
        }

        let mut any_ok = false;
        let mut any_pending = false;

        for idx in sink_indices {
            let sink = self.components[idx]
                .sink
                .as_mut()
                .expect("sink component registered with ComponentKind::Sink but no SinkComponent attached");
            match sink.consume() {
                Ok(RunStatus::Ok) => {
                    any_ok = true;
                    any_pending = true;
                }
                Ok(RunStatus::Again) => {
                    any_pending = true;
                }
                Ok(RunStatus::End) => {
                    sink.finalize();
                    self.components[idx].finalized = true;
                }
                Err(e) => return Err(e),
            }
        }

        if !any_pending {
            return Ok(RunStatus::End);
        }
        if any_ok {
            return Ok(RunStatus::Ok);
        }

        if self.interruptor.is_set() {
            return Err(TopError::Interrupted);
        }
        std::thread::sleep(self.again_sleep);
        Ok(RunStatus::Again)
    }

    fn component(&self, id: ComponentId) -> Result<&ComponentEntry, Error> {
        self.components.get(id.0).ok_or(Error::UnknownComponent(id))
    }

    fn component_mut(&mut self, id: ComponentId) -> Result<&mut ComponentEntry, Error> {
        self.components.get_mut(id.0).ok_or(Error::UnknownComponent(id))
    }

    fn port(&self, id: PortId) -> Result<&Port, Error> {
        self.ports.get(id.0).ok_or(Error::UnknownPort(id))
    }

    fn port_mut(&mut self, id: PortId) -> Result<&mut Port, Error> {
        self.ports.get_mut(id.0).ok_or(Error::UnknownPort(id))
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, StreamId};

    struct CountingSink {
        remaining: u32,
    }

    impl SinkComponent for CountingSink {
        fn consume(&mut self) -> TopResult<RunStatus> {
            if self.remaining == 0 {
                return Ok(RunStatus::End);
            }
            self.remaining -= 1;
            Ok(RunStatus::Ok)
        }
    }

    struct DummySourceIter;
    impl MessageIterator for DummySourceIter {
        fn next_message(&mut self) -> TopResult<Option<Message>> {
            Ok(Some(Message::StreamEnd { stream: StreamId(0) }))
        }
    }

    #[test]
    fn add_component_rejects_duplicate_names() {
        let mut g = Graph::new();
        g.add_component(ComponentKind::Source, "class", "a", LogLevel::None, Value::null())
            .unwrap();
        let err = g
            .add_component(ComponentKind::Source, "class", "a", LogLevel::None, Value::null())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateComponentName(_)));
    }

    #[test]
    fn connect_enforces_type_rule() {
        let mut g = Graph::new();
        let sink_a = g
            .add_component(ComponentKind::Sink, "class", "sink-a", LogLevel::None, Value::null())
            .unwrap();
        let sink_b = g
            .add_component(ComponentKind::Sink, "class", "sink-b", LogLevel::None, Value::null())
            .unwrap();
        let out = g.add_out_port(sink_a, "out", Box::new(DummySourceIter)).unwrap();
        let in_port = g.add_in_port(sink_b, "in").unwrap();
        let err = g.connect(out, in_port).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn run_drives_sinks_until_end() {
        let mut g = Graph::new();
        let sink = g
            .add_component(ComponentKind::Sink, "class", "sink", LogLevel::None, Value::null())
            .unwrap();
        g.set_sink(sink, Box::new(CountingSink { remaining: 2 })).unwrap();

        assert_eq!(g.run().unwrap(), RunStatus::Ok);
        assert_eq!(g.run().unwrap(), RunStatus::Ok);
        assert_eq!(g.run().unwrap(), RunStatus::End);
    }

    #[test]
    fn auto_connect_wires_matching_glob_ports() {
        let mut g = Graph::new();
        let source = g
            .add_component(ComponentKind::Source, "class", "src", LogLevel::None, Value::null())
            .unwrap();
        let sink = g
            .add_component(ComponentKind::Sink, "class", "snk", LogLevel::None, Value::null())
            .unwrap();
        g.add_auto_connect_rule("src:*", "snk:*").unwrap();
        g.add_in_port(sink, "in").unwrap();
        let out = g.add_out_port(source, "out", Box::new(DummySourceIter)).unwrap();

        assert!(g.ports[out.0].connection.is_some());
    }
}
