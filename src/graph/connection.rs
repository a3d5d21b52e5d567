//! Connection entity and the type-check rule (§4.K): `{upstream Out port,
//! downstream In port}`. An Out port holds at most one connection; an In
//! port must have exactly one once it's used. `source -> filter|sink`,
//! `filter -> filter|sink` are the only legal edges (nothing may feed a
//! Source, nothing may read from a Sink).

use crate::graph::component::ComponentKind;
use crate::graph::port::PortId;

pub(crate) struct Connection {
    pub(crate) upstream: PortId,
    pub(crate) downstream: PortId,
}

/// Checks the `source -> filter|sink`, `filter -> filter|sink` rule.
pub(crate) fn type_check(upstream_kind: ComponentKind, downstream_kind: ComponentKind) -> bool {
    match upstream_kind {
        ComponentKind::Source => matches!(downstream_kind, ComponentKind::Filter | ComponentKind::Sink),
        ComponentKind::Filter => matches!(downstream_kind, ComponentKind::Filter | ComponentKind::Sink),
        ComponentKind::Sink => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_may_feed_filter_or_sink_only() {
        assert!(type_check(ComponentKind::Source, ComponentKind::Filter));
        assert!(type_check(ComponentKind::Source, ComponentKind::Sink));
        assert!(!type_check(ComponentKind::Source, ComponentKind::Source));
    }

    #[test]
    fn nothing_may_read_from_a_sink() {
        assert!(!type_check(ComponentKind::Sink, ComponentKind::Filter));
        assert!(!type_check(ComponentKind::Sink, ComponentKind::Sink));
    }
}
