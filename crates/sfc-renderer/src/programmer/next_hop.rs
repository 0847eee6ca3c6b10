//! NextHop rules: rewrite next-hop addressing.

use super::{FlowProgrammer, PathMatch};
use crate::flow::{priority, Action, FlowEntity, LogicalTable, MatchField};
use sfc_types::{MacAddress, NodeId};

/// What the rule knows about the hop the packet comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopSource {
    /// The path match alone identifies the previous hop (in-band index).
    Implicit,
    Known(MacAddress),
    /// Drop the source match and yield to rules that know it.
    Unknown,
}

impl FlowProgrammer {
    pub fn next_hop(
        &self,
        node: &NodeId,
        hop: PathMatch,
        source: HopSource,
        rewrites: impl IntoIterator<Item = Action>,
    ) -> FlowEntity {
        let flow = hop.apply(self.flow(node, LogicalTable::NextHop));
        let flow = match source {
            HopSource::Implicit => flow.with_priority(priority::next_hop(true)),
            HopSource::Known(mac) => flow
                .with_priority(priority::next_hop(true))
                .with_match(MatchField::EthSrc(mac)),
            HopSource::Unknown => flow.with_priority(priority::next_hop(false)),
        };
        flow.with_actions(rewrites)
            .with_action(self.goto(LogicalTable::TransportEgress))
    }
}
