//! TransportEgress rules: encapsulate and output.
//!
//! All rules built here carry an [`EgressCookie`], which is how the
//! packet-in reflector recognizes traffic it should react to.

use super::{FlowProgrammer, PathMatch};
use crate::flow::{priority, Action, EgressCookie, FlowEntity, LogicalTable, MatchField};
use sfc_types::{MacAddress, NodeId};

/// What the rule knows about where the packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressDestination {
    /// The path match alone identifies the next hop.
    Implicit,
    Known(MacAddress),
    /// Drop the destination match and outrank rules that know it.
    Unknown,
}

/// Variants of an egress rule sharing the same path match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressVariant {
    Normal,
    /// Only packets that entered on `port`; outranks the normal rule so the
    /// output can loop back to the ingress port.
    InPortCollision(u32),
    /// Only packets returning from a function on `port`.
    FromPort(u32),
}

impl FlowProgrammer {
    pub fn transport_egress(
        &self,
        node: &NodeId,
        hop: PathMatch,
        destination: EgressDestination,
        variant: EgressVariant,
        actions: impl IntoIterator<Item = Action>,
        cookie: EgressCookie,
    ) -> FlowEntity {
        let flow = hop.apply(self.flow(node, LogicalTable::TransportEgress));
        let (flow, mut prio) = match destination {
            EgressDestination::Implicit => (flow, priority::transport_egress(true)),
            EgressDestination::Known(mac) => (
                flow.with_match(MatchField::EthDst(mac)),
                priority::transport_egress(true),
            ),
            EgressDestination::Unknown => (flow, priority::transport_egress(false)),
        };
        let flow = match variant {
            EgressVariant::Normal => flow,
            EgressVariant::InPortCollision(port) => {
                prio += priority::EGRESS_PORT_COLLISION_DELTA;
                flow.with_match(MatchField::InPort(port))
            }
            EgressVariant::FromPort(port) => flow.with_match(MatchField::InPort(port)),
        };
        flow.with_priority(prio)
            .with_actions(actions)
            .with_cookie(cookie.value())
    }

    /// Hands the packet back to the coexisting pipeline.
    pub fn resubmit_to_coexisting_pipeline(&self) -> Action {
        Action::Resubmit(self.egress_resubmit_table)
    }
}
