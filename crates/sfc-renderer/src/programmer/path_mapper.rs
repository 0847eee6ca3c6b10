//! PathMapper and PathMapperAcl rules: recover the path id into metadata.

use super::FlowProgrammer;
use crate::flow::{ether_type, priority, Action, FlowEntity, LogicalTable, MatchField};
use sfc_types::{MplsLabel, NodeId, PathId, TransportKind, VlanId};
use std::fmt;
use std::net::Ipv4Addr;

/// Per-hop tag of the tag-based transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HopTag {
    Vlan(VlanId),
    Mpls(MplsLabel),
}

impl HopTag {
    pub fn transport(&self) -> TransportKind {
        match self {
            Self::Vlan(_) => TransportKind::VlanMac,
            Self::Mpls(_) => TransportKind::Mpls,
        }
    }

    fn match_fields(&self) -> Vec<MatchField> {
        match self {
            Self::Vlan(vlan) => vec![MatchField::VlanId(*vlan)],
            Self::Mpls(label) => vec![
                MatchField::EtherType(ether_type::MPLS_UNICAST),
                MatchField::MplsLabel(*label),
            ],
        }
    }

    /// Actions removing the tag.
    pub fn pop(&self) -> Action {
        match self {
            Self::Vlan(_) => Action::PopVlan,
            Self::Mpls(_) => Action::PopMpls,
        }
    }

    /// Actions adding the tag.
    pub fn push(&self) -> [Action; 2] {
        match self {
            Self::Vlan(vlan) => [Action::PushVlan, Action::SetVlanId(*vlan)],
            Self::Mpls(label) => [Action::PushMpls, Action::SetMplsLabel(*label)],
        }
    }
}

impl fmt::Display for HopTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vlan(vlan) => write!(f, "vlan {}", vlan),
            Self::Mpls(label) => write!(f, "label {}", label),
        }
    }
}

impl FlowProgrammer {
    /// Maps a hop tag to the path id.
    ///
    /// With `function_port`, the rule only matches traffic returning from the
    /// function on that port and outranks the generic tag rule.
    pub fn path_mapper(
        &self,
        node: &NodeId,
        path: PathId,
        tag: HopTag,
        function_port: Option<u32>,
    ) -> FlowEntity {
        let mut flow = self
            .flow(node, LogicalTable::PathMapper)
            .with_priority(priority::path_mapper(function_port.is_some()));
        for field in tag.match_fields() {
            flow = flow.with_match(field);
        }
        if let Some(port) = function_port {
            flow = flow.with_match(MatchField::InPort(port));
        }
        flow.with_actions([
            tag.pop(),
            Action::WriteMetadata(path.as_metadata()),
            self.goto(LogicalTable::PathMapperAcl),
        ])
    }

    /// Steers one IPv4 conversation direction onto a path.
    pub fn path_mapper_acl(
        &self,
        node: &NodeId,
        path: PathId,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        idle_timeout: u16,
    ) -> FlowEntity {
        self.flow(node, LogicalTable::PathMapperAcl)
            .with_priority(priority::PATH_MAPPER_ACL)
            .with_match(MatchField::EtherType(ether_type::IPV4))
            .with_match(MatchField::Ipv4Src(src))
            .with_match(MatchField::Ipv4Dst(dst))
            .with_actions([
                Action::WriteMetadata(path.as_metadata()),
                self.goto(LogicalTable::NextHop),
            ])
            .with_idle_timeout(idle_timeout)
    }
}
