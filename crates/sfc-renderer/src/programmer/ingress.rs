//! TransportIngress rules: recognize the chain encapsulation.

use super::FlowProgrammer;
use crate::flow::{
    ether_type, priority, Action, FlowEntity, LogicalTable, MatchField, ARP_OP_REQUEST,
    GPE_NEXT_PROTO_NSH,
};
use sfc_types::{MacAddress, NodeId};

impl FlowProgrammer {
    fn ingress(&self, node: &NodeId) -> FlowEntity {
        self.flow(node, LogicalTable::TransportIngress)
            .with_priority(priority::TRANSPORT_INGRESS)
    }

    /// NSH inside VXLAN-GPE. The path id is in-band, so skip the mappers.
    pub fn ingress_nsh_tunnel(&self, node: &NodeId) -> FlowEntity {
        self.ingress(node)
            .with_match(MatchField::TunnelGpeNextProto(GPE_NEXT_PROTO_NSH))
            .with_action(self.goto(LogicalTable::NextHop))
    }

    /// NSH directly over Ethernet.
    pub fn ingress_nsh_ethernet(&self, node: &NodeId) -> FlowEntity {
        self.ingress(node)
            .with_match(MatchField::EtherType(ether_type::NSH))
            .with_action(self.goto(LogicalTable::NextHop))
    }

    pub fn ingress_mpls(&self, node: &NodeId) -> FlowEntity {
        self.ingress(node)
            .with_match(MatchField::EtherType(ether_type::MPLS_UNICAST))
            .with_action(self.goto(LogicalTable::PathMapper))
    }

    pub fn ingress_vlan(&self, node: &NodeId) -> FlowEntity {
        self.ingress(node)
            .with_match(MatchField::VlanPresent)
            .with_action(self.goto(LogicalTable::PathMapper))
    }

    /// Answers ARP requests for the forwarder's own MAC.
    pub fn ingress_arp_responder(&self, node: &NodeId, mac: MacAddress) -> FlowEntity {
        self.ingress(node)
            .with_priority(priority::TRANSPORT_INGRESS_ARP)
            .with_match(MatchField::EtherType(ether_type::ARP))
            .with_match(MatchField::ArpOp(ARP_OP_REQUEST))
            .with_action(Action::ArpResponder(mac))
    }
}
