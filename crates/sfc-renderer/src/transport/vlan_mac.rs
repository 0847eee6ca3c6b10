//! VLAN tag per hop with MAC rewriting.

use super::{mac_chain, Leg};
use crate::error::Result;
use crate::flow::{EgressCookie, FlowEntity};
use crate::programmer::FlowProgrammer;
use sfc_types::ServiceFunctionForwarder;

pub(super) fn transport_ingress(
    programmer: &FlowProgrammer,
    sff: &ServiceFunctionForwarder,
) -> Vec<FlowEntity> {
    let mut flows = vec![programmer.ingress_vlan(&sff.node)];
    flows.extend(mac_chain::arp_responders(programmer, sff));
    flows
}

pub(super) fn transport_egress(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    mac_chain::transport_egress(leg, EgressCookie::VlanEgress, EgressCookie::VlanLastHop)
}
