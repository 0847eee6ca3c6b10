//! NSH directly over Ethernet.

use super::{function_output, in_band_last_hop, Leg, NextHopDirection};
use crate::error::Result;
use crate::flow::{Action, EgressCookie, FlowEntity};
use crate::programmer::{EgressDestination, EgressVariant, FlowProgrammer, HopSource};
use sfc_types::ServiceFunctionForwarder;

pub(super) fn transport_ingress(
    programmer: &FlowProgrammer,
    sff: &ServiceFunctionForwarder,
) -> Vec<FlowEntity> {
    vec![programmer.ingress_nsh_ethernet(&sff.node)]
}

pub(super) fn next_hop(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    let mut rewrites = Vec::new();
    match leg.direction {
        NextHopDirection::SffToSf | NextHopDirection::SfToSf => {
            rewrites.push(Action::SetEthDst(leg.function_mac(leg.function()?)?));
        }
        NextHopDirection::SfToSff => {
            if let Some(mac) = leg.egress_dpl()?.effective_mac() {
                rewrites.push(Action::SetEthSrc(mac));
            }
            if let Some(mac) = leg.next_ingress_dpl()?.effective_mac() {
                rewrites.push(Action::SetEthDst(mac));
            }
        }
        NextHopDirection::SfToEgress => {}
    }
    Ok(vec![leg.programmer.next_hop(
        leg.node(),
        leg.nsh_match(),
        HopSource::Implicit,
        rewrites,
    )])
}

pub(super) fn transport_egress(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    let output = match leg.direction {
        NextHopDirection::SffToSf | NextHopDirection::SfToSf => function_output(leg)?,
        NextHopDirection::SfToSff => vec![Action::Output(leg.egress_port()?)],
        NextHopDirection::SfToEgress => {
            return in_band_last_hop(
                leg,
                Action::PopNsh,
                EgressCookie::NshEthernetLastHop,
                EgressCookie::NshEthernetLastHopAppCoexistence,
            )
        }
    };
    Ok(vec![leg.programmer.transport_egress(
        leg.node(),
        leg.nsh_match(),
        EgressDestination::Implicit,
        EgressVariant::Normal,
        output,
        EgressCookie::NshEthernetEgress,
    )])
}
