//! NSH over VXLAN-GPE.
//!
//! The path id and index travel in the NSH header, so the mapper tables are
//! bypassed and NextHop only picks the tunnel destination.

use super::{function_output, in_band_last_hop, Leg, NextHopDirection};
use crate::error::Result;
use crate::flow::{Action, EgressCookie, FlowEntity};
use crate::programmer::{EgressDestination, EgressVariant, FlowProgrammer, HopSource};
use sfc_types::ServiceFunctionForwarder;

pub(super) fn transport_ingress(
    programmer: &FlowProgrammer,
    sff: &ServiceFunctionForwarder,
) -> Vec<FlowEntity> {
    vec![programmer.ingress_nsh_tunnel(&sff.node)]
}

pub(super) fn next_hop(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    let rewrites = match leg.direction {
        NextHopDirection::SffToSf | NextHopDirection::SfToSf => {
            vec![Action::SetTunnelIpv4Dst(leg.function_ip(leg.function()?)?)]
        }
        NextHopDirection::SfToSff => vec![Action::SetTunnelIpv4Dst(leg.next_ingress_ip()?)],
        NextHopDirection::SfToEgress => Vec::new(),
    };
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
                Action::MoveNshC1ToTunnelDst,
                EgressCookie::NshTunnelLastHop,
                EgressCookie::NshTunnelLastHopAppCoexistence,
            )
        }
    };
    Ok(vec![leg.programmer.transport_egress(
        leg.node(),
        leg.nsh_match(),
        EgressDestination::Implicit,
        EgressVariant::Normal,
        output,
        EgressCookie::NshTunnelEgress,
    )])
}
