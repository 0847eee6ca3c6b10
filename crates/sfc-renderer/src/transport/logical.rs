//! Logical forwarder over a tunnel mesh.
//!
//! Forwarders reach each other through per-peer mesh tunnel ports carrying
//! NSH over VXLAN-GPE; functions hang off local ports and get NSH over
//! Ethernet.

use super::{function_output, in_band_last_hop, Leg, NextHopDirection};
use crate::error::Result;
use crate::flow::{Action, EgressCookie, FlowEntity};
use crate::programmer::{EgressDestination, EgressVariant, FlowProgrammer, HopSource};
use sfc_types::ServiceFunctionForwarder;

pub(super) fn transport_ingress(
    programmer: &FlowProgrammer,
    sff: &ServiceFunctionForwarder,
) -> Vec<FlowEntity> {
    vec![
        programmer.ingress_nsh_tunnel(&sff.node),
        programmer.ingress_nsh_ethernet(&sff.node),
    ]
}

pub(super) fn next_hop(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    let rewrites = match leg.direction {
        NextHopDirection::SffToSf | NextHopDirection::SfToSf => {
            match leg.function()?.effective_mac() {
                Some(mac) => vec![Action::SetEthDst(mac)],
                None => Vec::new(),
            }
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
        NextHopDirection::SfToSff => {
            let peer = leg.next_forwarder()?;
            let port = leg.at.tunnel_port(&peer.name).ok_or_else(|| {
                leg.missing(format!("mesh tunnel port toward '{}'", peer.name))
            })?;
            vec![Action::Output(port)]
        }
        NextHopDirection::SfToEgress => {
            return in_band_last_hop(
                leg,
                Action::PopNsh,
                EgressCookie::LogicalLastHop,
                EgressCookie::LogicalLastHopAppCoexistence,
            )
        }
    };
    Ok(vec![leg.programmer.transport_egress(
        leg.node(),
        leg.nsh_match(),
        EgressDestination::Implicit,
        EgressVariant::Normal,
        output,
        EgressCookie::LogicalEgress,
    )])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{flows_at, mac, render, two_hop_path};
    use crate::error::RendererError;
    use crate::flow::{Action, EgressCookie, LogicalTable};
    use crate::programmer::{FlowProgrammer, TableMapper};
    use pretty_assertions::assert_eq;
    use sfc_types::TransportKind;
    use std::net::Ipv4Addr;

    #[test]
    fn test_mesh_port_toward_peer() {
        let (rsp, path) = two_hop_path(TransportKind::LogicalTunnel);
        let flows = render(&FlowProgrammer::default(), &rsp, &path).unwrap();

        let egress = flows_at(&flows, "openflow:1", LogicalTable::TransportEgress);
        assert_eq!(egress[1].actions, vec![Action::Output(100)]);
        assert!(egress
            .iter()
            .all(|f| f.cookie == EgressCookie::LogicalEgress.value()));

        let next_hop = flows_at(&flows, "openflow:1", LogicalTable::NextHop);
        assert_eq!(next_hop[0].actions[0], Action::SetEthDst(mac(0x11)));
        assert_eq!(
            next_hop[1].actions[0],
            Action::SetTunnelIpv4Dst(Ipv4Addr::new(10, 0, 0, 2))
        );
    }

    #[test]
    fn test_missing_mesh_port() {
        let (rsp, mut path) = two_hop_path(TransportKind::LogicalTunnel);
        path.forwarder_mut("sff1").unwrap().tunnel_ports.clear();
        let err = render(&FlowProgrammer::default(), &rsp, &path).unwrap_err();
        assert!(matches!(err, RendererError::LocatorMissing { ref forwarder, .. } if forwarder == "sff1"));
    }

    #[test]
    fn test_last_hop_cookie() {
        let (rsp, path) = two_hop_path(TransportKind::LogicalTunnel);
        let flows = render(&FlowProgrammer::default(), &rsp, &path).unwrap();
        let last = flows
            .iter()
            .filter(|f| f.cookie == EgressCookie::LogicalLastHop.value())
            .count();
        assert_eq!(last, 2);
    }

    #[test]
    fn test_last_hop_app_coexistence_has_own_cookie() {
        let (rsp, path) = two_hop_path(TransportKind::LogicalTunnel);
        let programmer = FlowProgrammer::new(TableMapper::app_coexistence(20));
        let flows = render(&programmer, &rsp, &path).unwrap();

        let last: Vec<_> = flows
            .iter()
            .filter(|f| f.cookie == EgressCookie::LogicalLastHopAppCoexistence.value())
            .collect();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].actions, vec![Action::PopNsh, Action::Resubmit(0)]);
        assert!(flows
            .iter()
            .all(|f| f.cookie != EgressCookie::NshTunnelLastHopAppCoexistence.value()));
    }
}
