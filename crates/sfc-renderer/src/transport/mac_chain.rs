//! Rules shared by the tag-based transports (MPLS and VLAN/MAC).
//!
//! Every link a path crosses carries a hop tag. The PathMapper turns the tag
//! back into the path id in the metadata register; NextHop and
//! TransportEgress then key on that register plus the Ethernet addresses of
//! the hop.

use super::{function_output, Leg, NextHopDirection};
use crate::error::{RendererError, Result};
use crate::flow::{Action, EgressCookie, FlowEntity};
use crate::graph::GraphNode;
use crate::programmer::{EgressDestination, EgressVariant, FlowProgrammer, HopSource, HopTag};
use sfc_types::{MacAddress, MplsLabel, PathId, ServiceFunctionForwarder, TransportKind, VlanId};
use std::collections::{BTreeMap, BTreeSet};

/// Hop tags of every rendered path.
///
/// A tag identifies one link of one path on the forwarders it crosses, so
/// no two live paths hold the same tag. Released tags are handed out again,
/// lowest first, before the range is extended.
#[derive(Debug, Clone)]
pub struct HopTagPool {
    next_vlan: Option<VlanId>,
    next_mpls: Option<MplsLabel>,
    free: BTreeSet<HopTag>,
    held: BTreeMap<PathId, Vec<HopTag>>,
}

impl Default for HopTagPool {
    fn default() -> Self {
        Self {
            next_vlan: Some(VlanId::FIRST),
            next_mpls: Some(MplsLabel::FIRST),
            free: BTreeSet::new(),
            held: BTreeMap::new(),
        }
    }
}

impl HopTagPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a tag for one link of `path`; `None` for in-band transports.
    pub fn allocate(&mut self, kind: TransportKind, path: PathId) -> Result<Option<HopTag>> {
        let exhausted = |what: &str| RendererError::InvalidRsp {
            message: format!("path {} needs more {} than available", path, what),
        };
        let reused = self
            .free
            .iter()
            .copied()
            .find(|tag| tag.transport() == kind);
        let tag = match (kind, reused) {
            (TransportKind::Mpls | TransportKind::VlanMac, Some(tag)) => {
                self.free.remove(&tag);
                tag
            }
            (TransportKind::VlanMac, None) => {
                let vlan = self.next_vlan.ok_or_else(|| exhausted("VLAN ids"))?;
                self.next_vlan = vlan.next();
                HopTag::Vlan(vlan)
            }
            (TransportKind::Mpls, None) => {
                let label = self.next_mpls.ok_or_else(|| exhausted("MPLS labels"))?;
                self.next_mpls = label.next();
                HopTag::Mpls(label)
            }
            _ => return Ok(None),
        };
        self.held.entry(path).or_default().push(tag);
        Ok(Some(tag))
    }

    /// Returns every tag of `path` to the pool.
    pub fn release(&mut self, path: PathId) -> usize {
        let Some(tags) = self.held.remove(&path) else {
            return 0;
        };
        let count = tags.len();
        self.free.extend(tags);
        count
    }

    pub fn held_by(&self, path: PathId) -> &[HopTag] {
        self.held.get(&path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tags held by live paths.
    pub fn in_use(&self) -> usize {
        self.held.values().map(Vec::len).sum()
    }
}

/// One ARP responder per distinct locator MAC of the forwarder.
pub(super) fn arp_responders(
    programmer: &FlowProgrammer,
    sff: &ServiceFunctionForwarder,
) -> Vec<FlowEntity> {
    let mut macs: Vec<MacAddress> = Vec::new();
    for mac in sff.dpls.iter().filter_map(|d| d.effective_mac()) {
        if !macs.contains(&mac) {
            macs.push(mac);
        }
    }
    macs.into_iter()
        .map(|mac| programmer.ingress_arp_responder(&sff.node, mac))
        .collect()
}

fn hop_source(mac: Option<MacAddress>) -> HopSource {
    mac.map_or(HopSource::Unknown, HopSource::Known)
}

fn egress_destination(mac: Option<MacAddress>) -> EgressDestination {
    mac.map_or(EgressDestination::Unknown, EgressDestination::Known)
}

/// Port the previous function sends returning traffic in on.
fn prev_function_port(leg: &Leg<'_>) -> Result<u32> {
    Ok(leg.attachment(leg.prev_function()?)?.port)
}

pub(super) fn path_mapper(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    let flow = match leg.direction {
        NextHopDirection::SffToSf => {
            leg.programmer
                .path_mapper(leg.node(), leg.path_id(), leg.tag()?, None)
        }
        NextHopDirection::SfToSff | NextHopDirection::SfToSf | NextHopDirection::SfToEgress => {
            leg.programmer.path_mapper(
                leg.node(),
                leg.path_id(),
                leg.prev_tag()?,
                Some(prev_function_port(leg)?),
            )
        }
    };
    Ok(vec![flow])
}

pub(super) fn next_hop(leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
    let mut rewrites = Vec::new();
    let source = match leg.direction {
        NextHopDirection::SffToSf => {
            let function = leg.function()?;
            if let Some(mac) = leg.attachment(function)?.mac {
                rewrites.push(Action::SetEthSrc(mac));
            }
            rewrites.push(Action::SetEthDst(leg.function_mac(function)?));
            match &leg.entry.src {
                GraphNode::Forwarder(prev) => {
                    hop_source(leg.graph.egress_dpl(prev).and_then(|d| d.effective_mac()))
                }
                _ => HopSource::Unknown,
            }
        }
        NextHopDirection::SfToSf => {
            let function = leg.function()?;
            if let Some(mac) = leg.attachment(function)?.mac {
                rewrites.push(Action::SetEthSrc(mac));
            }
            rewrites.push(Action::SetEthDst(leg.function_mac(function)?));
            hop_source(leg.prev_function()?.effective_mac())
        }
        NextHopDirection::SfToSff => {
            if let Some(mac) = leg.egress_dpl()?.effective_mac() {
                rewrites.push(Action::SetEthSrc(mac));
            }
            if let Some(mac) = leg.next_ingress_dpl()?.effective_mac() {
                rewrites.push(Action::SetEthDst(mac));
            }
            hop_source(leg.prev_function()?.effective_mac())
        }
        NextHopDirection::SfToEgress => {
            if let Some(mac) = leg.egress_dpl()?.effective_mac() {
                rewrites.push(Action::SetEthSrc(mac));
            }
            hop_source(leg.prev_function()?.effective_mac())
        }
    };
    Ok(vec![leg.programmer.next_hop(
        leg.node(),
        leg.metadata_match(),
        source,
        rewrites,
    )])
}

/// TransportEgress of the tag-based transports.
///
/// Rules toward a function key on its MAC. Rules leaving a function also key
/// on the port it returns on, so an unknown next-hop MAC cannot shadow the
/// rules toward functions.
pub(super) fn transport_egress(
    leg: &Leg<'_>,
    cookie: EgressCookie,
    last_hop_cookie: EgressCookie,
) -> Result<Vec<FlowEntity>> {
    let programmer = leg.programmer;
    let flow = match leg.direction {
        NextHopDirection::SffToSf | NextHopDirection::SfToSf => {
            let mac = leg.function_mac(leg.function()?)?;
            let mut actions = leg.tag()?.push().to_vec();
            actions.extend(function_output(leg)?);
            programmer.transport_egress(
                leg.node(),
                leg.metadata_match(),
                EgressDestination::Known(mac),
                EgressVariant::Normal,
                actions,
                cookie,
            )
        }
        NextHopDirection::SfToSff => {
            let mut actions = leg.tag()?.push().to_vec();
            actions.push(Action::Output(leg.egress_port()?));
            programmer.transport_egress(
                leg.node(),
                leg.metadata_match(),
                egress_destination(leg.next_ingress_dpl()?.effective_mac()),
                EgressVariant::FromPort(prev_function_port(leg)?),
                actions,
                cookie,
            )
        }
        NextHopDirection::SfToEgress => {
            let from = EgressVariant::FromPort(prev_function_port(leg)?);
            if leg.is_app_coexistence() {
                programmer.transport_egress(
                    leg.node(),
                    leg.metadata_match(),
                    EgressDestination::Unknown,
                    from,
                    [programmer.resubmit_to_coexisting_pipeline()],
                    EgressCookie::MacLastHopAppCoexistence,
                )
            } else {
                programmer.transport_egress(
                    leg.node(),
                    leg.metadata_match(),
                    EgressDestination::Unknown,
                    from,
                    [Action::Output(leg.egress_port()?)],
                    last_hop_cookie,
                )
            }
        }
    };
    Ok(vec![flow])
}
