//! Transport processors.
//!
//! A [`TransportProcessor`] turns one graph entry into the rules of the four
//! per-path tables for a given encapsulation. Selection is a plain match on
//! [`TransportKind`]; every kind has a processor, so there is no "no
//! processor for transport" failure at run time.
//!
//! Each graph entry is programmed as one or two *legs*, a leg being the
//! rules one forwarder needs to move a packet one step:
//!
//! | entry                  | legs                                   |
//! |------------------------|----------------------------------------|
//! | INGRESS -> D           | SffToSf on D                           |
//! | S -> D                 | SfToSff on S, SffToSf on D             |
//! | D -> D                 | SfToSf on D                            |
//! | S -> EGRESS            | SfToEgress on S                        |

mod logical;
mod mac_chain;
mod mpls;
mod nsh_ethernet;
mod nsh_tunnel;
mod vlan_mac;

pub use mac_chain::HopTagPool;

use crate::error::{RendererError, Result};
use crate::flow::{Action, EgressCookie, FlowEntity};
use crate::graph::{GraphNode, SffGraph, SffGraphEntry};
use crate::programmer::{EgressDestination, EgressVariant, FlowProgrammer, HopTag, PathMatch};
use crate::rsp::ResolvedPath;
use sfc_types::{
    DataPlaneLocator, FunctionAttachment, MacAddress, NodeId, PathId, ServiceFunction,
    ServiceFunctionForwarder, TransportKind,
};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::debug;

/// Direction of a NextHop leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHopDirection {
    /// From the previous forwarder (or the classifier) to a function.
    SffToSf,
    /// From a function to the next forwarder.
    SfToSff,
    /// From a function to another function on the same forwarder.
    SfToSf,
    /// From the last function out of the chain.
    SfToEgress,
}

impl fmt::Display for NextHopDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SffToSf => "sff->sf",
            Self::SfToSff => "sf->sff",
            Self::SfToSf => "sf->sf",
            Self::SfToEgress => "sf->egress",
        };
        f.write_str(s)
    }
}

/// Per-entry transport state computed once per path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopTransports {
    /// Tag carried on the links of each entry (tag-based transports only).
    tags: Vec<Option<HopTag>>,
    /// Locator the entry's destination forwarder receives on.
    hop_ingress: Vec<Option<DataPlaneLocator>>,
    /// Locator the path leaves the chain on.
    egress: Option<DataPlaneLocator>,
}

impl HopTransports {
    pub fn tag(&self, entry: usize) -> Option<HopTag> {
        self.tags.get(entry).copied().flatten()
    }

    pub fn hop_ingress(&self, entry: usize) -> Option<&DataPlaneLocator> {
        self.hop_ingress.get(entry).and_then(Option::as_ref)
    }

    pub fn egress(&self) -> Option<&DataPlaneLocator> {
        self.egress.as_ref()
    }
}

/// Everything a transport needs to program one leg.
pub struct Leg<'a> {
    pub programmer: &'a FlowProgrammer,
    pub graph: &'a SffGraph,
    pub transports: &'a HopTransports,
    pub entry_index: usize,
    pub entry: &'a SffGraphEntry,
    pub direction: NextHopDirection,
    /// Forwarder the leg's rules are installed on.
    pub at: &'a ServiceFunctionForwarder,
    /// Function the packet is heading to (SffToSf, SfToSf).
    pub function: Option<&'a ServiceFunction>,
    /// Function the packet is coming back from (SfTo*).
    pub prev_function: Option<&'a ServiceFunction>,
    /// Forwarder the packet is heading to (SfToSff).
    pub next: Option<&'a ServiceFunctionForwarder>,
}

impl<'a> Leg<'a> {
    pub fn node(&self) -> &NodeId {
        &self.at.node
    }

    pub fn path_id(&self) -> PathId {
        self.entry.path_id
    }

    pub fn nsh_match(&self) -> PathMatch {
        PathMatch::Nsh {
            path: self.entry.path_id,
            index: self.entry.service_index,
        }
    }

    pub fn metadata_match(&self) -> PathMatch {
        PathMatch::Metadata {
            path: self.entry.path_id,
        }
    }

    fn missing(&self, what: impl Into<String>) -> RendererError {
        RendererError::locator_missing(what, &self.at.name, self.entry.path_id)
    }

    pub fn function(&self) -> Result<&'a ServiceFunction> {
        self.function
            .ok_or_else(|| RendererError::internal(format!("{} leg without function", self.direction)))
    }

    pub fn prev_function(&self) -> Result<&'a ServiceFunction> {
        self.prev_function.ok_or_else(|| {
            RendererError::internal(format!("{} leg without previous function", self.direction))
        })
    }

    pub fn next_forwarder(&self) -> Result<&'a ServiceFunctionForwarder> {
        self.next
            .ok_or_else(|| RendererError::internal(format!("{} leg without next forwarder", self.direction)))
    }

    /// Where `function` hangs off the leg's forwarder.
    pub fn attachment(&self, function: &ServiceFunction) -> Result<&'a FunctionAttachment> {
        self.at
            .attachment(&function.name)
            .ok_or_else(|| self.missing(format!("attachment of function '{}'", function.name)))
    }

    /// Locator the leg's forwarder sends inter-forwarder traffic on.
    pub fn egress_dpl(&self) -> Result<&'a DataPlaneLocator> {
        self.graph
            .egress_dpl(&self.at.name)
            .ok_or_else(|| self.missing("egress data plane locator"))
    }

    pub fn egress_port(&self) -> Result<u32> {
        self.egress_dpl()?
            .port
            .ok_or_else(|| self.missing("egress locator port"))
    }

    /// Locator the next forwarder receives on.
    pub fn next_ingress_dpl(&self) -> Result<&'a DataPlaneLocator> {
        self.transports
            .hop_ingress(self.entry_index)
            .ok_or_else(|| self.missing("next hop ingress locator"))
    }

    /// Tag on the link toward the leg's destination.
    pub fn tag(&self) -> Result<HopTag> {
        self.transports
            .tag(self.entry_index)
            .ok_or_else(|| self.missing("hop tag"))
    }

    /// Tag the previous function returns packets with.
    pub fn prev_tag(&self) -> Result<HopTag> {
        self.entry_index
            .checked_sub(1)
            .and_then(|i| self.transports.tag(i))
            .ok_or_else(|| self.missing("previous hop tag"))
    }

    pub fn is_app_coexistence(&self) -> bool {
        self.programmer.is_app_coexistence()
    }

    fn function_ip(&self, function: &ServiceFunction) -> Result<Ipv4Addr> {
        function
            .locator
            .ip()
            .ok_or_else(|| self.missing(format!("IP locator of function '{}'", function.name)))
    }

    fn function_mac(&self, function: &ServiceFunction) -> Result<MacAddress> {
        function
            .effective_mac()
            .ok_or_else(|| self.missing(format!("MAC of function '{}'", function.name)))
    }

    fn next_ingress_ip(&self) -> Result<Ipv4Addr> {
        self.next_ingress_dpl()?
            .locator
            .ip()
            .ok_or_else(|| self.missing("IP of next hop ingress locator"))
    }
}

/// Output toward the leg's function; proxies also get a copy at the
/// controller.
fn function_output(leg: &Leg<'_>) -> Result<Vec<Action>> {
    let function = leg.function()?;
    let mut actions = vec![Action::Output(leg.attachment(function)?.port)];
    if function.function_type.is_proxy() {
        actions.push(Action::OutputController);
    }
    Ok(actions)
}

/// Last hop of the NSH transports.
///
/// Standalone, two rules leave the chain through the egress locator port:
/// one for packets that entered on that same port (which must go back out
/// through in_port) and one for the rest. Under app-coexistence the NSH
/// header is dropped and the packet resubmitted to the other pipeline.
fn in_band_last_hop(
    leg: &Leg<'_>,
    decap: Action,
    cookie: EgressCookie,
    coexistence_cookie: EgressCookie,
) -> Result<Vec<FlowEntity>> {
    let programmer = leg.programmer;
    if leg.is_app_coexistence() {
        return Ok(vec![programmer.transport_egress(
            leg.node(),
            leg.nsh_match(),
            EgressDestination::Implicit,
            EgressVariant::Normal,
            [Action::PopNsh, programmer.resubmit_to_coexisting_pipeline()],
            coexistence_cookie,
        )]);
    }
    let port = leg.egress_port()?;
    Ok(vec![
        programmer.transport_egress(
            leg.node(),
            leg.nsh_match(),
            EgressDestination::Implicit,
            EgressVariant::InPortCollision(port),
            [decap, Action::OutputInPort],
            cookie,
        ),
        programmer.transport_egress(
            leg.node(),
            leg.nsh_match(),
            EgressDestination::Implicit,
            EgressVariant::Normal,
            [decap, Action::Output(port)],
            cookie,
        ),
    ])
}

/// Per-transport rule generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportProcessor {
    kind: TransportKind,
}

impl TransportProcessor {
    pub fn new(kind: TransportKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Computes per-entry locators and tags. Entries staying on one
    /// forwarder reuse what the previous entry computed.
    ///
    /// Tags are taken from `tags` on behalf of the graph's path; the caller
    /// releases them when the path goes away or fails to render.
    pub fn set_rsp_transports(
        &self,
        graph: &SffGraph,
        tags: &mut HopTagPool,
    ) -> Result<HopTransports> {
        let entries = graph.entries();
        let mut transports = HopTransports {
            tags: Vec::with_capacity(entries.len()),
            hop_ingress: Vec::with_capacity(entries.len()),
            egress: None,
        };

        for entry in entries {
            match &entry.dst {
                GraphNode::Forwarder(_) if entry.stays_on_forwarder() => {
                    let tag = transports.tags.last().copied().flatten();
                    transports.tags.push(tag);
                    transports.hop_ingress.push(None);
                }
                GraphNode::Forwarder(dst) => {
                    let tag = tags.allocate(self.kind, graph.path_id())?;
                    transports.tags.push(tag);
                    transports.hop_ingress.push(graph.ingress_dpl(dst).cloned());
                }
                _ => {
                    transports.tags.push(None);
                    transports.hop_ingress.push(None);
                    if let Some(last) = entry.src.forwarder() {
                        transports.egress = graph.egress_dpl(last).cloned();
                    }
                }
            }
        }

        debug!(
            path_id = %graph.path_id(),
            transport = %self.kind,
            tags = transports.tags.iter().flatten().count(),
            "computed hop transports"
        );
        Ok(transports)
    }

    /// Path independent TransportIngress rules of a forwarder.
    pub fn transport_ingress_flows(
        &self,
        programmer: &FlowProgrammer,
        sff: &ServiceFunctionForwarder,
    ) -> Vec<FlowEntity> {
        match self.kind {
            TransportKind::NshTunnel => nsh_tunnel::transport_ingress(programmer, sff),
            TransportKind::NshEthernet => nsh_ethernet::transport_ingress(programmer, sff),
            TransportKind::LogicalTunnel => logical::transport_ingress(programmer, sff),
            TransportKind::Mpls => mpls::transport_ingress(programmer, sff),
            TransportKind::VlanMac => vlan_mac::transport_ingress(programmer, sff),
        }
    }

    /// PathMapper rules of a leg; none for in-band transports.
    pub fn path_mapper_flows(&self, leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
        if !self.kind.supports_path_mapper() {
            return Ok(Vec::new());
        }
        mac_chain::path_mapper(leg)
    }

    pub fn next_hop_flows(&self, leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
        match self.kind {
            TransportKind::NshTunnel => nsh_tunnel::next_hop(leg),
            TransportKind::NshEthernet => nsh_ethernet::next_hop(leg),
            TransportKind::LogicalTunnel => logical::next_hop(leg),
            TransportKind::Mpls | TransportKind::VlanMac => mac_chain::next_hop(leg),
        }
    }

    pub fn transport_egress_flows(&self, leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
        match self.kind {
            TransportKind::NshTunnel => nsh_tunnel::transport_egress(leg),
            TransportKind::NshEthernet => nsh_ethernet::transport_egress(leg),
            TransportKind::LogicalTunnel => logical::transport_egress(leg),
            TransportKind::Mpls => mpls::transport_egress(leg),
            TransportKind::VlanMac => vlan_mac::transport_egress(leg),
        }
    }

    /// All per-path rules of one leg, table by table.
    pub fn leg_flows(&self, leg: &Leg<'_>) -> Result<Vec<FlowEntity>> {
        let mut flows = self.path_mapper_flows(leg)?;
        flows.extend(self.next_hop_flows(leg)?);
        flows.extend(self.transport_egress_flows(leg)?);
        debug!(
            path_id = %leg.path_id(),
            node = %leg.node(),
            direction = %leg.direction,
            flows = flows.len(),
            "programmed leg"
        );
        Ok(flows)
    }
}

/// Splits a graph entry into the legs that program it.
pub fn legs<'a>(
    programmer: &'a FlowProgrammer,
    graph: &'a SffGraph,
    transports: &'a HopTransports,
    path: &'a ResolvedPath,
    entry_index: usize,
) -> Result<Vec<Leg<'a>>> {
    let entry = graph
        .entries()
        .get(entry_index)
        .ok_or_else(|| RendererError::internal(format!("no graph entry {}", entry_index)))?;
    let prev_function = match &entry.prev_function {
        Some(name) => Some(path.function(name)?),
        None => None,
    };
    let leg = move |direction, at, function, prev_function, next| Leg {
        programmer,
        graph,
        transports,
        entry_index,
        entry,
        direction,
        at,
        function,
        prev_function,
        next,
    };

    let legs = match (&entry.src, &entry.dst) {
        (GraphNode::Ingress, GraphNode::Forwarder(d)) => vec![leg(
            NextHopDirection::SffToSf,
            path.forwarder(d)?,
            Some(path.function(&entry.function)?),
            None,
            None,
        )],
        (GraphNode::Forwarder(s), GraphNode::Forwarder(d)) if s == d => vec![leg(
            NextHopDirection::SfToSf,
            path.forwarder(d)?,
            Some(path.function(&entry.function)?),
            prev_function,
            None,
        )],
        (GraphNode::Forwarder(s), GraphNode::Forwarder(d)) => {
            let (src, dst) = (path.forwarder(s)?, path.forwarder(d)?);
            let function = path.function(&entry.function)?;
            vec![
                leg(NextHopDirection::SfToSff, src, None, prev_function, Some(dst)),
                leg(NextHopDirection::SffToSf, dst, Some(function), None, None),
            ]
        }
        (GraphNode::Forwarder(s), GraphNode::Egress) => vec![leg(
            NextHopDirection::SfToEgress,
            path.forwarder(s)?,
            None,
            prev_function,
            None,
        )],
        (src, dst) => {
            return Err(RendererError::internal(format!(
                "unexpected graph entry {} -> {}",
                src, dst
            )))
        }
    };
    Ok(legs)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::flow::LogicalTable;
    use sfc_types::{FunctionType, Locator, MplsLabel, RenderedServicePath, VlanId};

    pub(crate) fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, last])
    }

    fn dpl(kind: TransportKind, id: u8) -> DataPlaneLocator {
        let locator = match kind {
            TransportKind::Mpls => Locator::Mpls {
                label: MplsLabel::new(100 + u32::from(id)).unwrap(),
            },
            TransportKind::VlanMac => Locator::Mac {
                mac: mac(id),
                vlan: Some(VlanId::new(100).unwrap()),
            },
            _ => Locator::Ip {
                ip: Ipv4Addr::new(10, 0, 0, id),
                port: 4790,
            },
        };
        DataPlaneLocator::new("eth0", locator)
            .with_port(u32::from(id))
            .with_mac(mac(id))
    }

    /// sff1 (openflow:1, fw1 on port 11) -> sff2 (openflow:2, dpi1 on port 21).
    pub(crate) fn two_hop_path(kind: TransportKind) -> (RenderedServicePath, ResolvedPath) {
        let sff1 = ServiceFunctionForwarder::new("sff1", "openflow:1")
            .with_dpl(dpl(kind, 1))
            .with_function("fw1", 11)
            .with_tunnel_port("sff2", 100);
        let sff2 = ServiceFunctionForwarder::new("sff2", "openflow:2")
            .with_dpl(dpl(kind, 2))
            .with_function("dpi1", 21)
            .with_tunnel_port("sff1", 200);
        let fw1 = ServiceFunction::new(
            "fw1",
            FunctionType::Firewall,
            Locator::Ip {
                ip: Ipv4Addr::new(192, 168, 0, 11),
                port: 6633,
            },
        )
        .with_mac(mac(0x11));
        let dpi1 = ServiceFunction::new(
            "dpi1",
            FunctionType::Dpi,
            Locator::Ip {
                ip: Ipv4Addr::new(192, 168, 0, 21),
                port: 6633,
            },
        )
        .with_mac(mac(0x21));
        let rsp = RenderedServicePath::new(
            PathId::new(42),
            "rsp-42",
            kind,
            &[("sff1", "fw1"), ("sff2", "dpi1")],
        );
        (rsp, ResolvedPath::new([sff1, sff2], [fw1, dpi1]))
    }

    /// Per-path flows of every leg, in graph order.
    pub(crate) fn render(
        programmer: &FlowProgrammer,
        rsp: &RenderedServicePath,
        path: &ResolvedPath,
    ) -> Result<Vec<FlowEntity>> {
        let processor = TransportProcessor::new(rsp.transport);
        let mut graph = SffGraph::build(rsp)?;
        graph.resolve_dpls(path.forwarders())?;
        let transports = processor.set_rsp_transports(&graph, &mut HopTagPool::new())?;
        let mut flows = Vec::new();
        for i in 0..graph.entries().len() {
            for leg in legs(programmer, &graph, &transports, path, i)? {
                flows.extend(processor.leg_flows(&leg)?);
            }
        }
        Ok(flows)
    }

    pub(crate) fn flows_at<'a>(
        flows: &'a [FlowEntity],
        node: &str,
        table: LogicalTable,
    ) -> Vec<&'a FlowEntity> {
        flows
            .iter()
            .filter(|f| f.node.as_str() == node && f.logical_table == table)
            .collect()
    }
}
