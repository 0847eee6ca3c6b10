//! SFF graph: the ordered hop graph of a rendered service path.
//!
//! One entry per hop linking the previous forwarder (or [`GraphNode::Ingress`])
//! to the hop's forwarder, plus a terminal entry from the last forwarder to
//! [`GraphNode::Egress`] whose index is one below the last hop's. The graph
//! also records which data plane locator each forwarder uses to receive and
//! to send traffic on this path.

use crate::error::{RendererError, Result};
use sfc_types::{
    DataPlaneLocator, PathId, RenderedServicePath, ServiceFunctionForwarder, ServiceIndex,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Endpoint of a graph entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphNode {
    Ingress,
    Forwarder(String),
    Egress,
}

impl GraphNode {
    pub fn forwarder(&self) -> Option<&str> {
        match self {
            Self::Forwarder(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "INGRESS"),
            Self::Forwarder(name) => write!(f, "{}", name),
            Self::Egress => write!(f, "EGRESS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SffGraphEntry {
    pub src: GraphNode,
    pub dst: GraphNode,
    pub function: String,
    pub function_group: Option<String>,
    pub path_id: PathId,
    /// Index of packets delivered to `function` (or, for the terminal
    /// entry, of packets leaving the chain).
    pub service_index: ServiceIndex,
    pub prev_function: Option<String>,
}

impl SffGraphEntry {
    /// Both ends are the same forwarder: function to function.
    pub fn stays_on_forwarder(&self) -> bool {
        matches!((&self.src, &self.dst), (GraphNode::Forwarder(a), GraphNode::Forwarder(b)) if a == b)
    }

    pub fn is_terminal(&self) -> bool {
        self.dst == GraphNode::Egress
    }
}

/// Locators a forwarder receives and sends the path's traffic on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwarderDpls {
    pub ingress: Option<DataPlaneLocator>,
    pub egress: Option<DataPlaneLocator>,
}

#[derive(Debug, Clone)]
pub struct SffGraph {
    path_id: PathId,
    entries: Vec<SffGraphEntry>,
    dpls: BTreeMap<String, ForwarderDpls>,
}

impl SffGraph {
    pub fn build(rsp: &RenderedServicePath) -> Result<Self> {
        rsp.validate()?;

        let mut entries = Vec::with_capacity(rsp.hops.len() + 1);
        let mut prev = GraphNode::Ingress;
        let mut prev_function: Option<String> = None;
        let mut prev_group: Option<String> = None;
        let mut last_index = rsp.starting_index;

        for hop in &rsp.hops {
            let cur = GraphNode::Forwarder(hop.forwarder.clone());
            entries.push(SffGraphEntry {
                src: prev,
                dst: cur.clone(),
                function: hop.function.clone(),
                function_group: hop.function_group.clone(),
                path_id: rsp.path_id,
                service_index: hop.service_index,
                prev_function: prev_function.take(),
            });
            prev = cur;
            prev_function = Some(hop.function.clone());
            prev_group = hop.function_group.clone();
            last_index = hop.service_index;
        }

        let terminal_index = last_index.decremented().ok_or_else(|| RendererError::InvalidRsp {
            message: format!("path {} exhausts the service index", rsp.path_id),
        })?;
        let last_function = prev_function.clone().unwrap_or_default();
        entries.push(SffGraphEntry {
            src: prev,
            dst: GraphNode::Egress,
            function: last_function,
            function_group: prev_group,
            path_id: rsp.path_id,
            service_index: terminal_index,
            prev_function,
        });

        debug!(path_id = %rsp.path_id, entries = entries.len(), "built SFF graph");
        Ok(Self {
            path_id: rsp.path_id,
            entries,
            dpls: BTreeMap::new(),
        })
    }

    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    pub fn entries(&self) -> &[SffGraphEntry] {
        &self.entries
    }

    /// Forwarders visited by the path.
    pub fn forwarders(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.dst.forwarder())
            .collect()
    }

    pub fn ingress_dpl(&self, forwarder: &str) -> Option<&DataPlaneLocator> {
        self.dpls.get(forwarder).and_then(|d| d.ingress.as_ref())
    }

    pub fn egress_dpl(&self, forwarder: &str) -> Option<&DataPlaneLocator> {
        self.dpls.get(forwarder).and_then(|d| d.egress.as_ref())
    }

    pub fn set_ingress_dpl(&mut self, forwarder: &str, dpl: DataPlaneLocator) {
        self.dpls.entry(forwarder.to_string()).or_default().ingress = Some(dpl);
    }

    pub fn set_egress_dpl(&mut self, forwarder: &str, dpl: DataPlaneLocator) {
        self.dpls.entry(forwarder.to_string()).or_default().egress = Some(dpl);
    }

    /// Picks the ingress and egress locator of every visited forwarder.
    ///
    /// Adjacent forwarders are linked through locators addressing the same
    /// link; a single-DPL forwarder offers its only locator without
    /// comparison. Where the chain enters, the first declared locator is
    /// used; where it leaves, the last one.
    pub fn resolve_dpls(
        &mut self,
        forwarders: &BTreeMap<String, ServiceFunctionForwarder>,
    ) -> Result<()> {
        let lookup = |name: &str| {
            forwarders
                .get(name)
                .ok_or_else(|| RendererError::forwarder_not_found(name))
        };
        let path_id = self.path_id;

        for i in 0..self.entries.len() {
            let (src, dst) = (self.entries[i].src.clone(), self.entries[i].dst.clone());
            match (&src, &dst) {
                (GraphNode::Ingress, GraphNode::Forwarder(d)) => {
                    let sff = lookup(d)?;
                    if self.ingress_dpl(d).is_none() {
                        let dpl = first_dpl(sff, path_id)?.clone();
                        self.set_ingress_dpl(d, dpl);
                    }
                }
                (GraphNode::Forwarder(s), GraphNode::Egress) => {
                    let sff = lookup(s)?;
                    if self.egress_dpl(s).is_none() {
                        let dpl = last_dpl(sff, path_id)?.clone();
                        self.set_egress_dpl(s, dpl);
                    }
                }
                (GraphNode::Forwarder(s), GraphNode::Forwarder(d)) if s == d => {
                    // Locators resolved for an earlier hop stay in place.
                }
                (GraphNode::Forwarder(s), GraphNode::Forwarder(d)) => {
                    let (egress, ingress) = match_dpls(lookup(s)?, lookup(d)?, path_id)?;
                    let (egress, ingress) = (egress.clone(), ingress.clone());
                    self.set_egress_dpl(s, egress);
                    self.set_ingress_dpl(d, ingress);
                }
                _ => {
                    return Err(RendererError::internal(format!(
                        "unexpected graph entry {} -> {} on path {}",
                        src, dst, path_id
                    )))
                }
            }
        }

        // A forwarder with one locator uses it both ways.
        for name in self.forwarders().into_iter().map(str::to_string).collect::<Vec<_>>() {
            let sff = lookup(&name)?;
            let entry = self.dpls.entry(name.clone()).or_default();
            if entry.ingress.is_none() {
                entry.ingress = entry.egress.clone().or_else(|| sff.single_dpl().cloned());
            }
            if entry.egress.is_none() {
                entry.egress = entry.ingress.clone().or_else(|| sff.single_dpl().cloned());
            }
        }

        debug!(path_id = %path_id, forwarders = self.dpls.len(), "resolved data plane locators");
        Ok(())
    }
}

fn first_dpl(sff: &ServiceFunctionForwarder, path: PathId) -> Result<&DataPlaneLocator> {
    sff.dpls
        .first()
        .ok_or_else(|| RendererError::locator_missing("data plane locator", &sff.name, path))
}

fn last_dpl(sff: &ServiceFunctionForwarder, path: PathId) -> Result<&DataPlaneLocator> {
    sff.dpls
        .last()
        .ok_or_else(|| RendererError::locator_missing("data plane locator", &sff.name, path))
}

/// Finds the (egress of `src`, ingress of `dst`) locator pair of a link.
fn match_dpls<'a>(
    src: &'a ServiceFunctionForwarder,
    dst: &'a ServiceFunctionForwarder,
    path: PathId,
) -> Result<(&'a DataPlaneLocator, &'a DataPlaneLocator)> {
    first_dpl(src, path)?;
    first_dpl(dst, path)?;

    if let (Some(a), Some(b)) = (src.single_dpl(), dst.single_dpl()) {
        return Ok((a, b));
    }
    let candidates_src: Vec<&DataPlaneLocator> = match src.single_dpl() {
        Some(only) => vec![only],
        None => src.dpls.iter().collect(),
    };
    let candidates_dst: Vec<&DataPlaneLocator> = match dst.single_dpl() {
        Some(only) => vec![only],
        None => dst.dpls.iter().collect(),
    };
    for a in &candidates_src {
        if let Some(b) = candidates_dst
            .iter()
            .find(|b| a.locator.same_link(&b.locator))
        {
            return Ok((a, b));
        }
    }
    Err(RendererError::dpl_unresolved(&src.name, &dst.name, path))
}
