//! Rendered service path descriptors.

use crate::{ParseError, PathId, ServiceIndex, TransportKind};
use serde::{Deserialize, Serialize};

/// One hop of a rendered service path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RspHop {
    pub forwarder: String,
    pub function: String,
    #[serde(default)]
    pub function_group: Option<String>,
    pub service_index: ServiceIndex,
}

impl RspHop {
    pub fn new(
        forwarder: impl Into<String>,
        function: impl Into<String>,
        service_index: ServiceIndex,
    ) -> Self {
        Self {
            forwarder: forwarder.into(),
            function: function.into(),
            function_group: None,
            service_index,
        }
    }
}

/// An ordered instantiation of a service chain, identified by its path id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedServicePath {
    pub path_id: PathId,
    pub name: String,
    pub transport: TransportKind,
    #[serde(default)]
    pub starting_index: ServiceIndex,
    pub hops: Vec<RspHop>,
}

impl RenderedServicePath {
    /// Builds a path whose hops carry consecutive indexes from
    /// [`ServiceIndex::START`] downward.
    pub fn new(
        path_id: PathId,
        name: impl Into<String>,
        transport: TransportKind,
        hops: &[(&str, &str)],
    ) -> Self {
        let start = ServiceIndex::START.as_u8();
        let hops = hops
            .iter()
            .enumerate()
            .map(|(i, (forwarder, function))| {
                let index = start.saturating_sub(u8::try_from(i).unwrap_or(u8::MAX));
                RspHop::new(*forwarder, *function, ServiceIndex::new(index))
            })
            .collect();
        Self {
            path_id,
            name: name.into(),
            transport,
            starting_index: ServiceIndex::START,
            hops,
        }
    }

    /// Checks the structural invariants the renderer relies on: at least one
    /// hop, strictly decreasing service indexes not above the starting index,
    /// and room left for the terminal index after the last hop.
    pub fn validate(&self) -> Result<(), ParseError> {
        let Some(last) = self.hops.last() else {
            return Err(ParseError::InvalidRsp(format!("path {} has no hops", self.path_id)));
        };
        let mut previous: Option<ServiceIndex> = None;
        for hop in &self.hops {
            if hop.forwarder.is_empty() || hop.function.is_empty() {
                return Err(ParseError::InvalidRsp(format!(
                    "path {} has a hop without forwarder or function",
                    self.path_id
                )));
            }
            if hop.service_index > self.starting_index {
                return Err(ParseError::InvalidRsp(format!(
                    "path {}: index {} above starting index {}",
                    self.path_id, hop.service_index, self.starting_index
                )));
            }
            if let Some(prev) = previous {
                if hop.service_index >= prev {
                    return Err(ParseError::InvalidRsp(format!(
                        "path {}: index {} does not decrease",
                        self.path_id, hop.service_index
                    )));
                }
            }
            previous = Some(hop.service_index);
        }
        if last.service_index.decremented().is_none() {
            return Err(ParseError::InvalidRsp(format!(
                "path {}: last hop leaves no terminal index",
                self.path_id
            )));
        }
        Ok(())
    }

    /// Forwarders visited by the path, in order, without repeats.
    pub fn forwarders(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for hop in &self.hops {
            if !seen.contains(&hop.forwarder.as_str()) {
                seen.push(hop.forwarder.as_str());
            }
        }
        seen
    }
}
