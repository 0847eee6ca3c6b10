//! Forwarder and function descriptors.

use crate::{DataPlaneLocator, Locator, MacAddress, NodeId, ParseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of service function.
///
/// The renderer only treats [`FunctionType::TcpProxy`] specially: traffic
/// steered toward a proxy is also copied to the controller so the reverse
/// direction can be installed reactively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FunctionType {
    Firewall,
    Dpi,
    Napt44,
    HttpHeaderEnrichment,
    Qos,
    TcpProxy,
    Other(String),
}

impl FunctionType {
    /// Returns true when packets toward this function must also reach the
    /// controller.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::TcpProxy)
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Firewall => "firewall",
            Self::Dpi => "dpi",
            Self::Napt44 => "napt44",
            Self::HttpHeaderEnrichment => "http-header-enrichment",
            Self::Qos => "qos",
            Self::TcpProxy => "tcp-proxy",
            Self::Other(name) => name,
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FunctionType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ParseError::InvalidRsp("empty function type".to_string()));
        }
        Ok(match normalized.as_str() {
            "firewall" => Self::Firewall,
            "dpi" => Self::Dpi,
            "napt44" => Self::Napt44,
            "http-header-enrichment" | "header-enrichment" => Self::HttpHeaderEnrichment,
            "qos" => Self::Qos,
            "tcp-proxy" => Self::TcpProxy,
            _ => Self::Other(normalized),
        })
    }
}

impl TryFrom<String> for FunctionType {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FunctionType> for String {
    fn from(t: FunctionType) -> Self {
        t.to_string()
    }
}

/// A service function and the locator it is reachable at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFunction {
    pub name: String,
    #[serde(rename = "type")]
    pub function_type: FunctionType,
    pub locator: Locator,
    /// MAC of the function's interface, when distinct from a MAC locator.
    #[serde(default)]
    pub mac: Option<MacAddress>,
}

impl ServiceFunction {
    pub fn new(name: impl Into<String>, function_type: FunctionType, locator: Locator) -> Self {
        Self {
            name: name.into(),
            function_type,
            locator,
            mac: None,
        }
    }

    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn effective_mac(&self) -> Option<MacAddress> {
        self.mac.or_else(|| self.locator.mac())
    }
}

/// How a function hangs off a forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAttachment {
    pub function: String,
    /// Switch port facing the function.
    pub port: u32,
    /// MAC of the forwarder interface facing the function.
    #[serde(default)]
    pub mac: Option<MacAddress>,
}

/// A service function forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFunctionForwarder {
    pub name: String,
    /// Forwarding device the forwarder's rules are installed on.
    pub node: NodeId,
    #[serde(default)]
    pub dpls: Vec<DataPlaneLocator>,
    #[serde(default)]
    pub functions: Vec<FunctionAttachment>,
    /// Mesh tunnel ports keyed by the peer forwarder name.
    #[serde(default)]
    pub tunnel_ports: BTreeMap<String, u32>,
}

impl ServiceFunctionForwarder {
    pub fn new(name: impl Into<String>, node: impl Into<NodeId>) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            dpls: Vec::new(),
            functions: Vec::new(),
            tunnel_ports: BTreeMap::new(),
        }
    }

    pub fn with_dpl(mut self, dpl: DataPlaneLocator) -> Self {
        self.dpls.push(dpl);
        self
    }

    pub fn with_function(mut self, function: impl Into<String>, port: u32) -> Self {
        self.functions.push(FunctionAttachment {
            function: function.into(),
            port,
            mac: None,
        });
        self
    }

    pub fn with_tunnel_port(mut self, peer: impl Into<String>, port: u32) -> Self {
        self.tunnel_ports.insert(peer.into(), port);
        self
    }

    /// The only DPL of a single-DPL forwarder.
    pub fn single_dpl(&self) -> Option<&DataPlaneLocator> {
        match self.dpls.as_slice() {
            [dpl] => Some(dpl),
            _ => None,
        }
    }

    pub fn dpl(&self, name: &str) -> Option<&DataPlaneLocator> {
        self.dpls.iter().find(|d| d.name == name)
    }

    pub fn attachment(&self, function: &str) -> Option<&FunctionAttachment> {
        self.functions.iter().find(|a| a.function == function)
    }

    pub fn tunnel_port(&self, peer: &str) -> Option<u32> {
        self.tunnel_ports.get(peer).copied()
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        for dpl in &self.dpls {
            dpl.validate()?;
        }
        Ok(())
    }
}
