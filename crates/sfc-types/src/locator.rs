//! Data plane locators.
//!
//! A locator is the transport-specific address at which a forwarder or a
//! function is reachable. Forwarders sharing a link declare the same locator
//! on the data plane locators (DPLs) facing each other, which is how the
//! renderer pairs the egress DPL of one hop with the ingress DPL of the next.

use crate::{MacAddress, MplsLabel, ParseError, VlanId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Transport-specific address of a data plane endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Locator {
    /// IP endpoint (tunnel transports).
    Ip { ip: Ipv4Addr, port: u16 },
    /// Ethernet endpoint with optional VLAN.
    Mac {
        mac: MacAddress,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vlan: Option<VlanId>,
    },
    /// MPLS endpoint.
    Mpls { label: MplsLabel },
}

impl Locator {
    /// Returns true when both locators address the same link.
    ///
    /// IP locators compare address and port, MAC locators compare address
    /// and VLAN, MPLS locators compare the label. Locators of different kinds
    /// never match.
    pub fn same_link(&self, other: &Locator) -> bool {
        match (self, other) {
            (Self::Ip { ip: a, port: pa }, Self::Ip { ip: b, port: pb }) => a == b && pa == pb,
            (Self::Mac { mac: a, vlan: va }, Self::Mac { mac: b, vlan: vb }) => a == b && va == vb,
            (Self::Mpls { label: a }, Self::Mpls { label: b }) => a == b,
            _ => false,
        }
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Ip { ip, .. } => Some(*ip),
            _ => None,
        }
    }

    pub fn mac(&self) -> Option<MacAddress> {
        match self {
            Self::Mac { mac, .. } => Some(*mac),
            _ => None,
        }
    }

    pub fn vlan(&self) -> Option<VlanId> {
        match self {
            Self::Mac { vlan, .. } => *vlan,
            _ => None,
        }
    }

    pub fn mpls_label(&self) -> Option<MplsLabel> {
        match self {
            Self::Mpls { label } => Some(*label),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip { ip, port } => write!(f, "{}:{}", ip, port),
            Self::Mac { mac, vlan: Some(vlan) } => write!(f, "{}@vlan{}", mac, vlan),
            Self::Mac { mac, vlan: None } => write!(f, "{}", mac),
            Self::Mpls { label } => write!(f, "mpls:{}", label),
        }
    }
}

/// A named data plane locator declared on a forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneLocator {
    pub name: String,
    pub locator: Locator,
    /// Switch port number the locator is bound to.
    #[serde(default)]
    pub port: Option<u32>,
    /// MAC address of the switch interface behind this locator.
    #[serde(default)]
    pub mac: Option<MacAddress>,
}

impl DataPlaneLocator {
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
            port: None,
            mac: None,
        }
    }

    pub fn with_port(mut self, port: u32) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    /// MAC address to use when rewriting frames toward this locator.
    ///
    /// The interface MAC wins over the MAC of a MAC locator.
    pub fn effective_mac(&self) -> Option<MacAddress> {
        self.mac.or_else(|| self.locator.mac())
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        if self.name.is_empty() {
            return Err(ParseError::InvalidLocator(format!(
                "unnamed locator {}",
                self.locator
            )));
        }
        Ok(())
    }
}
