//! Transport encapsulations a chain can be rendered onto.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport encapsulation of a rendered service path.
///
/// Unknown transport names are rejected at parse time, so every
/// [`TransportKind`] value has a rule-generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransportKind {
    /// NSH carried over an IP tunnel (VXLAN-GPE).
    NshTunnel,
    /// NSH carried directly over Ethernet.
    NshEthernet,
    /// MPLS label per hop, path id kept in metadata.
    Mpls,
    /// VLAN tag per hop plus MAC chaining, path id kept in metadata.
    VlanMac,
    /// NSH over a full mesh of device-to-device tunnels.
    LogicalTunnel,
}

impl TransportKind {
    pub const ALL: [TransportKind; 5] = [
        Self::NshTunnel,
        Self::NshEthernet,
        Self::Mpls,
        Self::VlanMac,
        Self::LogicalTunnel,
    ];

    /// True when the packet carries path id and index in-band.
    pub const fn is_in_band(&self) -> bool {
        matches!(self, Self::NshTunnel | Self::NshEthernet | Self::LogicalTunnel)
    }

    /// True when a hop tag has to be translated into path state.
    pub const fn supports_path_mapper(&self) -> bool {
        !self.is_in_band()
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NshTunnel => write!(f, "vxlan-gpe"),
            Self::NshEthernet => write!(f, "nsh-ethernet"),
            Self::Mpls => write!(f, "mpls"),
            Self::VlanMac => write!(f, "mac"),
            Self::LogicalTunnel => write!(f, "logical-tunnel"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vxlan-gpe" | "vxgpe" | "nsh-tunnel" => Ok(Self::NshTunnel),
            "nsh-ethernet" | "nsh-eth" | "ethernet-nsh" => Ok(Self::NshEthernet),
            "mpls" => Ok(Self::Mpls),
            "mac" | "vlan" | "vlan-mac" => Ok(Self::VlanMac),
            "logical-tunnel" | "logical" => Ok(Self::LogicalTunnel),
            _ => Err(ParseError::UnknownTransport(s.to_string())),
        }
    }
}

impl TryFrom<String> for TransportKind {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TransportKind> for String {
    fn from(kind: TransportKind) -> String {
        kind.to_string()
    }
}
