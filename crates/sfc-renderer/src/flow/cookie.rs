//! TransportEgress cookies.
//!
//! Every TransportEgress rule carries `COOKIE_BASE << 8 | subtype`, so a
//! single shift and compare tells whether a cookie seen in a packet-in was
//! produced by this renderer.

use std::fmt;

/// 56-bit base sentinel shared by all TransportEgress cookies.
pub const COOKIE_BASE: u64 = 0x00BA_5EBA_11BA_5EBA;

/// Cookie carried by rules outside TransportEgress.
pub const NO_COOKIE: u64 = 0;

/// Subtype of a TransportEgress cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EgressCookie {
    NshTunnelEgress = 0x00,
    NshTunnelLastHop = 0x01,
    NshTunnelLastHopAppCoexistence = 0x02,
    NshEthernetEgress = 0x03,
    NshEthernetLastHop = 0x04,
    NshEthernetLastHopAppCoexistence = 0x05,
    MplsEgress = 0x06,
    MplsLastHop = 0x07,
    VlanEgress = 0x08,
    VlanLastHop = 0x09,
    LogicalEgress = 0x0a,
    LogicalLastHop = 0x0b,
    MacLastHopAppCoexistence = 0x0c,
    LogicalLastHopAppCoexistence = 0x0d,
}

impl EgressCookie {
    const ALL: [EgressCookie; 14] = [
        Self::NshTunnelEgress,
        Self::NshTunnelLastHop,
        Self::NshTunnelLastHopAppCoexistence,
        Self::NshEthernetEgress,
        Self::NshEthernetLastHop,
        Self::NshEthernetLastHopAppCoexistence,
        Self::MplsEgress,
        Self::MplsLastHop,
        Self::VlanEgress,
        Self::VlanLastHop,
        Self::LogicalEgress,
        Self::LogicalLastHop,
        Self::MacLastHopAppCoexistence,
        Self::LogicalLastHopAppCoexistence,
    ];

    pub const fn subtype(&self) -> u8 {
        *self as u8
    }

    /// Full 64-bit cookie value.
    pub const fn value(&self) -> u64 {
        (COOKIE_BASE << 8) | self.subtype() as u64
    }

    pub fn from_cookie(cookie: u64) -> Option<Self> {
        if !is_transport_egress_cookie(cookie) {
            return None;
        }
        let subtype = (cookie & 0xff) as u8;
        Self::ALL.into_iter().find(|c| c.subtype() == subtype)
    }

    pub const fn is_last_hop(&self) -> bool {
        matches!(
            self,
            Self::NshTunnelLastHop
                | Self::NshTunnelLastHopAppCoexistence
                | Self::NshEthernetLastHop
                | Self::NshEthernetLastHopAppCoexistence
                | Self::MplsLastHop
                | Self::VlanLastHop
                | Self::LogicalLastHop
                | Self::MacLastHopAppCoexistence
                | Self::LogicalLastHopAppCoexistence
        )
    }
}

impl fmt::Display for EgressCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.value())
    }
}

/// Prefix check used to accept only self-generated packet-ins.
pub const fn is_transport_egress_cookie(cookie: u64) -> bool {
    cookie >> 8 == COOKIE_BASE
}
