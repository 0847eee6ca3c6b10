//! Fixed-offset Ethernet/IPv4 address extraction.

use crate::flow::ether_type;
use std::fmt;
use std::net::Ipv4Addr;

const ETHER_TYPE_OFFSET: usize = 12;
const VLAN_TAG_LEN: usize = 4;
const IPV4_SRC_OFFSET: usize = 26;
const IPV4_DST_OFFSET: usize = 30;

/// Why a packet-in was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Cookie not produced by a TransportEgress rule of this renderer.
    ForeignCookie(u64),
    /// Frame too short for the offsets it claims.
    Truncated(usize),
    NotIpv4(u16),
    /// Metadata register does not hold a path id.
    NoPath(u64),
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignCookie(cookie) => write!(f, "foreign cookie {:#x}", cookie),
            Self::Truncated(len) => write!(f, "truncated frame of {} bytes", len),
            Self::NotIpv4(ether_type) => write!(f, "ether type {:#06x} is not ipv4", ether_type),
            Self::NoPath(metadata) => write!(f, "metadata {:#x} holds no path id", metadata),
        }
    }
}

/// Addresses of one IPv4 conversation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Pair {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Pair {
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

fn read_u16(frame: &[u8], offset: usize) -> Result<u16, DiscardReason> {
    frame
        .get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DiscardReason::Truncated(frame.len()))
}

fn read_ipv4(frame: &[u8], offset: usize) -> Result<Ipv4Addr, DiscardReason> {
    frame
        .get(offset..offset + 4)
        .map(|b| Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        .ok_or(DiscardReason::Truncated(frame.len()))
}

/// Reads source and destination of an IPv4 packet in an Ethernet frame.
///
/// Only the standard header layout is understood: one optional 802.1Q tag
/// and a 20-byte IPv4 header position, without looking at the IHL.
pub fn parse_ipv4_pair(frame: &[u8]) -> Result<Ipv4Pair, DiscardReason> {
    let mut shift = 0;
    let mut ether_type = read_u16(frame, ETHER_TYPE_OFFSET)?;
    if ether_type == ether_type::VLAN {
        shift = VLAN_TAG_LEN;
        ether_type = read_u16(frame, ETHER_TYPE_OFFSET + shift)?;
    }
    if ether_type != ether_type::IPV4 {
        return Err(DiscardReason::NotIpv4(ether_type));
    }
    Ok(Ipv4Pair {
        src: read_ipv4(frame, IPV4_SRC_OFFSET + shift)?,
        dst: read_ipv4(frame, IPV4_DST_OFFSET + shift)?,
    })
}
