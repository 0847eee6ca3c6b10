//! Flow entity model.
//!
//! A [`FlowEntity`] is one match/action rule destined for a forwarding
//! device. Flows are identified by [`FlowKey`] (node, physical table, match
//! key): writing a flow with the key of an existing one replaces it.

pub mod cookie;
mod entity;
pub mod priority;
mod tables;

pub use cookie::{is_transport_egress_cookie, EgressCookie, COOKIE_BASE};
pub use entity::{Action, FlowEntity, FlowKey, FlowMatch, MatchField, MatchKind};
pub use tables::LogicalTable;

/// Well-known ether types.
pub mod ether_type {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const MPLS_UNICAST: u16 = 0x8847;
    pub const NSH: u16 = 0x894f;
}

/// IP protocol numbers.
pub mod ip_proto {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// VXLAN-GPE next protocol carrying NSH.
pub const GPE_NEXT_PROTO_NSH: u8 = 0x4;

/// ARP request opcode.
pub const ARP_OP_REQUEST: u16 = 1;
