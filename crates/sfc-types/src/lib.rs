//! Value types for service function chaining.
//!
//! This crate provides the type-safe building blocks shared by the renderer
//! and its collaborators:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`MplsLabel`]: 20-bit MPLS labels
//! - [`PathId`] / [`ServiceIndex`]: the in-band path identity of a chain
//! - [`Locator`] / [`DataPlaneLocator`]: where a forwarder or function is reachable
//! - [`RenderedServicePath`]: an ordered chain instantiation
//! - [`ServiceFunctionForwarder`] / [`ServiceFunction`]: topology descriptors

mod locator;
mod mac;
mod mpls;
mod path;
mod rsp;
mod topology;
mod transport;
mod vlan;

pub use locator::{DataPlaneLocator, Locator};
pub use mac::MacAddress;
pub use mpls::MplsLabel;
pub use path::{NodeId, PathId, ServiceIndex};
pub use rsp::{RenderedServicePath, RspHop};
pub use topology::{FunctionAttachment, FunctionType, ServiceFunction, ServiceFunctionForwarder};
pub use transport::TransportKind;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid MPLS label: {0} (must be 16-1048575)")]
    InvalidMplsLabel(u32),

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("unknown transport type: {0}")]
    UnknownTransport(String),

    #[error("invalid rendered service path: {0}")]
    InvalidRsp(String),
}
