//! Path identity: path id, service index, and forwarding node id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a rendered service path.
///
/// Carried in-band as the NSH service path identifier and, for transports
/// that cannot carry it, in the pipeline metadata register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(u32);

impl PathId {
    pub const fn new(id: u32) -> Self {
        PathId(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Value written to / matched against the 64-bit metadata register.
    pub const fn as_metadata(&self) -> u64 {
        self.0 as u64
    }

    /// Recovers a path id from the metadata register.
    ///
    /// Returns `None` when the register holds a value wider than a path id.
    pub fn from_metadata(metadata: u64) -> Option<Self> {
        u32::try_from(metadata).ok().map(PathId)
    }

    /// The path id of the reverse direction of a symmetric chain.
    ///
    /// Symmetric chains are allocated in pairs, the reverse path taking the
    /// id following the forward one.
    pub fn symmetric_reverse(&self) -> Option<Self> {
        self.0.checked_add(1).map(PathId)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PathId {
    fn from(id: u32) -> Self {
        PathId(id)
    }
}

/// Position of a packet along a chain; decremented by every function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceIndex(u8);

impl ServiceIndex {
    /// Conventional starting index of a chain.
    pub const START: ServiceIndex = ServiceIndex(255);

    pub const fn new(index: u8) -> Self {
        ServiceIndex(index)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// The index after one more function has processed the packet.
    pub fn decremented(&self) -> Option<Self> {
        self.0.checked_sub(1).map(ServiceIndex)
    }
}

impl Default for ServiceIndex {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for ServiceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a programmable forwarding device (e.g. `openflow:1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_reverse() {
        assert_eq!(PathId::new(42).symmetric_reverse(), Some(PathId::new(43)));
        assert_eq!(PathId::new(u32::MAX).symmetric_reverse(), None);
    }

    #[test]
    fn test_metadata_round_trip_bounds() {
        assert_eq!(PathId::from_metadata(7), Some(PathId::new(7)));
        assert_eq!(PathId::from_metadata(u64::from(u32::MAX) + 1), None);
        assert_eq!(PathId::new(9).as_metadata(), 9);
    }

    #[test]
    fn test_service_index_decrement() {
        assert_eq!(ServiceIndex::START.decremented(), Some(ServiceIndex::new(254)));
        assert_eq!(ServiceIndex::new(0).decremented(), None);
    }
}
