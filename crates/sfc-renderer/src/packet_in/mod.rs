//! Reactive packet-in handling.
//!
//! Proxy-like functions punt the first packet of a conversation to the
//! controller. The reflector recovers the path from the packet metadata and
//! installs a PathMapperAcl rule per direction, so the rest of the
//! conversation (and its reply traffic) stays in the data plane. Once a
//! conversation leaves the duplicate window its rules are expired again.

mod dedup;
mod parse;
mod reflector;

pub use dedup::{DedupBuffer, DedupKey};
pub use parse::{parse_ipv4_pair, DiscardReason, Ipv4Pair};
pub use reflector::{PacketInReflector, ReflectOutcome, ReflectorStats};

use crate::error::Result;
use crate::flow::{FlowEntity, FlowKey};
use async_trait::async_trait;
use sfc_types::{NodeId, PathId};

/// A packet punted to the controller by a TransportEgress rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    /// Raw Ethernet frame.
    pub payload: Vec<u8>,
    pub cookie: u64,
    /// Metadata register at the time of the punt; holds the path id.
    pub metadata: u64,
    pub in_port: u32,
    pub node: NodeId,
}

impl PacketIn {
    pub fn new(node: impl Into<NodeId>, cookie: u64, metadata: u64, payload: Vec<u8>) -> Self {
        Self {
            payload,
            cookie,
            metadata,
            in_port: 0,
            node: node.into(),
        }
    }

    pub fn with_in_port(mut self, port: u32) -> Self {
        self.in_port = port;
        self
    }
}

/// Receives reactively built flows, owned by an already rendered path.
#[async_trait]
pub trait ReactiveFlowSink: Send + Sync {
    /// Writes `flows` under `owner` and returns how many were flushed.
    async fn install(&self, owner: PathId, flows: Vec<FlowEntity>) -> Result<usize>;

    /// Removes reactive flows of `owner` whose conversation went quiet.
    ///
    /// Keys `owner` no longer holds are ignored. Returns how many went.
    async fn expire(&self, owner: PathId, keys: Vec<FlowKey>) -> Result<usize>;
}
