//! Flow store interface and the in-memory reference store.

use crate::error::{RendererError, Result};
use crate::flow::{FlowEntity, FlowKey};
use async_trait::async_trait;
use sfc_types::NodeId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One atomic unit of work for the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowBatch {
    pub puts: Vec<FlowEntity>,
    pub deletes: Vec<FlowKey>,
}

impl FlowBatch {
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.puts.len() + self.deletes.len()
    }
}

/// Persists flows on forwarding devices.
///
/// A batch is applied all-or-nothing: deletes first, then puts.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn commit(&self, batch: &FlowBatch) -> Result<()>;
}

/// Store identity of a committed flow: node, physical table, flow id.
pub type StoredFlowId = (NodeId, u8, String);

/// Keeps committed flows in memory.
///
/// Used by the binary and by tests; can be told to fail upcoming commits.
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: Mutex<BTreeMap<StoredFlowId, FlowEntity>>,
    commits: AtomicU64,
    fail_next: AtomicU32,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail without touching the flows.
    pub fn fail_next_commits(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<StoredFlowId, FlowEntity>> {
        self.flows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn flows(&self) -> Vec<FlowEntity> {
        self.lock().values().cloned().collect()
    }

    pub fn flows_on(&self, node: &NodeId) -> Vec<FlowEntity> {
        self.lock()
            .iter()
            .filter(|((n, _, _), _)| n == node)
            .map(|(_, flow)| flow.clone())
            .collect()
    }

    pub fn get(&self, key: &FlowKey) -> Option<FlowEntity> {
        self.lock()
            .get(&(key.node.clone(), key.table, key.flow_id()))
            .cloned()
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.get(key).is_some()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn commit(&self, batch: &FlowBatch) -> Result<()> {
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(RendererError::store("commit", "injected failure"));
        }

        let mut flows = self.lock();
        for key in &batch.deletes {
            flows.remove(&(key.node.clone(), key.table, key.flow_id()));
        }
        for flow in &batch.puts {
            let key = flow.key();
            flows.insert((key.node.clone(), key.table, key.flow_id()), flow.clone());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
