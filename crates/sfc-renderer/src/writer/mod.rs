//! Buffered, transactional flow writer.
//!
//! Flows are staged into an add set and a delete set, both deduplicated by
//! [`FlowKey`]. Every staged flow is also recorded under a [`FlowBucket`] so
//! a path's flows can later be removed by path id alone. Flushing hands the
//! staged set to a single worker as one batch; the caller never waits for
//! the store.

mod store;

pub use store::{FlowBatch, FlowStore, InMemoryFlowStore, StoredFlowId};

use crate::config::WriterConfig;
use crate::error::Result;
use crate::flow::{FlowEntity, FlowKey};
use serde::Serialize;
use sfc_orch_common::{RetryPolicy, SerialWorker};
use sfc_types::{NodeId, PathId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Owner of a group of flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowBucket {
    /// Rules shared by every path on a node.
    Bootstrap,
    Path(PathId),
    /// Packet-in driven rules of a path, each living until it expires.
    Reactive(PathId),
}

impl fmt::Display for FlowBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::Path(path) => write!(f, "path {}", path),
            Self::Reactive(path) => write!(f, "reactive flows of path {}", path),
        }
    }
}

#[derive(Debug, Default)]
struct CommitCounters {
    batches: AtomicU64,
    failed_batches: AtomicU64,
    flows_put: AtomicU64,
    flows_deleted: AtomicU64,
    flows_dropped: AtomicU64,
}

/// Commit counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub committed_batches: u64,
    pub failed_batches: u64,
    pub flows_put: u64,
    pub flows_deleted: u64,
    /// Puts and deletes of batches that failed every attempt.
    pub flows_dropped: u64,
}

pub struct FlowWriter {
    store: Arc<dyn FlowStore>,
    worker: SerialWorker,
    retry: RetryPolicy,
    buckets: BTreeMap<FlowBucket, BTreeMap<FlowKey, FlowEntity>>,
    adds: BTreeMap<FlowKey, FlowEntity>,
    deletes: BTreeSet<FlowKey>,
    counters: Arc<CommitCounters>,
}

impl FlowWriter {
    /// Creates a writer and spawns its commit worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn FlowStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            worker: SerialWorker::spawn("flow-writer"),
            retry,
            buckets: BTreeMap::new(),
            adds: BTreeMap::new(),
            deletes: BTreeSet::new(),
            counters: Arc::new(CommitCounters::default()),
        }
    }

    pub fn from_config(store: Arc<dyn FlowStore>, config: &WriterConfig) -> Self {
        let retry = RetryPolicy::new(
            config.max_commit_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        );
        Self::new(store, retry)
    }

    fn stage(&mut self, bucket: FlowBucket, flow: FlowEntity) {
        let key = flow.key();
        self.deletes.remove(&key);
        self.buckets
            .entry(bucket)
            .or_default()
            .insert(key.clone(), flow.clone());
        self.adds.insert(key, flow);
    }

    /// Stages a flow owned by `path`.
    pub fn write_flow(&mut self, path: PathId, flow: FlowEntity) {
        self.stage(FlowBucket::Path(path), flow);
    }

    /// Stages a packet-in driven flow owned by `path`.
    pub fn write_reactive_flow(&mut self, path: PathId, flow: FlowEntity) {
        self.stage(FlowBucket::Reactive(path), flow);
    }

    /// Stages a flow shared by all paths on its node.
    pub fn write_bootstrap_flow(&mut self, flow: FlowEntity) {
        self.stage(FlowBucket::Bootstrap, flow);
    }

    fn stage_delete(&mut self, key: FlowKey) {
        let shared = self.buckets.values().any(|flows| flows.contains_key(&key));
        self.adds.remove(&key);
        if !shared {
            self.deletes.insert(key);
        }
    }

    /// Moves every flow of `path`, reactive ones included, into the delete
    /// set and drops its buckets.
    ///
    /// Returns the nodes the path had flows on.
    pub fn delete_rsp_flows(&mut self, path: PathId) -> BTreeSet<NodeId> {
        let mut keys: Vec<FlowKey> = Vec::new();
        for bucket in [FlowBucket::Path(path), FlowBucket::Reactive(path)] {
            if let Some(flows) = self.buckets.remove(&bucket) {
                keys.extend(flows.into_keys());
            }
        }
        let nodes: BTreeSet<NodeId> = keys.iter().map(|k| k.node.clone()).collect();
        let count = keys.len();
        for key in keys {
            self.stage_delete(key);
        }
        if count > 0 {
            debug!(
                path_id = %path,
                flows = count,
                nodes = nodes.len(),
                "staged path flows for deletion"
            );
        }
        nodes
    }

    /// Moves the given reactive flows of `path` into the delete set.
    ///
    /// Keys the path does not hold are skipped. Returns how many were staged.
    pub fn expire_reactive_flows(&mut self, path: PathId, keys: &[FlowKey]) -> usize {
        let bucket = FlowBucket::Reactive(path);
        let Some(flows) = self.buckets.get_mut(&bucket) else {
            return 0;
        };
        let expired: Vec<FlowKey> = keys
            .iter()
            .filter(|key| flows.remove(*key).is_some())
            .cloned()
            .collect();
        if flows.is_empty() {
            self.buckets.remove(&bucket);
        }
        let count = expired.len();
        for key in expired {
            self.stage_delete(key);
        }
        debug!(path_id = %path, flows = count, "staged expired reactive flows for deletion");
        count
    }

    /// Moves the bootstrap flows of one node into the delete set.
    pub fn clear_node_bootstrap(&mut self, node: &NodeId) -> usize {
        let Some(bootstrap) = self.buckets.get_mut(&FlowBucket::Bootstrap) else {
            return 0;
        };
        let keys: Vec<FlowKey> = bootstrap
            .keys()
            .filter(|k| &k.node == node)
            .cloned()
            .collect();
        for key in &keys {
            bootstrap.remove(key);
        }
        if bootstrap.is_empty() {
            self.buckets.remove(&FlowBucket::Bootstrap);
        }
        let count = keys.len();
        for key in keys {
            self.stage_delete(key);
        }
        debug!(node = %node, flows = count, "staged bootstrap flows for deletion");
        count
    }

    /// Clears the bootstrap bucket once no path bucket is left.
    ///
    /// Returns the nodes whose bootstrap flows were staged for deletion.
    pub fn clear_nodes_if_no_rsp_exists(&mut self) -> BTreeSet<NodeId> {
        if self.buckets.keys().any(|b| matches!(b, FlowBucket::Path(_))) {
            return BTreeSet::new();
        }
        let Some(bootstrap) = self.buckets.remove(&FlowBucket::Bootstrap) else {
            return BTreeSet::new();
        };
        let nodes: BTreeSet<NodeId> = bootstrap.keys().map(|k| k.node.clone()).collect();
        for key in bootstrap.into_keys() {
            self.stage_delete(key);
        }
        nodes
    }

    /// Discards both staged sets without committing.
    ///
    /// Flows staged for addition are also forgotten by their buckets.
    pub fn purge_flows(&mut self) -> usize {
        let adds = std::mem::take(&mut self.adds);
        for key in adds.keys() {
            for flows in self.buckets.values_mut() {
                flows.remove(key);
            }
        }
        self.buckets.retain(|_, flows| !flows.is_empty());
        let purged = adds.len() + self.deletes.len();
        self.deletes.clear();
        if purged > 0 {
            info!(flows = purged, "purged staged flows");
        }
        purged
    }

    /// Queues the add set as one batch and clears it.
    pub fn flush_flows(&mut self) -> Result<usize> {
        let puts: Vec<FlowEntity> = std::mem::take(&mut self.adds).into_values().collect();
        self.submit(
            "flush",
            FlowBatch {
                puts,
                deletes: Vec::new(),
            },
        )
    }

    /// Queues the delete set as one batch and clears it.
    pub fn delete_flow_set(&mut self) -> Result<usize> {
        let deletes: Vec<FlowKey> = std::mem::take(&mut self.deletes).into_iter().collect();
        self.submit(
            "delete",
            FlowBatch {
                puts: Vec::new(),
                deletes,
            },
        )
    }

    fn submit(&self, operation: &'static str, batch: FlowBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let size = batch.len();
        let batch = Arc::new(batch);
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let retry = self.retry;

        self.worker.submit(async move {
            let result = retry
                .run(operation, |_| {
                    let store = Arc::clone(&store);
                    let batch = Arc::clone(&batch);
                    async move { store.commit(&batch).await }
                })
                .await;
            match result {
                Ok(()) => {
                    counters.batches.fetch_add(1, Ordering::SeqCst);
                    counters
                        .flows_put
                        .fetch_add(batch.puts.len() as u64, Ordering::SeqCst);
                    counters
                        .flows_deleted
                        .fetch_add(batch.deletes.len() as u64, Ordering::SeqCst);
                    info!(
                        operation,
                        puts = batch.puts.len(),
                        deletes = batch.deletes.len(),
                        "committed flow batch"
                    );
                }
                Err(e) => {
                    counters.failed_batches.fetch_add(1, Ordering::SeqCst);
                    counters
                        .flows_dropped
                        .fetch_add(batch.len() as u64, Ordering::SeqCst);
                    error!(
                        operation,
                        flows = batch.len(),
                        attempts = retry.max_attempts(),
                        "dropping flow batch: {}",
                        e
                    );
                }
            }
        })?;
        debug!(operation, flows = size, "queued flow batch");
        Ok(size)
    }

    /// Path ids that currently own flows.
    pub fn path_ids(&self) -> Vec<PathId> {
        self.buckets
            .keys()
            .filter_map(|b| match b {
                FlowBucket::Path(path) => Some(*path),
                FlowBucket::Bootstrap | FlowBucket::Reactive(_) => None,
            })
            .collect()
    }

    pub fn flows_for(&self, bucket: FlowBucket) -> Vec<&FlowEntity> {
        self.buckets
            .get(&bucket)
            .map(|flows| flows.values().collect())
            .unwrap_or_default()
    }

    pub fn has_flow(&self, bucket: FlowBucket, key: &FlowKey) -> bool {
        self.buckets
            .get(&bucket)
            .is_some_and(|flows| flows.contains_key(key))
    }

    pub fn has_bootstrap(&self, node: &NodeId) -> bool {
        self.buckets
            .get(&FlowBucket::Bootstrap)
            .is_some_and(|flows| flows.keys().any(|k| &k.node == node))
    }

    pub fn pending_adds(&self) -> usize {
        self.adds.len()
    }

    pub fn pending_deletes(&self) -> usize {
        self.deletes.len()
    }

    /// Waits for every batch queued so far to be committed or dropped.
    pub async fn drain(&self) -> Result<()> {
        self.worker.drain().await?;
        Ok(())
    }

    /// Stops the commit worker, waiting up to `timeout` for queued batches.
    ///
    /// Returns the number of batches dropped on timeout.
    pub async fn shutdown(&mut self, timeout: Duration) -> usize {
        self.worker.shutdown(timeout).await
    }

    pub fn stats(&self) -> WriterStats {
        let c = &self.counters;
        WriterStats {
            committed_batches: c.batches.load(Ordering::SeqCst),
            failed_batches: c.failed_batches.load(Ordering::SeqCst),
            flows_put: c.flows_put.load(Ordering::SeqCst),
            flows_deleted: c.flows_deleted.load(Ordering::SeqCst),
            flows_dropped: c.flows_dropped.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for FlowWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowWriter")
            .field("buckets", &self.buckets.len())
            .field("pending_adds", &self.adds.len())
            .field("pending_deletes", &self.deletes.len())
            .field("worker", &self.worker)
            .finish()
    }
}
