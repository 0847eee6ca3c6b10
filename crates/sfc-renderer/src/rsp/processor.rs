//! Rendered service path processing.
//!
//! One lock serializes every mutation: processing, deletion and reactive
//! insertions all run under it, against a single flow writer, the
//! per-forwarder reference counts and the hop tags of every path.

use super::resolver::{LocatorResolver, ResolvedPath};
use crate::config::RendererConfig;
use crate::error::{RendererError, Result};
use crate::flow::{FlowEntity, FlowKey};
use crate::graph::SffGraph;
use crate::packet_in::ReactiveFlowSink;
use crate::programmer::{FlowProgrammer, HopTag};
use crate::transport::{legs, HopTagPool, TransportProcessor};
use crate::writer::{FlowBucket, FlowStore, FlowWriter, WriterStats};
use async_trait::async_trait;
use sfc_orch_common::RefCountMap;
use sfc_types::{NodeId, PathId, RenderedServicePath, ServiceFunctionForwarder, TransportKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Progress of one processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessingState {
    Start,
    GraphBuilt,
    DplsResolved,
    Programmed,
    Flushed,
    Committed,
    Purged,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::GraphBuilt => "graph-built",
            Self::DplsResolved => "dpls-resolved",
            Self::Programmed => "programmed",
            Self::Flushed => "flushed",
            Self::Committed => "committed",
            Self::Purged => "purged",
        };
        f.write_str(s)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub path_id: PathId,
    /// `Flushed`, or `Committed` when the processor waits for the store.
    pub state: ProcessingState,
    /// Per-path flows written.
    pub flows: usize,
    /// Nodes visited by the path.
    pub nodes: BTreeSet<NodeId>,
    /// Nodes whose bootstrap flows were written by this run.
    pub bootstrapped: BTreeSet<NodeId>,
}

#[derive(Debug, Clone)]
struct RenderedPath {
    transport: TransportKind,
    nodes: BTreeSet<NodeId>,
}

/// A reactive flow on the device, removed once idle for its timeout.
#[derive(Debug, Clone, Copy)]
struct ReactiveEntry {
    owner: PathId,
    /// `None` for flows without an idle timeout.
    expires_at: Option<Instant>,
}

struct ProcessorState {
    writer: FlowWriter,
    node_refs: RefCountMap<NodeId>,
    tags: HopTagPool,
    rendered: BTreeMap<PathId, RenderedPath>,
    reactive: BTreeMap<FlowKey, ReactiveEntry>,
}

impl ProcessorState {
    /// Unstages expired reactive flows of `owner` and commits their removal.
    fn expire_reactive(&mut self, owner: PathId, keys: &[FlowKey]) -> Result<usize> {
        for key in keys {
            if self.reactive.get(key).is_some_and(|e| e.owner == owner) {
                self.reactive.remove(key);
            }
        }
        let expired = self.writer.expire_reactive_flows(owner, keys);
        self.writer.delete_flow_set()?;
        Ok(expired)
    }
}

/// Compiles rendered service paths into flows and keeps track of them.
pub struct RspProcessor {
    programmer: FlowProgrammer,
    resolver: Arc<dyn LocatorResolver>,
    state: Mutex<ProcessorState>,
    processing_timeout: Option<Duration>,
    wait_for_commit: bool,
}

impl RspProcessor {
    pub fn new(
        programmer: FlowProgrammer,
        resolver: Arc<dyn LocatorResolver>,
        writer: FlowWriter,
    ) -> Self {
        Self {
            programmer,
            resolver,
            state: Mutex::new(ProcessorState {
                writer,
                node_refs: RefCountMap::new(),
                tags: HopTagPool::new(),
                rendered: BTreeMap::new(),
                reactive: BTreeMap::new(),
            }),
            processing_timeout: None,
            wait_for_commit: false,
        }
    }

    /// Builds the processor and its writer from configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(
        config: &RendererConfig,
        resolver: Arc<dyn LocatorResolver>,
        store: Arc<dyn FlowStore>,
    ) -> Self {
        let mut processor = Self::new(
            FlowProgrammer::from_config(&config.pipeline),
            resolver,
            FlowWriter::from_config(store, &config.writer),
        );
        processor.processing_timeout = config.processing_timeout();
        processor
    }

    /// Aborts a run into purge once it takes longer than `timeout`.
    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = Some(timeout);
        self
    }

    /// Makes every run wait until its batch is committed or dropped.
    pub fn with_commit_wait(mut self, wait: bool) -> Self {
        self.wait_for_commit = wait;
        self
    }

    pub fn programmer(&self) -> &FlowProgrammer {
        &self.programmer
    }

    /// Renders a path, replacing any previous rendering of the same path id.
    ///
    /// On failure nothing of this run is committed.
    pub async fn process_rsp(&self, rsp: &RenderedServicePath) -> Result<ProcessOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let path_id = rsp.path_id;
        info!(
            path_id = %path_id,
            name = %rsp.name,
            transport = %rsp.transport,
            hops = rsp.hops.len(),
            "processing rendered service path"
        );

        if state.rendered.contains_key(&path_id) {
            debug!(path_id = %path_id, "path already rendered, removing previous flows");
            Self::remove_path(state, path_id)?;
        }

        let mut acquired = Vec::new();
        let run = self.program(state, rsp, &mut acquired);
        let result = match self.processing_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => Err(RendererError::Timeout {
                    path: path_id,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
            None => run.await,
        };

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                state.writer.delete_rsp_flows(path_id);
                let purged = state.writer.purge_flows();
                state.tags.release(path_id);
                for node in &acquired {
                    if let Err(release_err) = state.node_refs.release(node) {
                        warn!(node = %node, "releasing forwarder reference: {}", release_err);
                    }
                }
                error!(
                    path_id = %path_id,
                    state = %ProcessingState::Purged,
                    purged,
                    "processing failed: {}",
                    e
                );
                return Err(e);
            }
        };

        if self.wait_for_commit {
            state.writer.drain().await?;
            outcome.state = ProcessingState::Committed;
        }
        info!(
            path_id = %path_id,
            state = %outcome.state,
            flows = outcome.flows,
            nodes = outcome.nodes.len(),
            "rendered service path processed"
        );
        Ok(outcome)
    }

    async fn program(
        &self,
        state: &mut ProcessorState,
        rsp: &RenderedServicePath,
        acquired: &mut Vec<NodeId>,
    ) -> Result<ProcessOutcome> {
        let path_id = rsp.path_id;
        let mut graph = SffGraph::build(rsp)?;
        debug!(
            path_id = %path_id,
            state = %ProcessingState::GraphBuilt,
            entries = graph.entries().len(),
            "built forwarder graph"
        );

        let path = ResolvedPath::resolve(self.resolver.as_ref(), rsp).await?;
        graph.resolve_dpls(path.forwarders())?;
        debug!(path_id = %path_id, state = %ProcessingState::DplsResolved, "resolved locators");

        let processor = TransportProcessor::new(rsp.transport);
        let transports = processor.set_rsp_transports(&graph, &mut state.tags)?;

        let mut nodes = BTreeSet::new();
        let mut bootstrapped = BTreeSet::new();
        for name in rsp.forwarders() {
            let sff = path.forwarder(name)?;
            if !nodes.insert(sff.node.clone()) {
                continue;
            }
            if state.node_refs.acquire(&sff.node) == 1 {
                bootstrapped.insert(sff.node.clone());
                for flow in self.programmer.default_flows(&sff.node) {
                    state.writer.write_bootstrap_flow(flow);
                }
            }
            acquired.push(sff.node.clone());
            self.bootstrap_transport(state, &processor, sff);
        }

        let mut flows = 0;
        for index in 0..graph.entries().len() {
            for leg in legs(&self.programmer, &graph, &transports, &path, index)? {
                for flow in processor.leg_flows(&leg)? {
                    state.writer.write_flow(path_id, flow);
                    flows += 1;
                }
            }
        }
        debug!(path_id = %path_id, state = %ProcessingState::Programmed, flows, "programmed hops");

        let batch = state.writer.flush_flows()?;
        debug!(path_id = %path_id, state = %ProcessingState::Flushed, batch, "flushed flows");

        state.rendered.insert(
            path_id,
            RenderedPath {
                transport: rsp.transport,
                nodes: nodes.clone(),
            },
        );
        Ok(ProcessOutcome {
            path_id,
            state: ProcessingState::Flushed,
            flows,
            nodes,
            bootstrapped,
        })
    }

    /// Writes the transport's generic ingress rules unless already present.
    ///
    /// Paths of different transports can share a node, so this runs for
    /// every path and not only on first reference.
    fn bootstrap_transport(
        &self,
        state: &mut ProcessorState,
        processor: &TransportProcessor,
        sff: &ServiceFunctionForwarder,
    ) {
        for flow in processor.transport_ingress_flows(&self.programmer, sff) {
            if !state.writer.has_flow(FlowBucket::Bootstrap, &flow.key()) {
                state.writer.write_bootstrap_flow(flow);
            }
        }
    }

    /// Stages and commits the removal of a rendered path.
    ///
    /// Returns the nodes whose bootstrap flows went with it.
    fn remove_path(state: &mut ProcessorState, path_id: PathId) -> Result<BTreeSet<NodeId>> {
        let Some(rendered) = state.rendered.remove(&path_id) else {
            return Ok(BTreeSet::new());
        };
        state.writer.delete_rsp_flows(path_id);
        let tags = state.tags.release(path_id);
        state.reactive.retain(|_, entry| entry.owner != path_id);

        let mut cleared = BTreeSet::new();
        for node in &rendered.nodes {
            if state.node_refs.release(node)? == 0 {
                state.writer.clear_node_bootstrap(node);
                cleared.insert(node.clone());
            }
        }
        cleared.extend(state.writer.clear_nodes_if_no_rsp_exists());
        let deleted = state.writer.delete_flow_set()?;
        info!(
            path_id = %path_id,
            transport = %rendered.transport,
            flows = deleted,
            tags,
            cleared_nodes = cleared.len(),
            "removed rendered service path"
        );
        Ok(cleared)
    }

    /// Removes every flow of a path.
    ///
    /// Returns the nodes left without any path, whose bootstrap flows were
    /// removed too. Unknown path ids are a no-op.
    pub async fn delete_rsp(&self, path_id: PathId) -> Result<BTreeSet<NodeId>> {
        let mut state = self.state.lock().await;
        if !state.rendered.contains_key(&path_id) {
            warn!(path_id = %path_id, "delete of unknown rendered service path");
            return Ok(BTreeSet::new());
        }
        let cleared = Self::remove_path(&mut state, path_id)?;
        if self.wait_for_commit {
            state.writer.drain().await?;
        }
        Ok(cleared)
    }

    /// Writes and flushes flows owned by a rendered path.
    ///
    /// The flows live in their own bucket: they go with the path, or earlier
    /// through [`RspProcessor::expire_reactive_flows`] or once idle past
    /// their timeout.
    pub async fn install_reactive_flows(
        &self,
        owner: PathId,
        flows: Vec<FlowEntity>,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        if !state.rendered.contains_key(&owner) {
            return Err(RendererError::InvalidRsp {
                message: format!("path {} is not rendered", owner),
            });
        }
        let now = Instant::now();
        for flow in flows {
            let entry = ReactiveEntry {
                owner,
                expires_at: (flow.idle_timeout > 0)
                    .then(|| now + Duration::from_secs(u64::from(flow.idle_timeout))),
            };
            state.reactive.insert(flow.key(), entry);
            state.writer.write_reactive_flow(owner, flow);
        }
        let count = state.writer.flush_flows()?;
        if self.wait_for_commit {
            state.writer.drain().await?;
        }
        Ok(count)
    }

    /// Removes reactive flows of `owner`. Unknown keys are ignored.
    pub async fn expire_reactive_flows(&self, owner: PathId, keys: &[FlowKey]) -> Result<usize> {
        let mut state = self.state.lock().await;
        let expired = state.expire_reactive(owner, keys)?;
        if self.wait_for_commit {
            state.writer.drain().await?;
        }
        Ok(expired)
    }

    /// Removes reactive flows whose idle timeout has passed at `now`.
    ///
    /// Flows without an idle timeout never expire here.
    pub async fn expire_idle_reactive_flows(&self, now: Instant) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut by_owner: BTreeMap<PathId, Vec<FlowKey>> = BTreeMap::new();
        for (key, entry) in &state.reactive {
            if entry.expires_at.is_some_and(|at| at <= now) {
                by_owner.entry(entry.owner).or_default().push(key.clone());
            }
        }
        let mut expired = 0;
        for (owner, keys) in by_owner {
            expired += state.expire_reactive(owner, &keys)?;
        }
        if expired > 0 {
            info!(flows = expired, "expired idle reactive flows");
        }
        if self.wait_for_commit {
            state.writer.drain().await?;
        }
        Ok(expired)
    }

    /// Reactive flows the writer holds for `owner`.
    pub async fn reactive_flow_count(&self, owner: PathId) -> usize {
        self.state
            .lock()
            .await
            .writer
            .flows_for(FlowBucket::Reactive(owner))
            .len()
    }

    /// Hop tags held by a rendered path.
    pub async fn hop_tags(&self, path: PathId) -> Vec<HopTag> {
        self.state.lock().await.tags.held_by(path).to_vec()
    }

    pub async fn rendered_paths(&self) -> Vec<PathId> {
        self.state.lock().await.rendered.keys().copied().collect()
    }

    /// Path ids owning flows in the writer.
    pub async fn flow_path_ids(&self) -> Vec<PathId> {
        self.state.lock().await.writer.path_ids()
    }

    /// Number of rendered paths visiting `node`.
    pub async fn node_references(&self, node: &NodeId) -> u32 {
        self.state.lock().await.node_refs.count(node)
    }

    pub async fn has_bootstrap(&self, node: &NodeId) -> bool {
        self.state.lock().await.writer.has_bootstrap(node)
    }

    pub async fn writer_stats(&self) -> WriterStats {
        self.state.lock().await.writer.stats()
    }

    /// Waits for every queued commit.
    pub async fn drain(&self) -> Result<()> {
        self.state.lock().await.writer.drain().await
    }

    /// Stops the commit worker; returns the number of dropped batches.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let mut state = self.state.lock().await;
        let dropped = state.writer.shutdown(timeout).await;
        info!(dropped, "renderer shut down");
        dropped
    }
}

#[async_trait]
impl ReactiveFlowSink for RspProcessor {
    async fn install(&self, owner: PathId, flows: Vec<FlowEntity>) -> Result<usize> {
        self.install_reactive_flows(owner, flows).await
    }

    async fn expire(&self, owner: PathId, keys: Vec<FlowKey>) -> Result<usize> {
        self.expire_reactive_flows(owner, &keys).await
    }
}

impl fmt::Debug for RspProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RspProcessor")
            .field("programmer", &self.programmer)
            .field("processing_timeout", &self.processing_timeout)
            .field("wait_for_commit", &self.wait_for_commit)
            .finish()
    }
}
