//! Turns punted packets into per-conversation PathMapperAcl rules.

use super::dedup::{DedupBuffer, DedupKey};
use super::parse::{parse_ipv4_pair, DiscardReason};
use super::{PacketIn, ReactiveFlowSink};
use crate::config::PacketInConfig;
use crate::error::Result;
use crate::flow::{is_transport_egress_cookie, FlowKey};
use crate::programmer::FlowProgrammer;
use serde::Serialize;
use sfc_types::PathId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Packet-in counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReflectorStats {
    pub received: u64,
    pub discarded: u64,
    pub duplicates: u64,
    /// Packets that led to flow installation.
    pub accepted: u64,
    /// Flows handed to the sink.
    pub insertions: u64,
    /// Flows removed after their conversation was swept.
    pub expirations: u64,
}

/// What happened to one packet-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectOutcome {
    Discarded(DiscardReason),
    Duplicate,
    Installed {
        forward: PathId,
        /// Absent when the forward id has no successor.
        reverse: Option<PathId>,
        flows: usize,
    },
}

/// Reflects packet-ins of symmetric chains into reactive rules.
pub struct PacketInReflector<S: ReactiveFlowSink> {
    sink: Arc<S>,
    programmer: FlowProgrammer,
    dedup: DedupBuffer,
    /// Rules installed for each conversation still in the window.
    installed: HashMap<DedupKey, Vec<FlowKey>>,
    idle_timeout: u16,
    stats: ReflectorStats,
}

impl<S: ReactiveFlowSink> PacketInReflector<S> {
    pub fn new(sink: Arc<S>, programmer: FlowProgrammer, config: &PacketInConfig) -> Self {
        Self {
            sink,
            programmer,
            dedup: DedupBuffer::from_config(config),
            installed: HashMap::new(),
            idle_timeout: config.reactive_idle_timeout_secs,
            stats: ReflectorStats::default(),
        }
    }

    pub fn stats(&self) -> ReflectorStats {
        self.stats
    }

    pub fn dedup(&self) -> &DedupBuffer {
        &self.dedup
    }

    /// Conversations whose rules are currently installed.
    pub fn installed_conversations(&self) -> usize {
        self.installed.len()
    }

    pub async fn on_packet_in(&mut self, packet: &PacketIn) -> Result<ReflectOutcome> {
        self.on_packet_in_at(packet, Instant::now()).await
    }

    /// Handles `packet` as if it arrived at `now`.
    ///
    /// Installs, under the forward path, one rule steering src to dst onto
    /// the path and one steering dst to src onto its symmetric reverse.
    /// When installation fails the conversation is forgotten so a later
    /// packet retries it.
    pub async fn on_packet_in_at(
        &mut self,
        packet: &PacketIn,
        now: Instant,
    ) -> Result<ReflectOutcome> {
        self.stats.received += 1;

        let (path, key) = match self.classify(packet) {
            Ok(found) => found,
            Err(reason) => {
                self.stats.discarded += 1;
                debug!(node = %packet.node, %reason, "Discarding packet-in");
                return Ok(ReflectOutcome::Discarded(reason));
            }
        };

        let fresh = self.dedup.observe(key, now);
        self.expire_swept().await;
        if !fresh {
            self.stats.duplicates += 1;
            return Ok(ReflectOutcome::Duplicate);
        }

        let (_, src, dst) = key;
        let mut flows = vec![self.programmer.path_mapper_acl(
            &packet.node,
            path,
            src,
            dst,
            self.idle_timeout,
        )];
        let reverse = path.symmetric_reverse();
        match reverse {
            Some(reverse) => flows.push(self.programmer.path_mapper_acl(
                &packet.node,
                reverse,
                dst,
                src,
                self.idle_timeout,
            )),
            None => warn!(%path, "No reverse path id, reflecting forward direction only"),
        }

        let count = flows.len();
        let keys: Vec<FlowKey> = flows.iter().map(|f| f.key()).collect();
        if let Err(e) = self.sink.install(path, flows).await {
            self.dedup.forget(&key);
            warn!(%path, %src, %dst, error = %e, "Reactive flow installation failed");
            return Err(e);
        }

        self.installed.insert(key, keys);
        self.stats.accepted += 1;
        self.stats.insertions += count as u64;
        info!(node = %packet.node, %path, %src, %dst, "Installed reactive path flows");
        Ok(ReflectOutcome::Installed {
            forward: path,
            reverse,
            flows: count,
        })
    }

    /// Removes the rules of conversations the last sweep dropped.
    ///
    /// Failures are logged; the rules then stay until their path goes.
    async fn expire_swept(&mut self) {
        let mut by_owner: BTreeMap<PathId, Vec<FlowKey>> = BTreeMap::new();
        for key in self.dedup.take_swept() {
            if let Some(keys) = self.installed.remove(&key) {
                by_owner.entry(key.0).or_default().extend(keys);
            }
        }
        for (owner, keys) in by_owner {
            match self.sink.expire(owner, keys).await {
                Ok(expired) => {
                    self.stats.expirations += expired as u64;
                    debug!(path = %owner, flows = expired, "Expired reactive path flows");
                }
                Err(e) => warn!(path = %owner, error = %e, "Reactive flow expiry failed"),
            }
        }
    }

    fn classify(&self, packet: &PacketIn) -> std::result::Result<(PathId, DedupKey), DiscardReason> {
        if !is_transport_egress_cookie(packet.cookie) {
            return Err(DiscardReason::ForeignCookie(packet.cookie));
        }
        let pair = parse_ipv4_pair(&packet.payload)?;
        let path =
            PathId::from_metadata(packet.metadata).ok_or(DiscardReason::NoPath(packet.metadata))?;
        Ok((path, (path, pair.src, pair.dst)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse::frames::ipv4_frame;
    use super::*;
    use crate::error::RendererError;
    use crate::flow::{Action, EgressCookie, FlowEntity, MatchField};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        installed: Mutex<Vec<(PathId, Vec<FlowEntity>)>>,
        expired: Mutex<Vec<(PathId, Vec<FlowKey>)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ReactiveFlowSink for RecordingSink {
        async fn install(&self, owner: PathId, flows: Vec<FlowEntity>) -> Result<usize> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RendererError::store("install", "unavailable"));
            }
            let count = flows.len();
            self.installed.lock().unwrap().push((owner, flows));
            Ok(count)
        }

        async fn expire(&self, owner: PathId, keys: Vec<FlowKey>) -> Result<usize> {
            let count = keys.len();
            self.expired.lock().unwrap().push((owner, keys));
            Ok(count)
        }
    }

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 2, 2, 2);

    fn reflector(sink: &Arc<RecordingSink>) -> PacketInReflector<RecordingSink> {
        PacketInReflector::new(
            sink.clone(),
            FlowProgrammer::default(),
            &PacketInConfig::default(),
        )
    }

    fn packet(path: u64) -> PacketIn {
        PacketIn::new(
            "openflow:1",
            EgressCookie::NshTunnelLastHop.value(),
            path,
            ipv4_frame(SRC, DST, None),
        )
    }

    fn addresses(flow: &FlowEntity) -> (Ipv4Addr, Ipv4Addr) {
        let mut src = None;
        let mut dst = None;
        for field in flow.matches.fields() {
            match field {
                MatchField::Ipv4Src(ip) => src = Some(*ip),
                MatchField::Ipv4Dst(ip) => dst = Some(*ip),
                _ => {}
            }
        }
        (src.unwrap(), dst.unwrap())
    }

    #[tokio::test]
    async fn test_reflects_both_directions() {
        let sink = Arc::new(RecordingSink::default());
        let mut reflector = reflector(&sink);

        let outcome = reflector.on_packet_in(&packet(7)).await.unwrap();
        assert_eq!(
            outcome,
            ReflectOutcome::Installed {
                forward: PathId::new(7),
                reverse: Some(PathId::new(8)),
                flows: 2,
            }
        );

        let installed = sink.installed.lock().unwrap();
        assert_eq!(installed.len(), 1);
        let (owner, flows) = &installed[0];
        assert_eq!(*owner, PathId::new(7));
        assert_eq!(flows[0].table, 3);
        assert_eq!(flows[0].idle_timeout, 60);
        assert_eq!(addresses(&flows[0]), (SRC, DST));
        assert_eq!(flows[0].actions[0], Action::WriteMetadata(7));
        assert_eq!(addresses(&flows[1]), (DST, SRC));
        assert_eq!(flows[1].actions[0], Action::WriteMetadata(8));
    }

    #[tokio::test]
    async fn test_duplicates_within_window() {
        let sink = Arc::new(RecordingSink::default());
        let mut reflector = reflector(&sink);
        let t0 = Instant::now();

        reflector.on_packet_in_at(&packet(7), t0).await.unwrap();
        let again = reflector
            .on_packet_in_at(&packet(7), t0 + Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(again, ReflectOutcome::Duplicate);

        let later = reflector
            .on_packet_in_at(&packet(7), t0 + Duration::from_secs(61))
            .await
            .unwrap();
        assert!(matches!(later, ReflectOutcome::Installed { .. }));

        let stats = reflector.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.insertions, 4);
        assert_eq!(sink.installed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_discards() {
        let sink = Arc::new(RecordingSink::default());
        let mut reflector = reflector(&sink);

        let mut foreign = packet(7);
        foreign.cookie = 0x1234;
        assert_eq!(
            reflector.on_packet_in(&foreign).await.unwrap(),
            ReflectOutcome::Discarded(DiscardReason::ForeignCookie(0x1234))
        );

        let mut arp = packet(7);
        arp.payload[12] = 0x08;
        arp.payload[13] = 0x06;
        assert_eq!(
            reflector.on_packet_in(&arp).await.unwrap(),
            ReflectOutcome::Discarded(DiscardReason::NotIpv4(0x0806))
        );

        let wide = packet(u64::MAX);
        assert!(matches!(
            reflector.on_packet_in(&wide).await.unwrap(),
            ReflectOutcome::Discarded(DiscardReason::NoPath(_))
        ));

        assert_eq!(reflector.stats().discarded, 3);
        assert!(sink.installed.lock().unwrap().is_empty());
        assert!(reflector.dedup().is_empty());
    }

    #[tokio::test]
    async fn test_failed_install_is_retried() {
        let sink = Arc::new(RecordingSink::default());
        let mut reflector = reflector(&sink);

        sink.fail.store(true, Ordering::SeqCst);
        assert!(reflector.on_packet_in(&packet(7)).await.is_err());
        assert!(reflector.dedup().is_empty());

        sink.fail.store(false, Ordering::SeqCst);
        assert!(matches!(
            reflector.on_packet_in(&packet(7)).await.unwrap(),
            ReflectOutcome::Installed { .. }
        ));
    }

    #[tokio::test]
    async fn test_last_path_id_has_no_reverse() {
        let sink = Arc::new(RecordingSink::default());
        let mut reflector = reflector(&sink);
        let outcome = reflector
            .on_packet_in(&packet(u64::from(u32::MAX)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReflectOutcome::Installed {
                forward: PathId::new(u32::MAX),
                reverse: None,
                flows: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_swept_conversations_are_expired() {
        let sink = Arc::new(RecordingSink::default());
        let config = PacketInConfig {
            sweep_every_packets: 2,
            ..PacketInConfig::default()
        };
        let mut reflector =
            PacketInReflector::new(sink.clone(), FlowProgrammer::default(), &config);
        let t0 = Instant::now();

        reflector.on_packet_in_at(&packet(7), t0).await.unwrap();
        assert_eq!(reflector.installed_conversations(), 1);
        let installed: Vec<FlowKey> = sink.installed.lock().unwrap()[0]
            .1
            .iter()
            .map(|f| f.key())
            .collect();

        // The second packet sweeps path 7's stale conversation.
        let later = t0 + Duration::from_secs(61);
        reflector.on_packet_in_at(&packet(9), later).await.unwrap();

        let expired = sink.expired.lock().unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0], (PathId::new(7), installed));
        assert_eq!(reflector.installed_conversations(), 1);
        assert_eq!(reflector.stats().expirations, 2);
    }
}
