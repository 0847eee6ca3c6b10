//! End-to-end rendering of service paths into committed flows.

mod common;

use common::{committed, node, processor, processor_with, quick_retry, rsp, NODE0, NODE1};
use pretty_assertions::assert_eq;
use sfc_orch_common::RetryPolicy;
use sfc_renderer::flow::{
    is_transport_egress_cookie, priority, Action, EgressCookie, LogicalTable, MatchField,
    MatchKind,
};
use sfc_renderer::programmer::{FlowProgrammer, TableMapper};
use sfc_renderer::rsp::{ProcessingState, RspProcessor};
use sfc_renderer::RendererError;
use sfc_types::{PathId, ServiceIndex, TransportKind};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

fn nodes(names: &[&str]) -> BTreeSet<sfc_types::NodeId> {
    names.iter().map(|n| node(n)).collect()
}

fn last_hop_cookie(kind: TransportKind) -> EgressCookie {
    match kind {
        TransportKind::NshTunnel => EgressCookie::NshTunnelLastHop,
        TransportKind::NshEthernet => EgressCookie::NshEthernetLastHop,
        TransportKind::Mpls => EgressCookie::MplsLastHop,
        TransportKind::VlanMac => EgressCookie::VlanLastHop,
        TransportKind::LogicalTunnel => EgressCookie::LogicalLastHop,
    }
}

#[tokio::test]
async fn test_nsh_tunnel_two_hop_scenario() {
    let (processor, store) = processor(TransportKind::NshTunnel);
    let path = rsp(42, TransportKind::NshTunnel, &[("sff0", "fw0"), ("sff1", "he1")]);

    let outcome = processor.process_rsp(&path).await.unwrap();
    assert_eq!(outcome.state, ProcessingState::Committed);
    assert_eq!(outcome.nodes, nodes(&[NODE0, NODE1]));
    assert_eq!(outcome.bootstrapped, nodes(&[NODE0, NODE1]));

    // TransportIngress recognizes the tunnel on both forwarders and skips the mappers.
    for n in [NODE0, NODE1] {
        let ingress: Vec<_> = committed(&store, n, LogicalTable::TransportIngress)
            .into_iter()
            .filter(|f| f.matches.contains(MatchKind::TunnelGpeNextProto))
            .collect();
        assert_eq!(ingress.len(), 1, "ingress on {}", n);
        assert_eq!(ingress[0].actions, vec![Action::GotoTable(4)]);
    }

    // NextHop picks the tunnel destination at index 255 and 254.
    let next_hop = |n: &str, index: u8| {
        committed(&store, n, LogicalTable::NextHop)
            .into_iter()
            .find(|f| {
                f.matches.get(MatchKind::NshSi) == Some(&MatchField::NshSi(ServiceIndex::new(index)))
            })
            .unwrap()
    };
    let first = next_hop(NODE0, 255);
    assert_eq!(
        first.matches.get(MatchKind::NshSpi),
        Some(&MatchField::NshSpi(PathId::new(42)))
    );
    assert_eq!(
        first.actions[0],
        Action::SetTunnelIpv4Dst(Ipv4Addr::new(192, 168, 0, 11))
    );
    assert_eq!(
        next_hop(NODE0, 254).actions[0],
        Action::SetTunnelIpv4Dst(Ipv4Addr::new(10, 0, 0, 2))
    );
    assert_eq!(
        next_hop(NODE1, 254).actions[0],
        Action::SetTunnelIpv4Dst(Ipv4Addr::new(192, 168, 0, 21))
    );

    // The last function decrements the index, so the chain is left at 253.
    let last_hop: Vec<_> = committed(&store, NODE1, LogicalTable::TransportEgress)
        .into_iter()
        .filter(|f| f.cookie == EgressCookie::NshTunnelLastHop.value())
        .collect();
    assert_eq!(last_hop.len(), 2);
    for flow in &last_hop {
        assert_eq!(
            flow.matches.get(MatchKind::NshSi),
            Some(&MatchField::NshSi(ServiceIndex::new(253)))
        );
        assert!(flow.has_action(&Action::MoveNshC1ToTunnelDst));
    }
    assert!(committed(&store, NODE0, LogicalTable::TransportEgress)
        .iter()
        .all(|f| f.cookie != EgressCookie::NshTunnelLastHop.value()));

    assert_eq!(processor.flow_path_ids().await, vec![PathId::new(42)]);

    let cleared = processor.delete_rsp(PathId::new(42)).await.unwrap();
    assert_eq!(cleared, nodes(&[NODE0, NODE1]));
    processor.drain().await.unwrap();
    assert!(processor.flow_path_ids().await.is_empty());
    assert!(store.is_empty());
    assert!(!processor.has_bootstrap(&node(NODE0)).await);
}

#[tokio::test]
async fn test_round_trip_every_transport() {
    for kind in TransportKind::ALL {
        let (processor, store) = processor(kind);
        let path = rsp(10, kind, &[("sff0", "fw0"), ("sff1", "he1")]);

        let outcome = processor
            .process_rsp(&path)
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", kind, e));
        assert!(outcome.flows > 0);

        let last_hop = last_hop_cookie(kind).value();
        assert!(
            store.flows_on(&node(NODE1)).iter().any(|f| f.cookie == last_hop),
            "{} has no last hop rule",
            kind
        );

        let cleared = processor.delete_rsp(PathId::new(10)).await.unwrap();
        processor.drain().await.unwrap();
        assert_eq!(cleared, nodes(&[NODE0, NODE1]), "{}", kind);
        assert!(store.is_empty(), "{} left {:?}", kind, store.flows());
    }
}

#[tokio::test]
async fn test_transport_egress_rules_carry_renderer_cookies() {
    for kind in TransportKind::ALL {
        let (processor, store) = processor(kind);
        processor
            .process_rsp(&rsp(3, kind, &[("sff0", "fw0"), ("sff1", "he1"), ("sff1", "dpi1")]))
            .await
            .unwrap();
        for n in [NODE0, NODE1] {
            for flow in committed(&store, n, LogicalTable::TransportEgress) {
                if flow.priority == priority::DEFAULT {
                    assert_eq!(flow.cookie, 0);
                } else {
                    assert!(is_transport_egress_cookie(flow.cookie), "{}: {:?}", kind, flow);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_path_mapper_only_for_tag_transports() {
    for kind in TransportKind::ALL {
        let (processor, store) = processor(kind);
        processor
            .process_rsp(&rsp(4, kind, &[("sff0", "fw0"), ("sff1", "he1")]))
            .await
            .unwrap();
        let mappers: Vec<_> = committed(&store, NODE1, LogicalTable::PathMapper)
            .into_iter()
            .filter(|f| f.priority != priority::DEFAULT)
            .collect();
        assert_eq!(
            !mappers.is_empty(),
            kind.supports_path_mapper(),
            "{}: {:?}",
            kind,
            mappers
        );
        for flow in &mappers {
            assert!(flow.has_action(&Action::WriteMetadata(4)));
        }
    }
}

#[tokio::test]
async fn test_shared_forwarder_keeps_bootstrap() {
    let (processor, store) = processor(TransportKind::NshTunnel);
    processor
        .process_rsp(&rsp(1, TransportKind::NshTunnel, &[("sff0", "fw0"), ("sff1", "he1")]))
        .await
        .unwrap();
    let second = processor
        .process_rsp(&rsp(2, TransportKind::NshTunnel, &[("sff0", "proxy0")]))
        .await
        .unwrap();
    assert!(second.bootstrapped.is_empty());
    assert_eq!(processor.node_references(&node(NODE0)).await, 2);

    let cleared = processor.delete_rsp(PathId::new(1)).await.unwrap();
    processor.drain().await.unwrap();
    assert_eq!(cleared, nodes(&[NODE1]));
    assert!(store.flows_on(&node(NODE1)).is_empty());
    assert!(processor.has_bootstrap(&node(NODE0)).await);
    assert_eq!(
        committed(&store, NODE0, LogicalTable::Classifier).len(),
        1,
        "default rules must survive on the shared forwarder"
    );

    let cleared = processor.delete_rsp(PathId::new(2)).await.unwrap();
    processor.drain().await.unwrap();
    assert_eq!(cleared, nodes(&[NODE0]));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_mixed_transports_share_a_forwarder() {
    let (processor, store) = processor(TransportKind::NshTunnel);
    processor
        .process_rsp(&rsp(1, TransportKind::NshTunnel, &[("sff0", "fw0")]))
        .await
        .unwrap();
    processor
        .process_rsp(&rsp(2, TransportKind::NshEthernet, &[("sff0", "proxy0")]))
        .await
        .unwrap();

    let ingress = committed(&store, NODE0, LogicalTable::TransportIngress);
    assert!(ingress
        .iter()
        .any(|f| f.matches.contains(MatchKind::TunnelGpeNextProto)));
    assert!(ingress
        .iter()
        .any(|f| f.matches.get(MatchKind::EtherType) == Some(&MatchField::EtherType(0x894f))));
}

#[tokio::test]
async fn test_reprocessing_replaces_previous_rendering() {
    let (processor, store) = processor(TransportKind::NshTunnel);
    processor
        .process_rsp(&rsp(5, TransportKind::NshTunnel, &[("sff0", "fw0"), ("sff1", "he1")]))
        .await
        .unwrap();
    assert!(!store.flows_on(&node(NODE1)).is_empty());

    let outcome = processor
        .process_rsp(&rsp(5, TransportKind::NshTunnel, &[("sff0", "fw0")]))
        .await
        .unwrap();
    assert_eq!(outcome.nodes, nodes(&[NODE0]));
    assert!(store.flows_on(&node(NODE1)).is_empty());
    assert_eq!(processor.node_references(&node(NODE1)).await, 0);
    assert_eq!(processor.rendered_paths().await, vec![PathId::new(5)]);
}

#[tokio::test]
async fn test_failure_purges_the_whole_run() {
    let (processor, store) = processor(TransportKind::Mpls);
    processor
        .process_rsp(&rsp(1, TransportKind::Mpls, &[("sff0", "fw0")]))
        .await
        .unwrap();
    let before = store.flows();

    // he1 hangs off sff1, so sff0 has no port toward it.
    let err = processor
        .process_rsp(&rsp(2, TransportKind::Mpls, &[("sff1", "dpi1"), ("sff0", "he1")]))
        .await
        .unwrap_err();
    assert!(matches!(err, RendererError::LocatorMissing { .. }), "{}", err);
    processor.drain().await.unwrap();

    assert_eq!(store.flows(), before);
    assert_eq!(processor.rendered_paths().await, vec![PathId::new(1)]);
    assert_eq!(processor.node_references(&node(NODE0)).await, 1);
    assert_eq!(processor.node_references(&node(NODE1)).await, 0);
    assert!(!processor.has_bootstrap(&node(NODE1)).await);
    assert!(processor.hop_tags(PathId::new(2)).await.is_empty());
}

/// PathMapper rules on `node` writing `path` into the metadata register.
fn path_mappers_of(
    store: &sfc_renderer::writer::InMemoryFlowStore,
    node: &str,
    path: u32,
) -> Vec<sfc_renderer::flow::FlowEntity> {
    committed(store, node, LogicalTable::PathMapper)
        .into_iter()
        .filter(|f| f.has_action(&Action::WriteMetadata(u64::from(path))))
        .collect()
}

async fn assert_tag_paths_share_forwarder(kind: TransportKind) {
    let (processor, store) = processor(kind);
    processor
        .process_rsp(&rsp(1, kind, &[("sff0", "fw0")]))
        .await
        .unwrap();
    let alone = store.flows();

    processor
        .process_rsp(&rsp(2, kind, &[("sff0", "proxy0")]))
        .await
        .unwrap();
    let first = processor.hop_tags(PathId::new(1)).await;
    let second = processor.hop_tags(PathId::new(2)).await;
    assert!(!first.is_empty() && !second.is_empty());
    assert!(first.iter().all(|tag| !second.contains(tag)), "{}: {:?} {:?}", kind, first, second);

    let mappers_1 = path_mappers_of(&store, NODE0, 1);
    let mappers_2 = path_mappers_of(&store, NODE0, 2);
    assert!(!mappers_1.is_empty(), "{}: path 1 lost its PathMapper rules", kind);
    assert!(!mappers_2.is_empty(), "{}", kind);
    for flow in &mappers_1 {
        assert!(mappers_2.iter().all(|other| other.key() != flow.key()));
    }

    processor.delete_rsp(PathId::new(2)).await.unwrap();
    processor.drain().await.unwrap();
    assert_eq!(store.flows(), alone, "{}", kind);
    assert!(processor.hop_tags(PathId::new(2)).await.is_empty());
}

#[tokio::test]
async fn test_mpls_paths_sharing_a_forwarder_keep_their_own_tags() {
    assert_tag_paths_share_forwarder(TransportKind::Mpls).await;
}

#[tokio::test]
async fn test_vlan_paths_sharing_a_forwarder_keep_their_own_tags() {
    assert_tag_paths_share_forwarder(TransportKind::VlanMac).await;
}

#[tokio::test]
async fn test_released_tags_are_reused_by_later_paths() {
    let (processor, _store) = processor(TransportKind::Mpls);
    for id in [1, 2] {
        processor
            .process_rsp(&rsp(id, TransportKind::Mpls, &[("sff0", "fw0"), ("sff1", "he1")]))
            .await
            .unwrap();
    }
    let freed = processor.hop_tags(PathId::new(1)).await;
    processor.delete_rsp(PathId::new(1)).await.unwrap();

    processor
        .process_rsp(&rsp(3, TransportKind::Mpls, &[("sff0", "fw0"), ("sff1", "he1")]))
        .await
        .unwrap();
    assert_eq!(processor.hop_tags(PathId::new(3)).await, freed);
    let kept = processor.hop_tags(PathId::new(2)).await;
    assert!(freed.iter().all(|tag| !kept.contains(tag)));
}

#[tokio::test]
async fn test_unknown_forwarder_is_fatal() {
    let (processor, store) = processor(TransportKind::NshTunnel);
    let err = processor
        .process_rsp(&rsp(1, TransportKind::NshTunnel, &[("sff9", "fw0")]))
        .await
        .unwrap_err();
    assert!(matches!(err, RendererError::ForwarderNotFound { .. }));
    assert!(err.is_fatal());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_app_coexistence_remaps_tables() {
    let programmer = FlowProgrammer::new(TableMapper::app_coexistence(20));
    let (processor, store) =
        processor_with(TransportKind::NshTunnel, programmer, RetryPolicy::no_retry());
    processor
        .process_rsp(&rsp(7, TransportKind::NshTunnel, &[("sff0", "fw0"), ("sff1", "he1")]))
        .await
        .unwrap();

    let flows = store.flows_on(&node(NODE1));
    // No defaults for tables owned by the other application.
    assert!(flows
        .iter()
        .all(|f| f.logical_table != LogicalTable::Classifier));
    let ingress: Vec<_> = flows
        .iter()
        .filter(|f| f.logical_table == LogicalTable::TransportIngress)
        .collect();
    assert_eq!(ingress.len(), 1);
    assert_eq!(ingress[0].table, 0);
    assert_eq!(ingress[0].actions, vec![Action::GotoTable(22)]);

    let last_hop: Vec<_> = flows
        .iter()
        .filter(|f| f.cookie == EgressCookie::NshTunnelLastHopAppCoexistence.value())
        .collect();
    assert_eq!(last_hop.len(), 1);
    assert_eq!(last_hop[0].table, 28);
    assert_eq!(last_hop[0].actions, vec![Action::PopNsh, Action::Resubmit(0)]);
}

#[tokio::test]
async fn test_commit_is_retried() {
    let (processor, store) =
        processor_with(TransportKind::VlanMac, FlowProgrammer::default(), quick_retry(3));
    store.fail_next_commits(2);
    processor
        .process_rsp(&rsp(1, TransportKind::VlanMac, &[("sff0", "fw0"), ("sff1", "he1")]))
        .await
        .unwrap();

    let stats = processor.writer_stats().await;
    assert_eq!(stats.committed_batches, 1);
    assert_eq!(stats.failed_batches, 0);
    assert!(!store.is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_drop_the_batch() {
    let (processor, store) =
        processor_with(TransportKind::NshTunnel, FlowProgrammer::default(), quick_retry(2));
    store.fail_next_commits(2);
    processor
        .process_rsp(&rsp(1, TransportKind::NshTunnel, &[("sff0", "fw0")]))
        .await
        .unwrap();

    let stats = processor.writer_stats().await;
    assert_eq!(stats.failed_batches, 1);
    assert!(stats.flows_dropped > 0);
    assert!(store.is_empty());

    // The next batch is unaffected.
    processor
        .process_rsp(&rsp(2, TransportKind::NshTunnel, &[("sff1", "he1")]))
        .await
        .unwrap();
    assert!(!store.flows_on(&node(NODE1)).is_empty());
}

#[tokio::test]
async fn test_concurrent_processing_is_serialized() {
    let (processor, store) = processor(TransportKind::NshTunnel);
    let processor = Arc::new(processor);

    let a = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            processor
                .process_rsp(&rsp(1, TransportKind::NshTunnel, &[("sff0", "fw0"), ("sff1", "he1")]))
                .await
        })
    };
    let b = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            processor
                .process_rsp(&rsp(2, TransportKind::NshTunnel, &[("sff0", "proxy0")]))
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(
        processor.flow_path_ids().await,
        vec![PathId::new(1), PathId::new(2)]
    );
    assert_eq!(processor.node_references(&node(NODE0)).await, 2);
    assert_eq!(
        committed(&store, NODE0, LogicalTable::Classifier).len(),
        1
    );
}

#[tokio::test]
async fn test_from_config_applies_writer_settings() {
    let config = sfc_renderer::RendererConfig::from_toml_str(
        "[writer]\nmax_commit_attempts = 4\nretry_backoff_ms = 1\n",
    )
    .unwrap();
    let store = Arc::new(sfc_renderer::writer::InMemoryFlowStore::new());
    let processor = RspProcessor::from_config(
        &config,
        Arc::new(common::topology(TransportKind::NshTunnel)),
        store.clone(),
    )
    .with_commit_wait(true);

    store.fail_next_commits(3);
    processor
        .process_rsp(&rsp(1, TransportKind::NshTunnel, &[("sff0", "fw0")]))
        .await
        .unwrap();
    assert!(!store.is_empty());
    assert_eq!(processor.shutdown(config.shutdown_timeout()).await, 0);
}
