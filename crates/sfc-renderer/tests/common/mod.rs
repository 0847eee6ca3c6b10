//! Shared fixtures for renderer integration tests.
//!
//! Two forwarders, each with a single locator:
//!
//! - sff0 on openflow:1, port 1: fw0 (firewall) on port 11, proxy0 (tcp
//!   proxy) on port 12, tunnel to sff1 on port 100
//! - sff1 on openflow:2, port 2: he1 (header enrichment) on port 21, dpi1
//!   on port 22, tunnel to sff0 on port 200

#![allow(dead_code)]

use sfc_orch_common::RetryPolicy;
use sfc_renderer::flow::{FlowEntity, LogicalTable};
use sfc_renderer::programmer::FlowProgrammer;
use sfc_renderer::rsp::{RspProcessor, Topology};
use sfc_renderer::writer::{FlowWriter, InMemoryFlowStore};
use sfc_types::{
    DataPlaneLocator, FunctionType, Locator, MacAddress, MplsLabel, NodeId, PathId,
    RenderedServicePath, ServiceFunction, ServiceFunctionForwarder, TransportKind, VlanId,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

pub const NODE0: &str = "openflow:1";
pub const NODE1: &str = "openflow:2";

pub fn mac(last: u8) -> MacAddress {
    MacAddress::new([0x02, 0, 0, 0, 0, last])
}

fn dpl(kind: TransportKind, id: u8) -> DataPlaneLocator {
    let locator = match kind {
        TransportKind::Mpls => Locator::Mpls {
            label: MplsLabel::new(100 + u32::from(id)).unwrap(),
        },
        TransportKind::VlanMac => Locator::Mac {
            mac: mac(id),
            vlan: Some(VlanId::new(100).unwrap()),
        },
        _ => Locator::Ip {
            ip: Ipv4Addr::new(10, 0, 0, id),
            port: 4790,
        },
    };
    DataPlaneLocator::new("eth0", locator)
        .with_port(u32::from(id))
        .with_mac(mac(id))
}

fn function(name: &str, function_type: FunctionType, id: u8) -> ServiceFunction {
    ServiceFunction::new(
        name,
        function_type,
        Locator::Ip {
            ip: Ipv4Addr::new(192, 168, 0, id),
            port: 6633,
        },
    )
    .with_mac(mac(id))
}

pub fn topology(kind: TransportKind) -> Topology {
    Topology::new()
        .with_forwarder(
            ServiceFunctionForwarder::new("sff0", NODE0)
                .with_dpl(dpl(kind, 1))
                .with_function("fw0", 11)
                .with_function("proxy0", 12)
                .with_tunnel_port("sff1", 100),
        )
        .with_forwarder(
            ServiceFunctionForwarder::new("sff1", NODE1)
                .with_dpl(dpl(kind, 2))
                .with_function("he1", 21)
                .with_function("dpi1", 22)
                .with_tunnel_port("sff0", 200),
        )
        .with_function(function("fw0", FunctionType::Firewall, 11))
        .with_function(function("proxy0", FunctionType::TcpProxy, 12))
        .with_function(function("he1", FunctionType::HttpHeaderEnrichment, 21))
        .with_function(function("dpi1", FunctionType::Dpi, 22))
}

pub fn rsp(path: u32, kind: TransportKind, hops: &[(&str, &str)]) -> RenderedServicePath {
    RenderedServicePath::new(PathId::new(path), format!("rsp-{}", path), kind, hops)
}

/// A processor over [`topology`] that waits for every commit.
pub fn processor(kind: TransportKind) -> (RspProcessor, Arc<InMemoryFlowStore>) {
    processor_with(kind, FlowProgrammer::default(), RetryPolicy::no_retry())
}

pub fn processor_with(
    kind: TransportKind,
    programmer: FlowProgrammer,
    retry: RetryPolicy,
) -> (RspProcessor, Arc<InMemoryFlowStore>) {
    let store = Arc::new(InMemoryFlowStore::new());
    let writer = FlowWriter::new(store.clone(), retry);
    let processor =
        RspProcessor::new(programmer, Arc::new(topology(kind)), writer).with_commit_wait(true);
    (processor, store)
}

pub fn quick_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(1))
}

pub fn node(name: &str) -> NodeId {
    NodeId::new(name)
}

/// Committed flows of one logical table on one node, in store order.
pub fn committed(store: &InMemoryFlowStore, node: &str, table: LogicalTable) -> Vec<FlowEntity> {
    store
        .flows_on(&NodeId::new(node))
        .into_iter()
        .filter(|f| f.logical_table == table)
        .collect()
}
