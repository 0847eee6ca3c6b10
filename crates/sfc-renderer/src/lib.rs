//! Service function chaining renderer.
//!
//! Compiles rendered service paths (RSPs) into the match/action rules of a
//! six-table forwarding pipeline:
//!
//! | logical table     | index | role                                         |
//! |-------------------|-------|----------------------------------------------|
//! | Classifier        | 0     | hands traffic to the chain pipeline          |
//! | TransportIngress  | 1     | recognizes the chain encapsulation           |
//! | PathMapper        | 2     | turns a hop tag into path state              |
//! | PathMapperAcl     | 3     | reactive per-flow path selection             |
//! | NextHop           | 4     | rewrites next-hop addressing                 |
//! | TransportEgress   | 10    | encapsulates and outputs                     |
//!
//! The [`rsp::RspProcessor`] drives everything: it builds the forwarder
//! graph, resolves data plane locators, lets the [`transport`] strategy of
//! the path emit rules through the [`programmer::FlowProgrammer`], and hands
//! the result to the [`writer::FlowWriter`] for asynchronous commit. The
//! [`packet_in::PacketInReflector`] installs per-flow rules reactively for
//! proxy-like functions.

pub mod config;
pub mod error;
pub mod flow;
pub mod graph;
pub mod packet_in;
pub mod programmer;
pub mod rsp;
pub mod transport;
pub mod writer;

pub use config::RendererConfig;
pub use error::{RendererError, Result};
