//! Rendered service path processing and locator resolution.

mod processor;
mod resolver;

pub use processor::{ProcessOutcome, ProcessingState, RspProcessor};
pub use resolver::{LocatorResolver, ResolvedPath, Topology};
