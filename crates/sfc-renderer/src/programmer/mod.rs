//! Flow programmer: the per-table rule factory.
//!
//! Every rule the renderer emits is built here, one submodule per table
//! family, so transports compose table builders instead of overriding a
//! shared base. Physical table ids are resolved through the
//! [`TableMapper`] when a flow is created.

mod egress;
mod ingress;
mod mapper;
mod next_hop;
mod path_mapper;

pub use egress::{EgressDestination, EgressVariant};
pub use mapper::TableMapper;
pub use next_hop::HopSource;
pub use path_mapper::HopTag;

use crate::config::PipelineConfig;
use crate::flow::{priority, Action, FlowEntity, LogicalTable, MatchField};
use sfc_types::{NodeId, PathId, ServiceIndex};

/// How a rule identifies the path a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// Path id and index carried in the NSH header.
    Nsh { path: PathId, index: ServiceIndex },
    /// Path id recovered into the metadata register by the PathMapper.
    Metadata { path: PathId },
}

impl PathMatch {
    pub fn path(&self) -> PathId {
        match self {
            Self::Nsh { path, .. } | Self::Metadata { path } => *path,
        }
    }

    fn apply(&self, flow: FlowEntity) -> FlowEntity {
        match self {
            Self::Nsh { path, index } => flow
                .with_match(MatchField::NshSpi(*path))
                .with_match(MatchField::NshSi(*index)),
            Self::Metadata { path } => flow.with_match(MatchField::Metadata(path.as_metadata())),
        }
    }
}

/// Builds flows for the chain pipeline of one deployment.
#[derive(Debug, Clone, Default)]
pub struct FlowProgrammer {
    mapper: TableMapper,
    egress_resubmit_table: u8,
}

impl FlowProgrammer {
    pub fn new(mapper: TableMapper) -> Self {
        Self {
            mapper,
            egress_resubmit_table: 0,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(TableMapper::from_config(config))
            .with_egress_resubmit_table(config.egress_resubmit_table)
    }

    pub fn with_egress_resubmit_table(mut self, table: u8) -> Self {
        self.egress_resubmit_table = table;
        self
    }

    pub fn is_app_coexistence(&self) -> bool {
        self.mapper.is_app_coexistence()
    }

    pub fn table_id(&self, table: LogicalTable) -> u8 {
        self.mapper.table_id(table)
    }

    /// Empty flow in the physical table backing `table`.
    pub fn flow(&self, node: &NodeId, table: LogicalTable) -> FlowEntity {
        FlowEntity::new(node.clone(), table, self.table_id(table))
    }

    pub fn goto(&self, table: LogicalTable) -> Action {
        Action::GotoTable(self.table_id(table))
    }

    /// Match-any rules of every table on a node.
    ///
    /// Classifier and TransportIngress belong to the other pipeline under
    /// app-coexistence and get no defaults there.
    pub fn default_flows(&self, node: &NodeId) -> Vec<FlowEntity> {
        LogicalTable::ALL
            .into_iter()
            .filter(|table| {
                !(self.is_app_coexistence()
                    && matches!(table, LogicalTable::Classifier | LogicalTable::TransportIngress))
            })
            .map(|table| {
                let action = match table.default_successor() {
                    Some(next) => self.goto(next),
                    None => Action::Drop,
                };
                self.flow(node, table)
                    .with_priority(priority::DEFAULT)
                    .with_action(action)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node() -> NodeId {
        NodeId::new("openflow:1")
    }

    #[test]
    fn test_default_flows() {
        let programmer = FlowProgrammer::default();
        let flows = programmer.default_flows(&node());
        let summary: Vec<(u8, Vec<Action>)> =
            flows.iter().map(|f| (f.table, f.actions.clone())).collect();
        assert_eq!(
            summary,
            vec![
                (0, vec![Action::GotoTable(1)]),
                (1, vec![Action::Drop]),
                (2, vec![Action::GotoTable(3)]),
                (3, vec![Action::GotoTable(4)]),
                (4, vec![Action::GotoTable(10)]),
                (10, vec![Action::Drop]),
            ]
        );
        assert!(flows.iter().all(|f| f.priority == 5 && f.matches.is_any()));
    }

    #[test]
    fn test_default_flows_app_coexistence() {
        let programmer = FlowProgrammer::new(TableMapper::app_coexistence(20));
        let flows = programmer.default_flows(&node());
        let summary: Vec<(LogicalTable, u8, Vec<Action>)> = flows
            .iter()
            .map(|f| (f.logical_table, f.table, f.actions.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (LogicalTable::PathMapper, 20, vec![Action::GotoTable(21)]),
                (LogicalTable::PathMapperAcl, 21, vec![Action::GotoTable(22)]),
                (LogicalTable::NextHop, 22, vec![Action::GotoTable(28)]),
                (LogicalTable::TransportEgress, 28, vec![Action::Drop]),
            ]
        );
    }

    #[test]
    fn test_path_match_fields() {
        let programmer = FlowProgrammer::default();
        let nsh = PathMatch::Nsh {
            path: PathId::new(42),
            index: ServiceIndex::new(255),
        };
        let flow = nsh.apply(programmer.flow(&node(), LogicalTable::NextHop));
        assert_eq!(flow.matches.match_key(), "nsp=42,nsi=255");

        let meta = PathMatch::Metadata { path: PathId::new(42) };
        assert_eq!(meta.path(), PathId::new(42));
        let flow = meta.apply(programmer.flow(&node(), LogicalTable::NextHop));
        assert_eq!(flow.matches.match_key(), "metadata=0x2a");
    }
}
