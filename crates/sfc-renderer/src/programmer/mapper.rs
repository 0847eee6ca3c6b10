use crate::config::PipelineConfig;
use crate::flow::LogicalTable;
use std::collections::BTreeMap;

/// Logical to physical table translation.
///
/// Precedence: an external mapping entry, then the app-coexistence offset,
/// then identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMapper {
    external: Option<BTreeMap<LogicalTable, u8>>,
    coexistence_base: Option<u8>,
}

impl TableMapper {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn app_coexistence(table_base: u8) -> Self {
        Self {
            external: None,
            coexistence_base: Some(table_base),
        }
    }

    pub fn with_external(mut self, mapping: BTreeMap<LogicalTable, u8>) -> Self {
        self.external = Some(mapping);
        self
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mapper = if config.app_coexistence {
            Self::app_coexistence(config.table_base)
        } else {
            Self::identity()
        };
        match &config.table_mapping {
            Some(mapping) => mapper.with_external(mapping.clone()),
            None => mapper,
        }
    }

    pub fn is_app_coexistence(&self) -> bool {
        self.coexistence_base.is_some()
    }

    /// Physical table id for a logical table.
    pub fn table_id(&self, table: LogicalTable) -> u8 {
        if let Some(id) = self.external.as_ref().and_then(|m| m.get(&table)) {
            return *id;
        }
        match self.coexistence_base {
            Some(_) if table == LogicalTable::TransportIngress => 0,
            Some(base) => base.saturating_add(table.index()).saturating_sub(2),
            None => table.index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn physical(mapper: &TableMapper) -> Vec<u8> {
        LogicalTable::ALL.iter().map(|t| mapper.table_id(*t)).collect()
    }

    #[test]
    fn test_identity() {
        assert_eq!(physical(&TableMapper::identity()), vec![0, 1, 2, 3, 4, 10]);
    }

    #[test]
    fn test_app_coexistence() {
        let mapper = TableMapper::app_coexistence(20);
        assert_eq!(mapper.table_id(LogicalTable::TransportIngress), 0);
        assert_eq!(mapper.table_id(LogicalTable::PathMapper), 20);
        assert_eq!(mapper.table_id(LogicalTable::PathMapperAcl), 21);
        assert_eq!(mapper.table_id(LogicalTable::NextHop), 22);
        assert_eq!(mapper.table_id(LogicalTable::TransportEgress), 28);
    }

    #[test]
    fn test_app_coexistence_is_monotonic() {
        for base in [3u8, 10, 20, 100, 247] {
            let mapper = TableMapper::app_coexistence(base);
            let used: Vec<u8> = LogicalTable::ALL[1..]
                .iter()
                .map(|t| mapper.table_id(*t))
                .collect();
            assert!(used.windows(2).all(|w| w[0] < w[1]), "base {}: {:?}", base, used);
        }
    }

    #[test]
    fn test_external_takes_precedence() {
        let mut mapping = BTreeMap::new();
        mapping.insert(LogicalTable::NextHop, 77);
        let mapper = TableMapper::app_coexistence(20).with_external(mapping);
        assert_eq!(mapper.table_id(LogicalTable::NextHop), 77);
        assert_eq!(mapper.table_id(LogicalTable::PathMapper), 20);
        assert_eq!(mapper.table_id(LogicalTable::TransportIngress), 0);
    }

    #[test]
    fn test_from_config() {
        let config = PipelineConfig {
            app_coexistence: true,
            table_base: 40,
            ..PipelineConfig::default()
        };
        let mapper = TableMapper::from_config(&config);
        assert!(mapper.is_app_coexistence());
        assert_eq!(mapper.table_id(LogicalTable::TransportEgress), 48);
    }
}
