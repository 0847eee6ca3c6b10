use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical tables of the chain pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogicalTable {
    Classifier,
    TransportIngress,
    PathMapper,
    PathMapperAcl,
    NextHop,
    TransportEgress,
}

impl LogicalTable {
    pub const ALL: [LogicalTable; 6] = [
        Self::Classifier,
        Self::TransportIngress,
        Self::PathMapper,
        Self::PathMapperAcl,
        Self::NextHop,
        Self::TransportEgress,
    ];

    /// Fixed logical index of the table.
    pub const fn index(&self) -> u8 {
        match self {
            Self::Classifier => 0,
            Self::TransportIngress => 1,
            Self::PathMapper => 2,
            Self::PathMapperAcl => 3,
            Self::NextHop => 4,
            Self::TransportEgress => 10,
        }
    }

    /// Table a match-any rule of this table hands packets to, if any.
    ///
    /// TransportIngress and TransportEgress drop unmatched traffic.
    pub const fn default_successor(&self) -> Option<LogicalTable> {
        match self {
            Self::Classifier => Some(Self::TransportIngress),
            Self::TransportIngress => None,
            Self::PathMapper => Some(Self::PathMapperAcl),
            Self::PathMapperAcl => Some(Self::NextHop),
            Self::NextHop => Some(Self::TransportEgress),
            Self::TransportEgress => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::TransportIngress => "transport-ingress",
            Self::PathMapper => "path-mapper",
            Self::PathMapperAcl => "path-mapper-acl",
            Self::NextHop => "next-hop",
            Self::TransportEgress => "transport-egress",
        }
    }
}

impl fmt::Display for LogicalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|t| t.name() == normalized)
            .ok_or_else(|| format!("unknown logical table: {}", s))
    }
}

impl TryFrom<String> for LogicalTable {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LogicalTable> for String {
    fn from(t: LogicalTable) -> Self {
        t.name().to_string()
    }
}
