//! MPLS label type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-bit MPLS label outside the reserved range (0-15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MplsLabel(u32);

impl MplsLabel {
    /// First label not reserved by RFC 3032.
    pub const MIN: u32 = 16;
    pub const MAX: u32 = (1 << 20) - 1;
    pub const FIRST: MplsLabel = MplsLabel(Self::MIN);

    pub const fn new(label: u32) -> Result<Self, ParseError> {
        if label >= Self::MIN && label <= Self::MAX {
            Ok(MplsLabel(label))
        } else {
            Err(ParseError::InvalidMplsLabel(label))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }
}

impl fmt::Display for MplsLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for MplsLabel {
    type Error = ParseError;

    fn try_from(label: u32) -> Result<Self, Self::Error> {
        MplsLabel::new(label)
    }
}

impl From<MplsLabel> for u32 {
    fn from(label: MplsLabel) -> u32 {
        label.0
    }
}
