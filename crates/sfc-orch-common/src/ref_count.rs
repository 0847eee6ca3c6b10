//! Per-key holder counts.
//!
//! An entry exists exactly while at least one holder has acquired it, so
//! looking up an untracked key never produces a zero entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU32;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefCountError {
    #[error("release of untracked key {0}")]
    NotHeld(String),
}

/// Counts holders per key.
///
/// ```
/// use sfc_orch_common::RefCountMap;
///
/// let mut refs = RefCountMap::new();
/// assert_eq!(refs.acquire(&"openflow:1"), 1);
/// assert_eq!(refs.release(&"openflow:1"), Ok(0));
/// assert!(refs.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RefCountMap<K> {
    holders: HashMap<K, NonZeroU32>,
}

impl<K> RefCountMap<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            holders: HashMap::new(),
        }
    }

    /// Adds a holder and returns the new count; 1 means first holder.
    pub fn acquire(&mut self, key: &K) -> u32 {
        let count = match self.holders.get(key) {
            Some(n) => n.saturating_add(1),
            None => NonZeroU32::MIN,
        };
        self.holders.insert(key.clone(), count);
        count.get()
    }

    /// Drops a holder and returns how many remain. The key is forgotten
    /// when none do.
    pub fn release(&mut self, key: &K) -> Result<u32, RefCountError> {
        let held = self
            .holders
            .get(key)
            .copied()
            .ok_or_else(|| RefCountError::NotHeld(format!("{:?}", key)))?;
        match NonZeroU32::new(held.get() - 1) {
            Some(left) => {
                self.holders.insert(key.clone(), left);
                Ok(left.get())
            }
            None => {
                self.holders.remove(key);
                Ok(0)
            }
        }
    }

    pub fn count(&self, key: &K) -> u32 {
        self.holders.get(key).map_or(0, |n| n.get())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.holders.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.holders.keys()
    }
}

impl<K> Default for RefCountMap<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_shared_forwarder_lifecycle() {
        let mut refs: RefCountMap<&str> = RefCountMap::new();
        assert_eq!(refs.acquire(&"openflow:1"), 1);
        assert_eq!(refs.acquire(&"openflow:1"), 2);
        assert_eq!(refs.acquire(&"openflow:2"), 1);
        assert_eq!(refs.len(), 2);

        assert_eq!(refs.release(&"openflow:1"), Ok(1));
        assert!(refs.contains(&"openflow:1"));
        assert_eq!(refs.release(&"openflow:1"), Ok(0));
        assert!(!refs.contains(&"openflow:1"));
        assert_eq!(refs.count(&"openflow:1"), 0);
    }

    #[test]
    fn test_count_does_not_track_unknown_keys() {
        let refs: RefCountMap<&str> = RefCountMap::new();
        assert_eq!(refs.count(&"openflow:9"), 0);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_release_untracked_key() {
        let mut refs: RefCountMap<String> = RefCountMap::new();
        assert_eq!(
            refs.release(&"x".to_string()),
            Err(RefCountError::NotHeld("\"x\"".to_string()))
        );
        assert!(refs.is_empty());
    }
}
