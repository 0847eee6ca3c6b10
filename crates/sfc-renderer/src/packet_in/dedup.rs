//! Time-windowed duplicate suppression for packet-ins.

use crate::config::PacketInConfig;
use sfc_types::PathId;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// One conversation direction on one path.
pub type DedupKey = (PathId, Ipv4Addr, Ipv4Addr);

/// Remembers recently reflected conversations.
///
/// A key seen again within the window is a duplicate. Expired entries are
/// swept every `sweep_every` packets; a hit on an expired entry refreshes it.
#[derive(Debug, Clone)]
pub struct DedupBuffer {
    window: Duration,
    sweep_every: u32,
    packets: u32,
    seen: HashMap<DedupKey, Instant>,
    swept: Vec<DedupKey>,
}

impl DedupBuffer {
    pub fn new(window: Duration, sweep_every: u32) -> Self {
        Self {
            window,
            sweep_every: sweep_every.max(1),
            packets: 0,
            seen: HashMap::new(),
            swept: Vec::new(),
        }
    }

    pub fn from_config(config: &PacketInConfig) -> Self {
        Self::new(
            Duration::from_millis(config.dedup_window_ms),
            config.sweep_every_packets,
        )
    }

    /// Records `key` at `now`; returns false when it is a duplicate.
    pub fn observe(&mut self, key: DedupKey, now: Instant) -> bool {
        self.packets += 1;
        if self.packets >= self.sweep_every {
            self.packets = 0;
            self.sweep(now, Some(&key));
        }

        match self.seen.get(&key) {
            Some(at) if now.saturating_duration_since(*at) < self.window => false,
            _ => {
                self.seen.insert(key, now);
                true
            }
        }
    }

    /// Drops `key`, so its next packet is reflected again.
    pub fn forget(&mut self, key: &DedupKey) -> bool {
        self.seen.remove(key).is_some()
    }

    /// Removes expired entries other than `keep`; returns how many went.
    ///
    /// Removed keys are kept for [`DedupBuffer::take_swept`].
    pub fn sweep(&mut self, now: Instant, keep: Option<&DedupKey>) -> usize {
        let window = self.window;
        let swept = &mut self.swept;
        let before = swept.len();
        self.seen.retain(|key, at| {
            let live = Some(key) == keep || now.saturating_duration_since(*at) < window;
            if !live {
                swept.push(*key);
            }
            live
        });
        swept.len() - before
    }

    /// Keys removed by sweeps since the last call.
    pub fn take_swept(&mut self) -> Vec<DedupKey> {
        std::mem::take(&mut self.swept)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
