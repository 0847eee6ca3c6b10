//! Renderer configuration.
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! yields a working configuration.
//!
//! ```toml
//! [pipeline]
//! app_coexistence = true
//! table_base = 20
//!
//! [packet_in]
//! dedup_window_ms = 60000
//! ```

use crate::error::{RendererError, Result};
use crate::flow::LogicalTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Highest offset a coexistence remap adds to the table base.
const COEXISTENCE_SPAN: u8 = LogicalTable::TransportEgress.index() - 2;

/// Table layout on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Offset the chain tables so another pipeline can own table 0.
    #[serde(default)]
    pub app_coexistence: bool,

    /// Physical table where the offset pipeline starts.
    #[serde(default = "default_table_base")]
    pub table_base: u8,

    /// Table the last hop resubmits to under app-coexistence.
    #[serde(default)]
    pub egress_resubmit_table: u8,

    /// Explicit logical to physical table mapping; wins over everything else.
    #[serde(default)]
    pub table_mapping: Option<BTreeMap<LogicalTable, u8>>,
}

/// Packet-in reflector tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInConfig {
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Sweep the dedup buffer every this many packets.
    #[serde(default = "default_sweep_every_packets")]
    pub sweep_every_packets: u32,

    #[serde(default = "default_reactive_idle_timeout_secs")]
    pub reactive_idle_timeout_secs: u16,
}

/// Flow writer commit behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Bounded wait for queued commits on shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Abort RSP processing that runs longer than this; unbounded when absent.
    #[serde(default)]
    pub processing_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

/// Complete renderer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub packet_in: PacketInConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_table_base() -> u8 {
    20
}

fn default_dedup_window_ms() -> u64 {
    60_000
}

fn default_sweep_every_packets() -> u32 {
    100
}

fn default_reactive_idle_timeout_secs() -> u16 {
    60
}

fn default_max_commit_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_coexistence: false,
            table_base: default_table_base(),
            egress_resubmit_table: 0,
            table_mapping: None,
        }
    }
}

impl Default for PacketInConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: default_dedup_window_ms(),
            sweep_every_packets: default_sweep_every_packets(),
            reactive_idle_timeout_secs: default_reactive_idle_timeout_secs(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: default_max_commit_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            processing_timeout_ms: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl RendererConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.app_coexistence && pipeline.table_mapping.is_none() {
            if pipeline.table_base <= 2 {
                return Err(RendererError::config(
                    "pipeline.table_base",
                    format!(
                        "{} would collide with table 0 under app-coexistence",
                        pipeline.table_base
                    ),
                ));
            }
            if pipeline.table_base.checked_add(COEXISTENCE_SPAN).is_none() {
                return Err(RendererError::config(
                    "pipeline.table_base",
                    format!("{} leaves no room for the egress table", pipeline.table_base),
                ));
            }
        }
        if self.packet_in.sweep_every_packets == 0 {
            return Err(RendererError::config(
                "packet_in.sweep_every_packets",
                "must be positive",
            ));
        }
        if self.writer.max_commit_attempts == 0 {
            return Err(RendererError::config(
                "writer.max_commit_attempts",
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.packet_in.dedup_window_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.writer.retry_backoff_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.writer.shutdown_timeout_ms)
    }

    pub fn processing_timeout(&self) -> Option<Duration> {
        self.writer.processing_timeout_ms.map(Duration::from_millis)
    }
}
