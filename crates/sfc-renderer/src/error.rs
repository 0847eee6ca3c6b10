//! Error types for the renderer.

use sfc_orch_common::{RefCountError, WorkerClosed};
use sfc_types::{ParseError, PathId};
use std::io;
use thiserror::Error;

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, RendererError>;

/// Errors raised while rendering, committing or reflecting.
#[derive(Debug, Error)]
pub enum RendererError {
    /// The resolver has no definition for a forwarder named by the path.
    #[error("forwarder '{forwarder}' not found")]
    ForwarderNotFound { forwarder: String },

    /// The resolver has no definition for a function named by the path.
    #[error("function '{function}' not found")]
    FunctionNotFound { function: String },

    /// No pair of data plane locators links two adjacent forwarders.
    #[error("no matching data plane locators between '{src}' and '{dst}' on path {path}")]
    DplUnresolved {
        src: String,
        dst: String,
        path: PathId,
    },

    /// A locator the transport needs is not declared.
    #[error("{what} missing on forwarder '{forwarder}' for path {path}")]
    LocatorMissing {
        what: String,
        forwarder: String,
        path: PathId,
    },

    #[error("unsupported transport: {transport}")]
    UnsupportedTransport { transport: String },

    #[error("invalid rendered service path: {message}")]
    InvalidRsp { message: String },

    /// Processing did not finish within the configured bound.
    #[error("processing of path {path} timed out after {timeout_ms}ms")]
    Timeout { path: PathId, timeout_ms: u64 },

    /// The flow store rejected a batch.
    #[error("flow store {operation} failed: {message}")]
    Store { operation: String, message: String },

    #[error("invalid configuration for {field}: {message}")]
    Config { field: String, message: String },

    /// Inconsistent internal bookkeeping.
    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RendererError {
    pub fn forwarder_not_found(forwarder: impl Into<String>) -> Self {
        Self::ForwarderNotFound {
            forwarder: forwarder.into(),
        }
    }

    pub fn function_not_found(function: impl Into<String>) -> Self {
        Self::FunctionNotFound {
            function: function.into(),
        }
    }

    pub fn dpl_unresolved(src: impl Into<String>, dst: impl Into<String>, path: PathId) -> Self {
        Self::DplUnresolved {
            src: src.into(),
            dst: dst.into(),
            path,
        }
    }

    pub fn locator_missing(
        what: impl Into<String>,
        forwarder: impl Into<String>,
        path: PathId,
    ) -> Self {
        Self::LocatorMissing {
            what: what.into(),
            forwarder: forwarder.into(),
            path,
        }
    }

    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for errors that abort the processing of a path.
    ///
    /// Store failures are recovered by the writer's retry policy and never
    /// unwind RSP processing.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store { .. })
    }
}

impl From<ParseError> for RendererError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::UnknownTransport(transport) => Self::UnsupportedTransport { transport },
            other => Self::InvalidRsp {
                message: other.to_string(),
            },
        }
    }
}

impl From<RefCountError> for RendererError {
    fn from(e: RefCountError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<WorkerClosed> for RendererError {
    fn from(e: WorkerClosed) -> Self {
        Self::store("submit", e.to_string())
    }
}
