// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (§7). These are *kinds*, not one universal error type:
//! each carries only what its propagation policy needs.
//!
//! - `ConfigError` unwinds to the caller and exits the process non-zero.
//! - `TransientProducerError` is recovered locally (counted, reconnected).
//! - `BackpressureDrop` is not an error at all — it is observed only via
//!   the `channel_drops` counter in `stats`; no type is needed for it.
//! - `FatalRuntimeError` kills and restarts the current producer but keeps
//!   the pipeline up.
//! - "AgentNotice" kinds (`reconnect_notice`, `gap_detected`, `gap_filled`,
//!   `clear_buffer`, `cutoff_reached`) are informational sidecar events,
//!   never raised as errors — they are `OutputEntry` variants in
//!   `simtail-daemon::emitter`, not part of this module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration surfaced at startup with a non-zero exit and a
/// single `error` event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid where-expression at position {position}: {message}")]
    InvalidWhereExpr { position: usize, message: String },

    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("unknown target '{query}'")]
    UnknownTarget { query: String },

    #[error("invalid duration '{value}'")]
    InvalidDuration { value: String },
}

impl ConfigError {
    /// Stable machine-readable code for the `error` output event.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::InvalidWhereExpr { .. } => "invalid_where_expr",
            ConfigError::InvalidRegex { .. } => "invalid_regex",
            ConfigError::UnknownTarget { .. } => "unknown_target",
            ConfigError::InvalidDuration { .. } => "invalid_duration",
        }
    }
}

/// Recovered locally by the supervisor/parser: counted and, when recovery
/// is attempted, always followed by a `reconnect_notice`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransientProducerError {
    #[error("producer exited with code {code:?}")]
    ProducerExited { code: Option<i32> },

    #[error("failed to parse line: {message}")]
    ParseFailure { message: String },

    #[error("producer stderr: {line}")]
    StderrNoise { line: String },
}

/// Kills the current producer and emits a `reconnect_notice{severity="error"}`;
/// the pipeline itself remains up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalRuntimeError {
    #[error("producer line exceeds {limit_bytes} bytes")]
    LineTooLong { limit_bytes: usize },

    #[error("invalid UTF-8 in producer stream")]
    InvalidUtf8,

    #[error("unrecoverable OS error: {message}")]
    Os { message: String },
}

/// Payload of the single `error` output event emitted before a non-zero exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&ConfigError> for ErrorEvent {
    fn from(err: &ConfigError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            hint: None,
        }
    }
}
