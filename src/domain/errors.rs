// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core error definitions for the backfill exporter.
//!
//! Every stage of the pipeline reports failures through `ExportError`. Each
//! variant maps onto exactly one `FailureKind`, which is what callers, reports
//! and exit codes see.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types encountered during an export request.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Writing {path} failed: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage authentication failed: {0}")]
    AuthFailed(String),

    #[error("Upload of {blob} failed: {reason}")]
    UploadFailed { blob: String, reason: String },

    #[error("Cleanup of {path} failed: {source}")]
    CleanupFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Pipeline stage used to qualify timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Stream,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => write!(f, "database connect"),
            Stage::Stream => write!(f, "export stream"),
            Stage::Upload => write!(f, "blob upload"),
        }
    }
}

/// Caller-visible classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Config,
    InvalidRequest,
    UnknownDatabase,
    ConnectionFailed,
    QueryFailed,
    WriteFailed,
    AuthFailed,
    UploadFailed,
    CleanupFailed,
    Timeout,
}

impl ExportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExportError::ConfigError(_) => FailureKind::Config,
            ExportError::InvalidRequest(_) => FailureKind::InvalidRequest,
            ExportError::UnknownDatabase(_) => FailureKind::UnknownDatabase,
            ExportError::ConnectionFailed { .. } => FailureKind::ConnectionFailed,
            ExportError::QueryFailed(_) => FailureKind::QueryFailed,
            ExportError::WriteFailed { .. } | ExportError::IoError(_) => FailureKind::WriteFailed,
            ExportError::AuthFailed(_) => FailureKind::AuthFailed,
            ExportError::UploadFailed { .. } => FailureKind::UploadFailed,
            ExportError::CleanupFailed { .. } => FailureKind::CleanupFailed,
            ExportError::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

/// A specialized Result type for the backfill exporter.
pub type Result<T> = std::result::Result<T, ExportError>;
