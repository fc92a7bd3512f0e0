//! # Domain Entities
//!
//! The nouns of the exporter: which database to read, what to read from it,
//! how to reach it, and where the resulting artifact ends up.
//!
//! Everything here is immutable once built. Entities derive `serde` traits so
//! requests can be read from JSON bodies and results written to reports.

use crate::domain::errors::{ExportError, FailureKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named configuration slot resolving to one physical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalDatabase {
    Main,
    Properties,
}

impl LogicalDatabase {
    pub const ALL: [LogicalDatabase; 2] = [LogicalDatabase::Main, LogicalDatabase::Properties];

    /// The name callers use in requests, also used as the catalog qualifier in SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalDatabase::Main => "main",
            LogicalDatabase::Properties => "properties",
        }
    }
}

impl fmt::Display for LogicalDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalDatabase {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalDatabase::ALL
            .into_iter()
            .find(|db| db.as_str() == s)
            .ok_or_else(|| ExportError::UnknownDatabase(s.to_string()))
    }
}

/// Raw request body as received from the trigger.
///
/// `db_name` stays a string here so that an unknown name surfaces as
/// `UnknownDatabase` rather than a deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestBody {
    pub db_name: String,
    pub schema_name: String,
    pub table_name: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

/// One table export, fully typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub database: LogicalDatabase,
    pub schema: String,
    pub table: String,
    /// Empty means every column.
    pub columns: Vec<String>,
    /// Raw predicate, trusted as given.
    pub filter: Option<String>,
}

impl TryFrom<RequestBody> for ExportRequest {
    type Error = ExportError;

    fn try_from(body: RequestBody) -> Result<Self, Self::Error> {
        Ok(Self {
            database: body.db_name.parse()?,
            schema: body.schema_name,
            table: body.table_name,
            columns: body.columns.unwrap_or_default(),
            filter: body.where_clause,
        })
    }
}

/// Everything needed to open a PostgreSQL session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: Option<String>,
}

// Hand-written so passwords never reach the logs.
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A generated, read-only export statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportStatement {
    /// The inner `SELECT`, kept for logging and reports.
    pub select: String,
    /// The full `COPY (...) TO STDOUT ...` sent to the server.
    pub copy: String,
}

/// Where an artifact is persisted in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobTarget {
    pub container: String,
    /// `<table>/<artifact name>`
    pub blob_path: String,
}

impl BlobTarget {
    pub fn new(container: &str, table: &str, artifact_name: &str) -> Self {
        Self {
            container: container.to_string(),
            blob_path: format!("{}/{}", table, artifact_name),
        }
    }
}

impl fmt::Display for BlobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob_path)
    }
}

/// How the blob client authenticates. Exactly one is active per publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStrategy {
    /// Platform-issued identity, no embedded secret.
    #[default]
    ManagedIdentity,
    /// Account name and key taken from the storage connection string.
    ConnectionString,
}

impl fmt::Display for CredentialStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStrategy::ManagedIdentity => write!(f, "managed-identity"),
            CredentialStrategy::ConnectionString => write!(f, "connection-string"),
        }
    }
}

/// What the streamer wrote, reported once the artifact is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes: u64,
    pub rows: u64,
}

/// `ExportOutcome` is the report card for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub database: String,
    pub schema: String,
    pub table: String,
    /// The blob, present only when the upload committed.
    pub blob: Option<BlobTarget>,
    pub rows: u64,
    pub bytes: u64,
    /// Wall-clock time taken, in seconds.
    pub duration: f64,
    /// `None` on success.
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    /// Set when the local artifact could not be removed. Never turns a
    /// success into a failure.
    pub cleanup_warning: Option<String>,
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Builds the failed outcome for a request that never produced a blob.
    pub fn failure(database: &str, schema: &str, table: &str, err: &ExportError) -> Self {
        Self {
            database: database.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            blob: None,
            rows: 0,
            bytes: 0,
            duration: 0.0,
            failure: Some(err.kind()),
            error: Some(err.to_string()),
            cleanup_warning: None,
        }
    }
}
