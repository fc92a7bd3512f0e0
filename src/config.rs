//! Application configuration.
//!
//! Loaded once at startup from a YAML or JSON file, overlaid with the
//! environment variables the trigger host provides, then with CLI flags. The
//! result is validated and never mutated afterwards.

use crate::domain::entities::{CredentialStrategy, LogicalDatabase};
use crate::domain::errors::{ExportError, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_MAIN_DB: &str = "PostgresMainDBConnectionString";
pub const ENV_PROPERTIES_DB: &str = "PostgresPropertiesDBConnectionString";
pub const ENV_CONTAINER: &str = "BackfillStorageContainer";
pub const ENV_STORAGE_CONN_STRING: &str = "BackfillStorageConnString";
pub const ENV_STORAGE_ACCOUNT_URL: &str = "BackfillStorageAccountUrl";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Logical database name to `postgres://` URI.
    #[serde(default)]
    pub databases: BTreeMap<LogicalDatabase, String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub container: String,
    /// e.g. `https://<account>.blob.core.windows.net`
    pub account_url: Option<String>,
    pub connection_string: Option<String>,
    #[serde(default)]
    pub credential: CredentialStrategy,
    /// Client id of a user-assigned managed identity.
    pub managed_identity_client_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    /// Scratch directory for local artifacts. Defaults to the system temp dir.
    pub work_dir: Option<String>,
    pub include_header: Option<bool>,
    pub strict_identifiers: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub statement_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub upload_part_size_mb: Option<usize>,
    pub parallel: Option<usize>,
    pub cpu_percent: Option<u8>,
    /// When set, batch runs write `report_<timestamp>.json` here.
    pub report_dir: Option<String>,
}

impl ExportConfig {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn include_header(&self) -> bool {
        self.include_header.unwrap_or(false)
    }

    pub fn strict_identifiers(&self) -> bool {
        self.strict_identifiers.unwrap_or(false)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(30))
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs.unwrap_or(3600))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs.unwrap_or(1800))
    }

    pub fn upload_part_size(&self) -> usize {
        self.upload_part_size_mb.unwrap_or(8) * 1024 * 1024
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// JSON request body to run, or '-' to read it from stdin
    #[arg(long, conflicts_with = "requests")]
    pub request: Option<String>,
    /// JSON array of request bodies, exported in parallel
    #[arg(long)]
    pub requests: Option<String>,

    // Ad-hoc request
    #[arg(long)]
    pub db_name: Option<String>,
    #[arg(long)]
    pub schema_name: Option<String>,
    #[arg(long)]
    pub table_name: Option<String>,
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,
    #[arg(long = "where")]
    pub where_clause: Option<String>,

    // Overrides
    #[arg(long)]
    pub container: Option<String>,
    #[arg(long)]
    pub work_dir: Option<String>,
    #[arg(long)]
    pub report_dir: Option<String>,
    #[arg(long)]
    pub parallel: Option<usize>,
    #[arg(long)]
    pub include_header: bool,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| ExportError::ConfigError(format!("Cannot read {}: {}", path, e)))?;

        let config: AppConfig = if path.ends_with(".json") {
            serde_json::from_str(&contents)
                .map_err(|e| ExportError::ConfigError(format!("{}: {}", path, e)))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| ExportError::ConfigError(format!("{}: {}", path, e)))?
        };

        Ok(config)
    }

    /// Fills gaps from the process environment. File values win.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (db, key) in [
            (LogicalDatabase::Main, ENV_MAIN_DB),
            (LogicalDatabase::Properties, ENV_PROPERTIES_DB),
        ] {
            if let Some(uri) = lookup(key).filter(|v| !v.is_empty()) {
                self.databases.entry(db).or_insert(uri);
            }
        }

        if self.storage.container.is_empty() {
            if let Some(c) = lookup(ENV_CONTAINER) {
                self.storage.container = c;
            }
        }
        if self.storage.connection_string.is_none() {
            self.storage.connection_string =
                lookup(ENV_STORAGE_CONN_STRING).filter(|v| !v.is_empty());
        }
        if self.storage.account_url.is_none() {
            self.storage.account_url = lookup(ENV_STORAGE_ACCOUNT_URL).filter(|v| !v.is_empty());
        }
    }

    pub fn merge_cli(&mut self, args: &CliArgs) {
        if let Some(c) = &args.container { self.storage.container = c.clone(); }
        if let Some(w) = &args.work_dir { self.export.work_dir = Some(w.clone()); }
        if let Some(r) = &args.report_dir { self.export.report_dir = Some(r.clone()); }
        if let Some(p) = args.parallel { self.export.parallel = Some(p); }
        if args.include_header { self.export.include_header = Some(true); }
    }

    pub fn validate(&self) -> Result<()> {
        if self.databases.is_empty() {
            return Err(ExportError::ConfigError(format!(
                "No databases configured (set `databases` or {} / {})",
                ENV_MAIN_DB, ENV_PROPERTIES_DB
            )));
        }
        if self.storage.container.trim().is_empty() {
            return Err(ExportError::ConfigError(format!(
                "Storage container is not set (set `storage.container` or {})",
                ENV_CONTAINER
            )));
        }
        match self.storage.credential {
            CredentialStrategy::ManagedIdentity if self.storage.account_url.is_none() => {
                return Err(ExportError::ConfigError(format!(
                    "Managed identity needs the storage account URL (set `storage.account_url` or {})",
                    ENV_STORAGE_ACCOUNT_URL
                )));
            }
            CredentialStrategy::ConnectionString if self.storage.connection_string.is_none() => {
                return Err(ExportError::ConfigError(format!(
                    "Connection string credential selected but none configured (set `storage.connection_string` or {})",
                    ENV_STORAGE_CONN_STRING
                )));
            }
            _ => {}
        }
        if let Some(p) = self.export.cpu_percent {
            if p == 0 || p > 100 {
                return Err(ExportError::ConfigError(format!(
                    "cpu_percent must be between 1 and 100, got {}",
                    p
                )));
            }
        }
        for (name, secs) in [
            ("connect_timeout_secs", self.export.connect_timeout_secs),
            ("statement_timeout_secs", self.export.statement_timeout_secs),
            ("upload_timeout_secs", self.export.upload_timeout_secs),
        ] {
            if secs == Some(0) {
                return Err(ExportError::ConfigError(format!("{} must be positive", name)));
            }
        }
        if self.export.upload_part_size_mb == Some(0) {
            return Err(ExportError::ConfigError(
                "upload_part_size_mb must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
