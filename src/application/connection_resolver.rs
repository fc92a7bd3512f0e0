//! Maps logical database names to connection parameters.
//!
//! Built once from configuration and shared read-only between requests.

use crate::config::AppConfig;
use crate::domain::entities::{ConnectionParams, LogicalDatabase};
use crate::domain::errors::{ExportError, Result};
use crate::infrastructure::postgres::connection_uri::parse_connection_uri;
use log::info;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ConnectionResolver {
    params: BTreeMap<LogicalDatabase, ConnectionParams>,
}

impl ConnectionResolver {
    pub fn new(params: BTreeMap<LogicalDatabase, ConnectionParams>) -> Self {
        Self { params }
    }

    /// Parses every configured URI up front so bad config fails at startup.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut params = BTreeMap::new();
        for (db, uri) in &config.databases {
            let p = parse_connection_uri(uri).map_err(|e| {
                ExportError::ConfigError(format!("Database `{}`: {}", db, e))
            })?;
            info!("Database `{}` -> {}:{}/{}", db, p.host, p.port, p.dbname);
            params.insert(*db, p);
        }
        Ok(Self::new(params))
    }

    /// Fails closed: a database without configuration is unknown.
    pub fn resolve(&self, db: LogicalDatabase) -> Result<&ConnectionParams> {
        self.params
            .get(&db)
            .ok_or_else(|| ExportError::UnknownDatabase(db.to_string()))
    }
}
