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

//! Infrastructure adapter streaming `COPY ... TO STDOUT` output from PostgreSQL
//! straight into a local CSV file.

use crate::domain::entities::{ConnectionParams, ExportStatement, StreamStats};
use crate::domain::errors::{ExportError, Result, Stage};
use crate::ports::export_streamer::ExportStreamer;
use log::{debug, info, warn};
use postgres::error::SqlState;
use postgres::{Client, Config, NoTls};
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Size of each read from the COPY stream, and of the file write buffer.
const CHUNK_SIZE: usize = 128 * 1024;

/// A peer that goes silent mid-COPY is dropped after roughly
/// idle + interval * retries instead of the kernel default of hours.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const KEEPALIVE_RETRIES: u32 = 3;

/// Concrete implementation of `ExportStreamer` for PostgreSQL.
///
/// Opens a fresh connection per export, runs the statement in COPY OUT mode
/// and moves fixed-size chunks from the socket to disk, so memory use does
/// not depend on the size of the result.
pub struct PostgresCopyStreamer {
    connect_timeout: Duration,
    statement_timeout: Duration,
    /// Whether the statement emits a header line, which the row count skips.
    has_header: bool,
}

impl PostgresCopyStreamer {
    pub fn new(connect_timeout: Duration, statement_timeout: Duration, has_header: bool) -> Self {
        Self {
            connect_timeout,
            statement_timeout,
            has_header,
        }
    }

    fn pg_config(&self, params: &ConnectionParams) -> Config {
        let mut config = Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .user(&params.username)
            .dbname(&params.dbname)
            .application_name("pg-backfill-export")
            .connect_timeout(self.connect_timeout)
            .keepalives(true)
            .keepalives_idle(KEEPALIVE_IDLE)
            .keepalives_interval(KEEPALIVE_INTERVAL)
            .keepalives_retries(KEEPALIVE_RETRIES)
            .options(&format!(
                "-c statement_timeout={}",
                self.statement_timeout.as_millis()
            ));
        if let Some(password) = &params.password {
            config.password(password);
        }
        config
    }

    /// Establishes a fresh connection to the database.
    fn get_conn(&self, params: &ConnectionParams) -> Result<Client> {
        let started = Instant::now();
        self.pg_config(params).connect(NoTls).map_err(|e| {
            if started.elapsed() >= self.connect_timeout {
                ExportError::Timeout {
                    stage: Stage::Connect,
                    secs: self.connect_timeout.as_secs(),
                }
            } else {
                ExportError::ConnectionFailed {
                    host: params.host.clone(),
                    port: params.port,
                    reason: e.to_string(),
                }
            }
        })
    }

    fn query_error(&self, e: &postgres::Error) -> ExportError {
        if e.code() == Some(&SqlState::QUERY_CANCELED) {
            return ExportError::Timeout {
                stage: Stage::Stream,
                secs: self.statement_timeout.as_secs(),
            };
        }
        match e.as_db_error() {
            Some(db) => ExportError::QueryFailed(db.message().to_string()),
            None => ExportError::QueryFailed(e.to_string()),
        }
    }

    /// Errors raised while reading the COPY stream arrive wrapped in `io::Error`.
    fn read_error(&self, e: std::io::Error) -> ExportError {
        match e
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<postgres::Error>())
        {
            Some(pg) => self.query_error(pg),
            None => ExportError::QueryFailed(e.to_string()),
        }
    }
}

impl ExportStreamer for PostgresCopyStreamer {
    fn stream_export(
        &self,
        params: &ConnectionParams,
        statement: &ExportStatement,
        dest: &Path,
    ) -> Result<StreamStats> {
        let start_time = Instant::now();
        let write_err = |source: std::io::Error| ExportError::WriteFailed {
            path: dest.display().to_string(),
            source,
        };

        // 1. Connect
        let mut client = self.get_conn(params)?;
        debug!("Connected to {}:{}/{}", params.host, params.port, params.dbname);

        // 2. Open Output
        let file = File::create(dest).map_err(write_err)?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        // 3. Stream Results
        let mut bytes: u64 = 0;
        let mut counter = RecordCounter::default();
        {
            let mut reader = client
                .copy_out(statement.copy.as_str())
                .map_err(|e| self.query_error(&e))?;
            let mut buf = vec![0u8; CHUNK_SIZE];

            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(self.read_error(e)),
                };
                writer.write_all(&buf[..n]).map_err(write_err)?;
                bytes += n as u64;
                counter.feed(&buf[..n]);
            }
        }

        // 4. Flush and close before anyone reads the file.
        let file = writer
            .into_inner()
            .map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        if let Err(e) = client.close() {
            warn!("Closing connection to {} failed: {}", params.host, e);
        }

        let rows = counter.finish(self.has_header);

        info!(
            "Streamed {} rows ({} bytes) to {} in {:.2}s",
            rows,
            bytes,
            dest.display(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(StreamStats { bytes, rows })
    }
}

/// Counts CSV records in a stream fed chunk by chunk, ignoring newlines
/// inside quoted fields.
#[derive(Debug)]
struct RecordCounter {
    records: u64,
    in_quotes: bool,
    at_line_start: bool,
}

impl Default for RecordCounter {
    fn default() -> Self {
        Self {
            records: 0,
            in_quotes: false,
            at_line_start: true,
        }
    }
}

impl RecordCounter {
    fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            match b {
                b'"' => {
                    // A doubled quote toggles twice, which leaves the state unchanged.
                    self.in_quotes = !self.in_quotes;
                    self.at_line_start = false;
                }
                b'\n' if !self.in_quotes => {
                    self.records += 1;
                    self.at_line_start = true;
                }
                _ => self.at_line_start = false,
            }
        }
    }

    /// Data rows seen: an unterminated last line counts, a header line does not.
    fn finish(self, has_header: bool) -> u64 {
        let mut rows = self.records;
        if !self.at_line_start {
            rows += 1;
        }
        if has_header {
            rows = rows.saturating_sub(1);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streamer() -> PostgresCopyStreamer {
        PostgresCopyStreamer::new(Duration::from_secs(1), Duration::from_secs(5), false)
    }

    fn count_all(chunks: &[&[u8]], has_header: bool) -> u64 {
        let mut counter = RecordCounter::default();
        for c in chunks {
            counter.feed(c);
        }
        counter.finish(has_header)
    }

    #[test]
    fn test_count_records_simple() {
        assert_eq!(count_all(&[b"\"1\",\"a\"\n\"2\",\"b\"\n"], false), 2);
        assert_eq!(count_all(&[b""], false), 0);
    }

    #[test]
    fn test_count_records_embedded_newline_and_quotes() {
        let data = b"\"1\",\"line one\nline two\"\n\"2\",\"say \"\"hi\"\"\"\n";
        assert_eq!(count_all(&[data], false), 2);
    }

    #[test]
    fn test_count_records_across_chunk_boundaries() {
        let data: &[u8] = b"\"1\",\"x\ny\"\n\"2\",\"z\"\n\"3\",\"w\"";
        let (a, b) = data.split_at(7);
        assert_eq!(count_all(&[a, b], false), 3);
    }

    #[test]
    fn test_header_line_is_not_a_row() {
        let data: &[u8] = b"\"id\",\"email\"\n\"1\",\"a@example.com\"\n\"2\",\"b@example.com\"\n";
        assert_eq!(count_all(&[data], true), 2);
        assert_eq!(count_all(&[data], false), 3);
    }

    #[test]
    fn test_header_only_result_has_no_rows() {
        assert_eq!(count_all(&[b"\"id\",\"email\"\n"], true), 0);
        assert_eq!(count_all(&[b"\"id\",\"email\""], true), 0);
        assert_eq!(count_all(&[b""], true), 0);
    }

    #[test]
    fn test_pg_config_fields() {
        let params = ConnectionParams {
            host: "db.internal".into(),
            port: 6432,
            dbname: "maindb".into(),
            username: "svc".into(),
            password: Some("pw".into()),
        };
        let config = streamer().pg_config(&params);
        assert_eq!(config.get_user(), Some("svc"));
        assert_eq!(config.get_dbname(), Some("maindb"));
        assert_eq!(config.get_ports(), &[6432]);
        assert_eq!(config.get_password(), Some(&b"pw"[..]));
        assert_eq!(config.get_options(), Some("-c statement_timeout=5000"));
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(1)));
        assert!(config.get_keepalives());
        assert_eq!(config.get_keepalives_idle(), KEEPALIVE_IDLE);
        assert_eq!(config.get_keepalives_interval(), Some(KEEPALIVE_INTERVAL));
        assert_eq!(config.get_keepalives_retries(), Some(KEEPALIVE_RETRIES));
    }

    #[test]
    fn test_unreachable_database_is_connection_failure() {
        // Port 1 on loopback refuses immediately.
        let params = ConnectionParams {
            host: "127.0.0.1".into(),
            port: 1,
            dbname: "x".into(),
            username: "x".into(),
            password: None,
        };
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.csv");
        let stmt = ExportStatement {
            select: "SELECT 1".into(),
            copy: "COPY (SELECT 1) TO STDOUT WITH (FORMAT CSV, FORCE_QUOTE *)".into(),
        };

        let err = streamer().stream_export(&params, &stmt, &dest).unwrap_err();
        assert!(matches!(err, ExportError::ConnectionFailed { port: 1, .. }));
        assert!(!dest.exists());
    }
}
