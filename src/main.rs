//! # Postgres Backfill Exporter
//!
//! Exports one table (or an ad-hoc projection of it) from a Postgres database
//! as a fully quoted CSV file and publishes it to Azure Blob Storage under
//! `<table>/<table>_<timestamp>.csv`. The local copy never outlives a request.
//!
//! This application follows the **Hexagonal Architecture** (Ports and Adapters)
//! to keep the export flow independent of Postgres and Azure specifics.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use crate::application::orchestrator::Orchestrator;
use crate::application::runtime::RuntimeContext;
use crate::config::{AppConfig, CliArgs};
use crate::domain::entities::RequestBody;
use crate::domain::errors::{ExportError, Result};
use clap::Parser;
use log::{error, info};
use std::io::Read;
use std::process;

/// What the command line asked to export.
#[derive(Debug, PartialEq)]
enum Job {
    Single(RequestBody),
    Batch(Vec<RequestBody>),
}

fn main() {
    // 1. Initialize Logging
    env_logger::init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Load Config
    let mut config = match &args.config {
        Some(path) => match AppConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    config.apply_env();
    config.merge_cli(&args);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    // 4. Read the request(s) before touching any external system
    let job = match load_job(&args, read_source) {
        Ok(job) => job,
        Err(e) => {
            error!("Invalid request: {}", e);
            process::exit(1);
        }
    };

    // 5. Wire adapters
    let ctx = match RuntimeContext::init(&config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Startup failed: {}", e);
            process::exit(1);
        }
    };

    // 6. Run
    match job {
        Job::Single(body) => match ctx.pipeline.run_body(body) {
            Ok(outcome) => {
                info!(
                    "Exported {} rows ({} bytes) in {:.2}s",
                    outcome.rows, outcome.bytes, outcome.duration
                );
                println!("Success");
            }
            Err(e) => {
                error!("Export failed [{:?}]: {}", e.kind(), e);
                process::exit(1);
            }
        },
        Job::Batch(bodies) => {
            info!(
                "Running {} exports on {} workers",
                bodies.len(),
                ctx.num_threads
            );
            let orchestrator =
                Orchestrator::new(ctx.pipeline.clone(), config.export.report_dir.clone());
            match orchestrator.run(bodies) {
                Ok(results) => {
                    let success_count = results.iter().filter(|r| r.is_success()).count();
                    info!(
                        "Batch finished. {}/{} exports successful.",
                        success_count,
                        results.len()
                    );
                    if success_count != results.len() {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    error!("Orchestrator failed: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}

/// Reads a file, or stdin for `-`.
fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        read_request(std::io::stdin().lock(), "stdin")
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| ExportError::InvalidRequest(format!("Cannot read {}: {}", source, e)))
    }
}

/// An unreadable request is the caller's problem, not a local write failure.
fn read_request(mut reader: impl Read, source: &str) -> Result<String> {
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .map_err(|e| ExportError::InvalidRequest(format!("Cannot read {}: {}", source, e)))?;
    Ok(contents)
}

fn load_job(args: &CliArgs, read: impl Fn(&str) -> Result<String>) -> Result<Job> {
    if let Some(source) = &args.requests {
        let bodies: Vec<RequestBody> = serde_json::from_str(&read(source)?)
            .map_err(|e| ExportError::InvalidRequest(format!("{}: {}", source, e)))?;
        return Ok(Job::Batch(bodies));
    }

    if let Some(source) = &args.request {
        let body: RequestBody = serde_json::from_str(&read(source)?)
            .map_err(|e| ExportError::InvalidRequest(format!("{}: {}", source, e)))?;
        return Ok(Job::Single(body));
    }

    match (&args.db_name, &args.schema_name, &args.table_name) {
        (Some(db), Some(schema), Some(table)) => Ok(Job::Single(RequestBody {
            db_name: db.clone(),
            schema_name: schema.clone(),
            table_name: table.clone(),
            columns: args.columns.clone(),
            where_clause: args.where_clause.clone(),
        })),
        _ => Err(ExportError::InvalidRequest(
            "Pass --request, --requests, or --db-name with --schema-name and --table-name"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_files(_: &str) -> Result<String> {
        panic!("no file should be read");
    }

    #[test]
    fn test_ad_hoc_flags() {
        let args = CliArgs::parse_from([
            "pg-backfill-export",
            "--db-name",
            "main",
            "--schema-name",
            "public",
            "--table-name",
            "users",
            "--columns",
            "id,email",
            "--where",
            "created_at > '2024-01-01'",
        ]);
        let job = load_job(&args, no_files).unwrap();
        assert_eq!(
            job,
            Job::Single(RequestBody {
                db_name: "main".into(),
                schema_name: "public".into(),
                table_name: "users".into(),
                columns: Some(vec!["id".into(), "email".into()]),
                where_clause: Some("created_at > '2024-01-01'".into()),
            })
        );
    }

    #[test]
    fn test_request_body_from_source() {
        let args = CliArgs::parse_from(["pg-backfill-export", "--request", "-"]);
        let job = load_job(&args, |src| {
            assert_eq!(src, "-");
            Ok(r#"{"db_name":"properties","schema_name":"public","table_name":"listings","where":"active"}"#.to_string())
        })
        .unwrap();
        match job {
            Job::Single(body) => {
                assert_eq!(body.db_name, "properties");
                assert_eq!(body.columns, None);
                assert_eq!(body.where_clause.as_deref(), Some("active"));
            }
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[test]
    fn test_batch_from_source() {
        let args = CliArgs::parse_from(["pg-backfill-export", "--requests", "batch.json"]);
        let job = load_job(&args, |_| {
            Ok(r#"[
                {"db_name":"main","schema_name":"public","table_name":"users"},
                {"db_name":"main","schema_name":"public","table_name":"orders","columns":["id"]}
            ]"#
            .to_string())
        })
        .unwrap();
        assert!(matches!(job, Job::Batch(ref b) if b.len() == 2));
    }

    #[test]
    fn test_malformed_body_is_invalid_request() {
        let args = CliArgs::parse_from(["pg-backfill-export", "--request", "r.json"]);
        let err = load_job(&args, |_| Ok("{\"db_name\":\"main\"}".to_string())).unwrap_err();
        assert!(matches!(err, ExportError::InvalidRequest(_)));
    }

    #[test]
    fn test_missing_request_is_rejected() {
        let args = CliArgs::parse_from(["pg-backfill-export", "--db-name", "main"]);
        assert!(load_job(&args, no_files).is_err());
    }

    #[test]
    fn test_read_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(read_source(missing.to_str().unwrap()).is_err());
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_failed_read_is_invalid_request() {
        let err = read_request(BrokenPipe, "stdin").unwrap_err();
        assert_eq!(err.kind(), crate::domain::errors::FailureKind::InvalidRequest);

        let err = read_request(&[0xff, 0xfe][..], "stdin").unwrap_err();
        assert!(matches!(err, ExportError::InvalidRequest(_)));
    }

    #[test]
    fn test_read_request_returns_body() {
        let body = read_request(&br#"{"db_name":"main"}"#[..], "stdin").unwrap();
        assert_eq!(body, r#"{"db_name":"main"}"#);
    }
}
