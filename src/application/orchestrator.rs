//! Runs a batch of independent export requests in parallel.
//!
//! Each request goes through the same `ExportPipeline`; a failure in one does
//! not affect the others. Optionally writes a JSON report for the batch.

use crate::application::pipeline::ExportPipeline;
use crate::domain::entities::{ExportOutcome, RequestBody};
use crate::domain::errors::{ExportError, Result};
use log::{error, info};
use rayon::prelude::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct Orchestrator {
    pipeline: Arc<ExportPipeline>,
    report_dir: Option<String>,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<ExportPipeline>, report_dir: Option<String>) -> Self {
        Self {
            pipeline,
            report_dir,
        }
    }

    /// Exports every request on the global thread pool. Results keep the
    /// order of `bodies`.
    pub fn run(&self, bodies: Vec<RequestBody>) -> Result<Vec<ExportOutcome>> {
        let start_time = Instant::now();
        info!("Starting batch of {} exports...", bodies.len());

        if bodies.is_empty() {
            info!("No requests to export.");
            return Ok(vec![]);
        }

        let results: Vec<ExportOutcome> = bodies
            .into_par_iter()
            .map(|body| {
                let (db, schema, table) = (
                    body.db_name.clone(),
                    body.schema_name.clone(),
                    body.table_name.clone(),
                );
                match self.pipeline.run_body(body) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Export {}.{}.{} failed: {}", db, schema, table, e);
                        ExportOutcome::failure(&db, &schema, &table, &e)
                    }
                }
            })
            .collect();

        if let Some(dir) = &self.report_dir {
            self.generate_report(Path::new(dir), &results, start_time.elapsed().as_secs_f64())?;
        }

        Ok(results)
    }

    fn generate_report(&self, dir: &Path, results: &[ExportOutcome], duration_secs: f64) -> Result<()> {
        let success = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - success;
        let total_rows: u64 = results.iter().map(|r| r.rows).sum();
        let total_bytes: u64 = results.iter().map(|r| r.bytes).sum();

        let report = json!({
            "summary": {
                "total_tasks": results.len(),
                "success": success,
                "failed": failed,
                "total_rows": total_rows,
                "total_bytes": total_bytes,
                "total_duration_seconds": duration_secs,
            },
            "details": results
        });

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let report_path = dir.join(format!("report_{}.json", timestamp));

        std::fs::create_dir_all(dir)?;
        let file = std::fs::File::create(&report_path).map_err(ExportError::IoError)?;
        serde_json::to_writer_pretty(file, &report)
            .map_err(|e| ExportError::IoError(e.into()))?;

        info!("Report written to {}", report_path.display());
        Ok(())
    }
}
