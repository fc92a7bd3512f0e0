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

//! # Export Pipeline
//!
//! Runs one export request end to end:
//!
//! 1. resolve the logical database
//! 2. build the `COPY` statement
//! 3. capture the timestamp and name the artifact
//! 4. stream the result set into the local artifact
//! 5. upload the artifact
//! 6. delete the local artifact
//!
//! Once the artifact has been reserved it is removed on every exit path. A
//! failed removal is logged and recorded on the outcome but never changes it.

use crate::application::connection_resolver::ConnectionResolver;
use crate::application::local_artifact::LocalArtifact;
use crate::domain::artifact_name::artifact_name;
use crate::domain::entities::{
    BlobTarget, ConnectionParams, ExportOutcome, ExportRequest, ExportStatement, RequestBody,
    StreamStats,
};
use crate::domain::errors::Result;
use crate::domain::export_statement::build_export_statement;
use crate::domain::request_validation::check_identifiers;
use crate::ports::blob_publisher::BlobPublisher;
use crate::ports::export_streamer::ExportStreamer;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Per-process settings the pipeline needs besides its ports.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub container: String,
    pub work_dir: PathBuf,
    pub include_header: bool,
    pub strict_identifiers: bool,
}

pub struct ExportPipeline {
    resolver: Arc<ConnectionResolver>,
    streamer: Arc<dyn ExportStreamer>,
    publisher: Arc<dyn BlobPublisher>,
    settings: PipelineSettings,
}

impl ExportPipeline {
    pub fn new(
        resolver: Arc<ConnectionResolver>,
        streamer: Arc<dyn ExportStreamer>,
        publisher: Arc<dyn BlobPublisher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver,
            streamer,
            publisher,
            settings,
        }
    }

    /// Parses a raw request body and runs it.
    pub fn run_body(&self, body: RequestBody) -> Result<ExportOutcome> {
        let request = ExportRequest::try_from(body)?;
        self.run(&request)
    }

    pub fn run(&self, request: &ExportRequest) -> Result<ExportOutcome> {
        self.run_at(request, Utc::now())
    }

    /// Runs a request with an already captured timestamp.
    pub fn run_at(
        &self,
        request: &ExportRequest,
        captured_at: DateTime<Utc>,
    ) -> Result<ExportOutcome> {
        let start_time = Instant::now();
        info!(
            "Export requested: {}.{}.{}",
            request.database, request.schema, request.table
        );

        if self.settings.strict_identifiers {
            check_identifiers(request)?;
        }

        let params = self.resolver.resolve(request.database)?;
        let statement = build_export_statement(request, self.settings.include_header);
        info!("Export statement: {}", statement.select);

        let name = artifact_name(&request.table, captured_at);
        let target = BlobTarget::new(&self.settings.container, &request.table, &name);

        let artifact =
            LocalArtifact::create(&self.settings.work_dir, &request.table, &name, captured_at)?;
        let result = self.stream_and_publish(params, &statement, &artifact, &target);

        let cleanup_warning = match artifact.remove() {
            Ok(()) => None,
            Err(e) => {
                warn!("{}", e);
                Some(e.to_string())
            }
        };

        let stats = result.map_err(|e| {
            error!(
                "Export of {}.{}.{} failed: {}",
                request.database, request.schema, request.table, e
            );
            e
        })?;

        info!("Export of {} complete", target);
        Ok(ExportOutcome {
            database: request.database.to_string(),
            schema: request.schema.clone(),
            table: request.table.clone(),
            blob: Some(target),
            rows: stats.rows,
            bytes: stats.bytes,
            duration: start_time.elapsed().as_secs_f64(),
            failure: None,
            error: None,
            cleanup_warning,
        })
    }

    fn stream_and_publish(
        &self,
        params: &ConnectionParams,
        statement: &ExportStatement,
        artifact: &LocalArtifact,
        target: &BlobTarget,
    ) -> Result<StreamStats> {
        let stats = self
            .streamer
            .stream_export(params, statement, artifact.path())?;
        self.publisher.publish(artifact.path(), target)?;
        Ok(stats)
    }
}
