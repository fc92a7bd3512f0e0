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

//! # Runtime Context
//!
//! Sets up the process-wide resources an export run needs:
//! the `rayon` worker pool sized from the CPU settings, the connection
//! resolver, and the Postgres and blob storage adapters wired into one
//! shared `ExportPipeline`.

use crate::application::connection_resolver::ConnectionResolver;
use crate::application::pipeline::{ExportPipeline, PipelineSettings};
use crate::config::AppConfig;
use crate::domain::errors::Result;
use crate::infrastructure::azure::blob_publisher::ObjectStoreBlobPublisher;
use crate::infrastructure::azure::store_builder::build_blob_store;
use crate::infrastructure::postgres::copy_streamer::PostgresCopyStreamer;
use log::info;
use std::sync::Arc;

/// `RuntimeContext` holds shared resources that exist for the entire life of the app.
pub struct RuntimeContext {
    pub pipeline: Arc<ExportPipeline>,
    /// The number of exports that can run at once in a batch.
    pub num_threads: usize,
}

impl RuntimeContext {
    /// Initializes the global thread pool and the export pipeline.
    ///
    /// Without an explicit `parallel`, uses `cpu_percent` (default 50%) of the
    /// available cores.
    pub fn init(config: &AppConfig) -> Result<Self> {
        let num_threads = worker_count(
            config.export.parallel,
            config.export.cpu_percent,
            num_cpus::get(),
        );

        info!(
            "Initializing worker pool with {} threads (Target CPU: {}%)",
            num_threads,
            config.export.cpu_percent.unwrap_or(50)
        );

        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .unwrap_or_else(|e| {
                info!("Global thread pool already initialized: {}", e);
            });

        let resolver = ConnectionResolver::from_config(config)?;

        let streamer = PostgresCopyStreamer::new(
            config.export.connect_timeout(),
            config.export.statement_timeout(),
            config.export.include_header(),
        );

        let store = build_blob_store(&config.storage, config.export.upload_timeout())?;
        let publisher = ObjectStoreBlobPublisher::new(
            store,
            config.storage.container.clone(),
            config.export.upload_timeout(),
            config.export.upload_part_size(),
        )?;

        let pipeline = ExportPipeline::new(
            Arc::new(resolver),
            Arc::new(streamer),
            Arc::new(publisher),
            PipelineSettings {
                container: config.storage.container.clone(),
                work_dir: config.export.work_dir(),
                include_header: config.export.include_header(),
                strict_identifiers: config.export.strict_identifiers(),
            },
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            num_threads,
        })
    }
}

/// Always at least one thread.
fn worker_count(parallel: Option<usize>, cpu_percent: Option<u8>, total_cpus: usize) -> usize {
    let cpu_percent = cpu_percent.unwrap_or(50);
    let n = parallel
        .unwrap_or_else(|| (total_cpus as f64 * (cpu_percent as f64 / 100.0)).ceil() as usize);
    std::cmp::max(1, n)
}
