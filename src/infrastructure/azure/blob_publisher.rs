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

//! Infrastructure adapter publishing local artifacts through an `ObjectStore`.
//!
//! The artifact is read from disk in parts and sent as a block upload, so the
//! file is never held in memory. The blob only becomes visible once the final
//! commit succeeds.

use crate::domain::entities::BlobTarget;
use crate::domain::errors::{ExportError, Result, Stage};
use crate::ports::blob_publisher::BlobPublisher;
use log::{info, warn};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::{timeout_at, Instant};

/// Parts allowed in flight before reading more of the file.
const MAX_IN_FLIGHT_PARTS: usize = 4;
const READ_SIZE: usize = 256 * 1024;

/// Concrete implementation of `BlobPublisher` over any `ObjectStore`.
///
/// The pipeline is synchronous, so the publisher owns a small runtime and
/// blocks on each upload.
pub struct ObjectStoreBlobPublisher {
    store: Arc<dyn ObjectStore>,
    container: String,
    upload_timeout: Duration,
    part_size: usize,
    runtime: Runtime,
}

impl ObjectStoreBlobPublisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: String,
        upload_timeout: Duration,
        part_size: usize,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("blob-upload")
            .enable_all()
            .build()
            .map_err(|e| ExportError::ConfigError(format!("Failed to start upload runtime: {}", e)))?;

        Ok(Self {
            store,
            container,
            upload_timeout,
            part_size,
            runtime,
        })
    }

    fn timed_out(&self) -> ExportError {
        ExportError::Timeout {
            stage: Stage::Upload,
            secs: self.upload_timeout.as_secs(),
        }
    }

    async fn upload(&self, local: &Path, path: &ObjectPath, blob: &str, deadline: Instant) -> Result<u64> {
        let file = File::open(local).map_err(|e| ExportError::UploadFailed {
            blob: blob.to_string(),
            reason: format!("cannot open {}: {}", local.display(), e),
        })?;

        let upload = timeout_at(deadline, self.store.put_multipart(path))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| map_store_error(blob, e))?;
        let writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        self.send_file(file, writer, local, blob, deadline).await
    }

    /// Streams `file` through `writer` and commits it. Any failure or an
    /// expired deadline before the commit aborts the upload.
    async fn send_file(
        &self,
        mut file: File,
        mut writer: WriteMultipart,
        local: &Path,
        blob: &str,
        deadline: Instant,
    ) -> Result<u64> {
        let mut buf = vec![0u8; READ_SIZE];
        let mut sent: u64 = 0;
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    abort(writer, blob).await;
                    return Err(ExportError::UploadFailed {
                        blob: blob.to_string(),
                        reason: format!("reading {} failed: {}", local.display(), e),
                    });
                }
            };
            if let Err(e) = self.capacity(&mut writer, MAX_IN_FLIGHT_PARTS, blob, deadline).await {
                abort(writer, blob).await;
                return Err(e);
            }
            writer.write(&buf[..n]);
            sent += n as u64;
        }

        // Drain in-flight parts while the upload can still be aborted.
        if let Err(e) = self.capacity(&mut writer, 0, blob, deadline).await {
            abort(writer, blob).await;
            return Err(e);
        }

        // `finish` owns the writer. A timeout here leaves the final block list
        // uncommitted, so the blob still never appears.
        timeout_at(deadline, writer.finish())
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| map_store_error(blob, e))?;
        Ok(sent)
    }

    async fn capacity(
        &self,
        writer: &mut WriteMultipart,
        max_in_flight: usize,
        blob: &str,
        deadline: Instant,
    ) -> Result<()> {
        match timeout_at(deadline, writer.wait_for_capacity(max_in_flight)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(map_store_error(blob, e)),
            Err(_) => Err(self.timed_out()),
        }
    }
}

async fn abort(writer: WriteMultipart, blob: &str) {
    if let Err(e) = writer.abort().await {
        warn!("Aborting upload of {} failed: {}", blob, e);
    }
}

/// Splits storage errors into credential problems and everything else.
fn map_store_error(blob: &str, e: object_store::Error) -> ExportError {
    match e {
        object_store::Error::Unauthenticated { .. } | object_store::Error::PermissionDenied { .. } => {
            ExportError::AuthFailed(e.to_string())
        }
        _ => ExportError::UploadFailed {
            blob: blob.to_string(),
            reason: e.to_string(),
        },
    }
}

impl BlobPublisher for ObjectStoreBlobPublisher {
    fn publish(&self, local: &Path, target: &BlobTarget) -> Result<()> {
        if target.container != self.container {
            return Err(ExportError::ConfigError(format!(
                "Publisher serves container {}, not {}",
                self.container, target.container
            )));
        }

        let blob = target.to_string();
        let path = ObjectPath::parse(&target.blob_path).map_err(|e| ExportError::UploadFailed {
            blob: blob.clone(),
            reason: e.to_string(),
        })?;

        let start_time = std::time::Instant::now();
        let bytes = self.runtime.block_on(async {
            let deadline = Instant::now() + self.upload_timeout;
            self.upload(local, &path, &blob, deadline).await
        })?;

        info!(
            "Uploaded {} bytes to {} in {:.2}s",
            bytes,
            blob,
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
