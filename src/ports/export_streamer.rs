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

//! # Export Streamer Port
//!
//! The contract for the "Data Mover": run an export statement against a
//! database and land the bytes in a local file.

use crate::domain::entities::{ConnectionParams, ExportStatement, StreamStats};
use crate::domain::errors::Result;
use std::path::Path;

/// `ExportStreamer` copies a query result to disk without buffering it.
pub trait ExportStreamer: Send + Sync {
    /// Streams `statement` into `dest`.
    ///
    /// On return the file is flushed and closed and the connection is gone.
    /// On failure a partial file may be left behind; removing it is the
    /// caller's job.
    fn stream_export(
        &self,
        params: &ConnectionParams,
        statement: &ExportStatement,
        dest: &Path,
    ) -> Result<StreamStats>;
}
