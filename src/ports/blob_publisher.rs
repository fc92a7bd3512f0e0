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

//! # Blob Publisher Port
//!
//! Persists a finished local artifact in object storage.

use crate::domain::entities::BlobTarget;
use crate::domain::errors::Result;
use std::path::Path;

pub trait BlobPublisher: Send + Sync {
    /// Uploads the whole file at `local` as one blob at `target`.
    ///
    /// Either the blob is committed in full or an error is returned and no
    /// blob should be assumed to exist.
    fn publish(&self, local: &Path, target: &BlobTarget) -> Result<()>;
}
