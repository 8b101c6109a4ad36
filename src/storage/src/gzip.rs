// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Prepare gzip-encoded payloads.

use crate::error::CompressError;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::Path;

/// Compresses `content` with gzip, using the default compression level.
pub fn gzip_bytes(content: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).map_err(CompressError::Compress)?;
    encoder.finish().map_err(CompressError::Compress)
}

/// Compresses `content` with gzip and writes the result to `path`.
///
/// Any existing file at `path` is replaced.
pub async fn create_gzipped_file<P: AsRef<Path>>(
    path: P,
    content: &[u8],
) -> Result<(), CompressError> {
    let path = path.as_ref();
    let compressed = gzip_bytes(content)?;
    tokio::fs::write(path, &compressed)
        .await
        .map_err(|source| CompressError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(
        ?path,
        size = content.len(),
        compressed_size = compressed.len(),
        "created gzipped file"
    );
    Ok(())
}
