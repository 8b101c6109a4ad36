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

//! Custom errors for signing policies and uploading objects.

use std::path::PathBuf;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Signing a POST policy can fail for two reasons: the signer failed, or the
/// policy options are invalid.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct SigningError(SigningErrorKind);

impl SigningError {
    pub fn is_signing(&self) -> bool {
        matches!(self.0, SigningErrorKind::Signing(_))
    }

    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self.0, SigningErrorKind::InvalidParameter(_, _))
    }

    /// A problem to sign the policy.
    pub(crate) fn signing<T>(source: T) -> SigningError
    where
        T: Into<BoxError>,
    {
        SigningError(SigningErrorKind::Signing(source.into()))
    }

    /// A problem to sign the policy due to invalid input.
    pub(crate) fn invalid_parameter<S: Into<String>, T>(field: S, source: T) -> SigningError
    where
        T: Into<BoxError>,
    {
        SigningError(SigningErrorKind::InvalidParameter(
            field.into(),
            source.into(),
        ))
    }
}

#[derive(thiserror::Error, Debug)]
enum SigningErrorKind {
    /// The signing operation failed.
    #[error("signing failed: {0}")]
    Signing(#[source] BoxError),

    /// An invalid input was provided to generate a signed policy.
    #[error("invalid `{0}` parameter: {1}")]
    InvalidParameter(String, #[source] BoxError),
}

/// Errors creating the compressed payload.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum CompressError {
    /// The gzip encoder failed.
    #[error("cannot gzip content: {0}")]
    Compress(#[source] std::io::Error),

    /// The compressed content could not be written to the destination file.
    #[error("cannot write compressed content to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors uploading an object with a POST policy.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum UploadError {
    /// The local file could not be read.
    #[error("cannot read local file {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No file name was given and the local path does not end in one.
    #[error("cannot determine the file name to upload {}", .path.display())]
    MissingFileName { path: PathBuf },

    /// The policy cannot be used for an upload, for example, it has no `key`
    /// field.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The request could not be built or sent, or the response could not be
    /// received.
    #[error("upload request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The service rejected the upload.
    #[error("unexpected status {status} uploading object: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}
