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

//! Credentials and signers for Cloud Storage POST policies.
//!
//! A signed POST policy lets a third party upload objects into a bucket
//! without ever holding the service account credentials that authorized the
//! upload. Creating the policy requires an RSA-SHA256 signature from a
//! service account. This crate finds a suitable service account using
//! [Application Default Credentials] and returns a [signer::Signer] for it:
//!
//! * a service account key file signs locally,
//! * on Google Cloud compute the default service account signs via the IAM
//!   Credentials [signBlob] API, using tokens from the metadata server.
//!
//! ```no_run
//! # async fn sample() -> anyhow::Result<()> {
//! let signer = gcs_post_upload_auth::credentials::Builder::default().build_signer()?;
//! let email = signer.client_email().await?;
//! let signature = signer.sign(b"content to sign").await?;
//! println!("{email} signed: {signature}");
//! # Ok(()) }
//! ```
//!
//! [Application Default Credentials]: https://google.aip.dev/auth/4110
//! [signBlob]: https://cloud.google.com/iam/docs/reference/credentials/rest/v1/projects.serviceAccounts/signBlob

pub mod errors;

/// Find the service account used to sign POST policies.
pub mod credentials;

/// Sign content with a service account.
pub mod signer;

/// Access tokens used to call the IAM Credentials API.
pub mod token;

pub(crate) mod constants;
pub(crate) mod mds;

/// A `Result` alias where the `Err` case is
/// `gcs_post_upload_auth::errors::CredentialsError`.
pub type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
