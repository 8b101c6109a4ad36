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

//! Scoped uploads to [Google Cloud Storage] using signed POST policies.
//!
//! A [signed POST policy] is a time-limited credential that authorizes an
//! HTML-form style upload, restricted by a set of conditions such as the
//! prefix of the object name. Whoever holds the policy can upload matching
//! objects until the policy expires, without holding any service account
//! credentials.
//!
//! This crate contains:
//!
//! * [PostPolicyV4Builder][post_policy::PostPolicyV4Builder] to create and
//!   sign V4 POST policies,
//! * [generate_upload_policy][upload_policy::generate_upload_policy] to create
//!   a policy restricted to a `{username}/{job_id}/` folder,
//! * [create_gzipped_file][gzip::create_gzipped_file] to prepare a payload,
//! * [PolicyUploader][upload::PolicyUploader] to upload a file using a policy.
//!
//! ```no_run
//! # async fn sample() -> anyhow::Result<()> {
//! use gcs_post_upload::upload_policy::generate_upload_policy;
//! use gcs_post_upload::upload::upload_file_with_policy;
//! use gcs_post_upload_auth::credentials::Builder;
//! use std::time::Duration;
//!
//! let signer = Builder::default().build_signer()?;
//! let (policy, prefix) = generate_upload_policy(
//!     &signer, "my-bucket", "alice", "job-1", Duration::from_secs(15 * 60)).await?;
//! println!("uploads restricted to {prefix}");
//! gcs_post_upload::gzip::create_gzipped_file("/tmp/test.gz", b"Hello, World!").await?;
//! let object = upload_file_with_policy(&policy, "/tmp/test.gz", "test.gz").await?;
//! println!("uploaded {}", object.object_key);
//! # Ok(()) }
//! ```
//!
//! [Google Cloud Storage]: https://cloud.google.com/storage
//! [signed POST policy]: https://cloud.google.com/storage/docs/xml-api/post-object-forms

pub mod error;
pub mod gzip;
pub mod post_policy;
pub mod upload;
pub mod upload_policy;

pub use post_policy::{PostPolicyV4, PostPolicyV4Builder};
