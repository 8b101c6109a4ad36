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

//! Policies scoped to the folder of a single user job.

use crate::error::SigningError;
use crate::post_policy::{PolicyFields, PostPolicyV4, PostPolicyV4Builder, PostPolicyV4Condition};
use gcs_post_upload_auth::signer::Signer;
use std::time::Duration;

/// Generates a policy that only allows gzip-encoded uploads into
/// `{username}/{job_id}/`.
///
/// Returns the signed policy and the prefix. The object key in the policy is
/// `{username}/{job_id}/${filename}`, the service substitutes the file name
/// of the upload.
pub async fn generate_upload_policy(
    signer: &Signer,
    bucket: &str,
    username: &str,
    job_id: &str,
    expiration: Duration,
) -> Result<(PostPolicyV4, String), SigningError> {
    let (builder, prefix) = upload_policy_builder(bucket, username, job_id)?;
    let policy = builder.with_expiration(expiration).sign_with(signer).await?;
    tracing::info!(bucket, prefix = prefix.as_str(), ?expiration, "generated upload policy");
    Ok((policy, prefix))
}

/// Returns a builder for the policy created by [generate_upload_policy], and
/// the prefix.
///
/// Use this function to change other options, such as the endpoint, before
/// signing.
pub fn upload_policy_builder(
    bucket: &str,
    username: &str,
    job_id: &str,
) -> Result<(PostPolicyV4Builder, String), SigningError> {
    check_segment("username", username)?;
    check_segment("job_id", job_id)?;
    let prefix = format!("{username}/{job_id}/");
    let builder = PostPolicyV4Builder::for_object(bucket, format!("{prefix}${{filename}}"))
        .with_fields(PolicyFields::new().with_content_encoding("gzip"))
        .with_condition(PostPolicyV4Condition::starts_with("$key", prefix.as_str()))
        .with_condition(PostPolicyV4Condition::starts_with("$Content-Encoding", ""));
    Ok((builder, prefix))
}

// Each value must name exactly one folder.
fn check_segment(name: &str, value: &str) -> Result<(), SigningError> {
    if value.is_empty() {
        return Err(SigningError::invalid_parameter(name, "cannot be empty"));
    }
    if value.contains('/') {
        return Err(SigningError::invalid_parameter(
            name,
            format!("`{value}` cannot contain `/`"),
        ));
    }
    Ok(())
}
