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

//! Upload files using a signed POST policy.
//!
//! The upload is a `multipart/form-data` request. It contains every field in
//! the policy, followed by the file contents in a field named `file`.

use crate::error::UploadError;
use crate::post_policy::PostPolicyV4;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use std::path::Path;

const FILENAME_PLACEHOLDER: &str = "${filename}";

/// The result of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct UploadedObject {
    /// The name of the object, with `${filename}` substituted.
    pub object_key: String,
    /// The HTTP status returned by the service.
    pub status: StatusCode,
}

/// Uploads files using [PostPolicyV4] values.
#[derive(Clone, Debug, Default)]
pub struct PolicyUploader {
    client: reqwest::Client,
}

impl PolicyUploader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds the `POST` request to upload `local_file`.
    ///
    /// The `file` part uses `file_name` as its file name, or the last
    /// component of `local_file` if `None`.
    pub async fn build_request<P: AsRef<Path>>(
        &self,
        policy: &PostPolicyV4,
        local_file: P,
        file_name: Option<&str>,
    ) -> Result<reqwest::Request, UploadError> {
        let local_file = local_file.as_ref();
        let file_name = resolve_file_name(local_file, file_name)?;
        let contents =
            tokio::fs::read(local_file)
                .await
                .map_err(|source| UploadError::ReadFile {
                    path: local_file.to_path_buf(),
                    source,
                })?;

        let form = policy
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        let file = Part::bytes(contents)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(UploadError::Http)?;
        let form = form.part("file", file);

        self.client
            .post(&policy.url)
            .multipart(form)
            .build()
            .map_err(UploadError::Http)
    }

    /// Uploads `local_file` and returns the name of the created object.
    ///
    /// The service responds with `204 No Content` unless the policy sets
    /// `success_action_status`. Any 200, 201 or 204 response is a success.
    pub async fn upload<P: AsRef<Path>>(
        &self,
        policy: &PostPolicyV4,
        local_file: P,
        file_name: Option<&str>,
    ) -> Result<UploadedObject, UploadError> {
        let local_file = local_file.as_ref();
        let file_name = resolve_file_name(local_file, file_name)?;
        let key = policy
            .fields
            .get("key")
            .ok_or_else(|| UploadError::InvalidPolicy("missing `key` field".to_string()))?;
        let object_key = key.replace(FILENAME_PLACEHOLDER, &file_name);

        let request = self
            .build_request(policy, local_file, Some(&file_name))
            .await?;
        tracing::debug!(
            url = policy.url.as_str(),
            object_key = object_key.as_str(),
            "uploading object"
        );
        let response = self
            .client
            .execute(request)
            .await
            .map_err(UploadError::Http)?;

        let status = response.status();
        if !matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
        ) {
            let body = response.text().await.map_err(UploadError::Http)?;
            return Err(UploadError::UnexpectedStatus { status, body });
        }
        tracing::info!(object_key = object_key.as_str(), %status, "upload succeeded");
        Ok(UploadedObject { object_key, status })
    }
}

/// Uploads `local_file` as `object_name` using a default client.
///
/// `object_name` replaces `${filename}` in the key of the policy.
pub async fn upload_file_with_policy<P: AsRef<Path>>(
    policy: &PostPolicyV4,
    local_file: P,
    object_name: &str,
) -> Result<UploadedObject, UploadError> {
    PolicyUploader::default()
        .upload(policy, local_file, Some(object_name))
        .await
}

fn resolve_file_name(local_file: &Path, file_name: Option<&str>) -> Result<String, UploadError> {
    let name = match file_name {
        Some(name) => Some(name.to_string()),
        None => local_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };
    name.filter(|name| !name.is_empty())
        .ok_or_else(|| UploadError::MissingFileName {
            path: local_file.to_path_buf(),
        })
}
