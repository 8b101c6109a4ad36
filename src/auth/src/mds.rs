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

//! A minimal client for the Google Compute metadata server.

use crate::Result;
use crate::constants::{
    GCE_METADATA_HOST, MDS_DEFAULT_URI, METADATA_FLAVOR, METADATA_FLAVOR_VALUE, METADATA_ROOT,
};
use crate::errors::{self, CredentialsError};
use crate::token::{Token, TokenSource};
use http::HeaderValue;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug, serde::Deserialize)]
struct MdsTokenResponse {
    access_token: String,
    expires_in: Option<u64>,
    token_type: String,
}

#[derive(Clone, Debug)]
pub(crate) struct MdsClient {
    endpoint: String,
    client: Client,
}

impl MdsClient {
    pub(crate) fn new<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }

    /// Uses `GCE_METADATA_HOST` when set and not empty, the well-known
    /// metadata root otherwise.
    pub(crate) fn from_env() -> Self {
        let endpoint = std::env::var(GCE_METADATA_HOST)
            .ok()
            .filter(|host| !host.is_empty())
            .map(|host| format!("http://{host}"))
            .unwrap_or_else(|| METADATA_ROOT.to_string());
        Self::new(endpoint)
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the email of the default service account.
    pub(crate) async fn email(&self) -> Result<String> {
        let response = self.get("/email").await?;
        let email = response
            .text()
            .await
            .map_err(CredentialsError::retryable)?;
        let email = email.trim();
        if email.is_empty() {
            return Err(CredentialsError::non_retryable_from_str(
                "the metadata server returned an empty service account email",
            ));
        }
        Ok(email.to_string())
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{MDS_DEFAULT_URI}{path}", self.endpoint);
        tracing::debug!(%url, "querying the metadata server");
        let response = self
            .client
            .get(url)
            .header(
                METADATA_FLAVOR,
                HeaderValue::from_static(METADATA_FLAVOR_VALUE),
            )
            .send()
            .await
            .map_err(CredentialsError::retryable)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| CredentialsError::new(errors::is_retryable(status), e))?;
            return Err(CredentialsError::from_msg(
                errors::is_retryable(status),
                format!("metadata server request for `{path}` failed with {status}: {body}"),
            ));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl TokenSource for MdsClient {
    async fn token(&self) -> Result<Token> {
        let response = self.get("/token").await?;
        let response = response.json::<MdsTokenResponse>().await.map_err(|e| {
            let retryable = !e.is_decode();
            CredentialsError::new(retryable, e)
        })?;
        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: response
                .expires_in
                .map(|d| Instant::now() + Duration::from_secs(d)),
        })
    }
}
