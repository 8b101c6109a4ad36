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

use crate::Result;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use tokio::time::Instant;

/// Represents an OAuth2 access token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The type of the token, almost always `"Bearer"`.
    pub token_type: String,

    /// The instant at which the token expires.
    ///
    /// If `None`, the token does not expire.
    pub expires_at: Option<Instant>,
}

impl Token {
    /// Formats the token as the value of an `Authorization:` header.
    pub fn header(&self) -> Result<(http::HeaderName, HeaderValue)> {
        let mut value = HeaderValue::from_str(&format!("{} {}", self.token_type, self.token))
            .map_err(crate::errors::CredentialsError::non_retryable)?;
        value.set_sensitive(true);
        Ok((AUTHORIZATION, value))
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces access tokens to authenticate calls to Google Cloud APIs.
#[async_trait::async_trait]
pub trait TokenSource: std::fmt::Debug + Send + Sync {
    async fn token(&self) -> Result<Token>;
}
