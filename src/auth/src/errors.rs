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

//! Errors created while loading credentials or fetching tokens.

use http::StatusCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;

/// Represents an error loading credentials or fetching an access token.
#[derive(Clone, Debug)]
pub struct CredentialsError {
    /// If `true`, the operation that resulted in this error might succeed
    /// upon retry.
    is_retryable: bool,

    source: CredentialsErrorImpl,
}

#[derive(Clone, Debug)]
enum CredentialsErrorImpl {
    SimpleMessage(String),
    Source(Arc<dyn Error + Send + Sync>),
}

impl CredentialsError {
    /// Creates a new `CredentialsError` wrapping `source`.
    pub fn new<T: Error + Send + Sync + 'static>(is_retryable: bool, source: T) -> Self {
        CredentialsError {
            is_retryable,
            source: CredentialsErrorImpl::Source(Arc::new(source)),
        }
    }

    /// Creates a new `CredentialsError` from a message.
    pub fn from_msg<T: Into<String>>(is_retryable: bool, message: T) -> Self {
        CredentialsError {
            is_retryable,
            source: CredentialsErrorImpl::SimpleMessage(message.into()),
        }
    }

    /// Returns `true` if the error is retryable; otherwise returns `false`.
    pub fn is_retryable(&self) -> bool {
        self.is_retryable
    }

    pub(crate) fn retryable<T: Error + Send + Sync + 'static>(source: T) -> Self {
        CredentialsError::new(true, source)
    }

    pub(crate) fn non_retryable<T: Error + Send + Sync + 'static>(source: T) -> Self {
        CredentialsError::new(false, source)
    }

    pub(crate) fn non_retryable_from_str<T: Into<String>>(message: T) -> Self {
        CredentialsError::from_msg(false, message)
    }
}

impl Display for CredentialsErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match &self {
            CredentialsErrorImpl::SimpleMessage(message) => write!(f, "{message}"),
            CredentialsErrorImpl::Source(source) => write!(f, "{source}"),
        }
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            CredentialsErrorImpl::SimpleMessage(_) => None,
            CredentialsErrorImpl::Source(source) => Some(source.as_ref()),
        }
    }
}

const RETRYABLE_MSG: &str = "but future attempts may succeed";
const NON_RETRYABLE_MSG: &str = "and future attempts will not succeed";

impl Display for CredentialsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let msg = if self.is_retryable {
            RETRYABLE_MSG
        } else {
            NON_RETRYABLE_MSG
        };
        write!(f, "cannot load credentials, {msg}, source: {}", self.source)
    }
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    // Server errors and throttling say nothing about the request itself.
    c.is_server_error()
        || matches!(c, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS)
}
