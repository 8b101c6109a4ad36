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

//! Find the credentials used to sign POST policies.
//!
//! The [Builder] follows the [Application Default Credentials] (ADC)
//! conventions, with the restriction that the credentials must be able to
//! sign content. In order, it tries:
//!
//! 1. A service account key provided to the builder.
//! 2. The file named by the `GOOGLE_APPLICATION_CREDENTIALS` environment
//!    variable.
//! 3. The well-known file created by `gcloud auth application-default login`.
//! 4. The default service account of the metadata server, signing via the
//!    IAM `signBlob` API.
//!
//! With [Builder::with_signing_account] the metadata server credentials can
//! sign on behalf of a different service account, as long as the default
//! service account has the `roles/iam.serviceAccountTokenCreator` role on it.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

pub mod service_account;

use crate::Result;
use crate::constants::{
    GOOGLE_APPLICATION_CREDENTIALS, UNIX_HOME, USER_CREDENTIAL_FILE, WINDOWS_APPDATA,
};
use crate::errors::CredentialsError;
use crate::mds::MdsClient;
use crate::signer::Signer;
use crate::signer::iam::IamSigner;
use crate::signer::mds::MdsSigner;
use crate::signer::service_account::ServiceAccountSigner;
use service_account::ServiceAccountKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Creates a [Signer] from the environment.
///
/// # Example
/// ```no_run
/// # use gcs_post_upload_auth::credentials::Builder;
/// # async fn sample() -> anyhow::Result<()> {
/// let signer = Builder::default()
///     .with_key_file("/path/to/service-account.json")
///     .build_signer()?;
/// let signature = signer.sign("hello world").await?;
/// # Ok(()) }
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    key_file: Option<PathBuf>,
    service_account_key: Option<ServiceAccountKey>,
    signing_account: Option<String>,
}

impl Builder {
    /// Loads the service account key from `path`, bypassing the environment.
    pub fn with_key_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Uses `key` to sign, bypassing the environment.
    pub fn with_service_account_key(mut self, key: ServiceAccountKey) -> Self {
        self.service_account_key = Some(key);
        self
    }

    /// Signs as `client_email` when using the metadata server.
    ///
    /// By default the metadata server credentials sign as the default service
    /// account. Key files always sign as the account in the file.
    pub fn with_signing_account<S: Into<String>>(mut self, client_email: S) -> Self {
        self.signing_account = Some(client_email.into());
        self
    }

    /// Returns a [Signer] for the first credentials found.
    ///
    /// This does not make any network requests. When running on the metadata
    /// server, the service account email is fetched on first use.
    pub fn build_signer(self) -> Result<Signer> {
        if let Some(key) = self.service_account_key {
            return Ok(Signer::from(ServiceAccountSigner::new(key)));
        }
        if let Some(path) = self.key_file {
            tracing::debug!(?path, "loading credentials from key file");
            let contents = std::fs::read(&path).map_err(|e| {
                CredentialsError::from_msg(
                    false,
                    format!("failed to read credentials file {}: {e}", path.display()),
                )
            })?;
            return signer_from_json(&contents);
        }
        match adc_path() {
            Some(AdcPath::FromEnv(path)) => {
                tracing::debug!(%path, "loading credentials from {GOOGLE_APPLICATION_CREDENTIALS}");
                let contents = std::fs::read(&path).map_err(|e| {
                    CredentialsError::from_msg(
                        false,
                        format!(
                            "Failed to load Application Default Credentials (ADC) from {path}. Check that the `{GOOGLE_APPLICATION_CREDENTIALS}` environment variable points to a valid file. {e}"
                        ),
                    )
                })?;
                signer_from_json(&contents)
            }
            Some(AdcPath::WellKnown(path)) => match std::fs::read(&path) {
                Ok(contents) => {
                    tracing::debug!(?path, "loading credentials from the well-known file");
                    signer_from_json(&contents)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Ok(mds_signer(self.signing_account))
                }
                Err(e) => Err(CredentialsError::from_msg(
                    false,
                    format!(
                        "Failed to load Application Default Credentials (ADC) from {}. {e}",
                        path.display()
                    ),
                )),
            },
            None => Ok(mds_signer(self.signing_account)),
        }
    }
}

fn mds_signer(signing_account: Option<String>) -> Signer {
    let client = MdsClient::from_env();
    tracing::debug!(
        endpoint = client.endpoint(),
        signing_account = signing_account.as_deref(),
        "no key file found, using the metadata server"
    );
    match signing_account {
        Some(email) => Signer::from(IamSigner::new(email, Arc::new(client))),
        None => Signer::from(MdsSigner::new(client)),
    }
}

fn signer_from_json(contents: &[u8]) -> Result<Signer> {
    match credentials_type(contents)?.as_str() {
        "service_account" => {
            let key = ServiceAccountKey::from_json(contents)?;
            Ok(Signer::from(ServiceAccountSigner::new(key)))
        }
        other => Err(CredentialsError::from_msg(
            false,
            format!(
                "credentials of type `{other}` cannot sign content, use a service account key file or run with an attached service account"
            ),
        )),
    }
}

fn credentials_type(contents: &[u8]) -> Result<String> {
    let json: serde_json::Value = serde_json::from_slice(contents).map_err(|e| {
        CredentialsError::from_msg(false, format!("Failed to parse credentials JSON: {e}"))
    })?;
    json.get("type")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CredentialsError::from_msg(
                false,
                "Failed to parse Credentials JSON. No `type` field found or `type` field is not a string.",
            )
        })
}

enum AdcPath {
    FromEnv(String),
    WellKnown(PathBuf),
}

fn adc_path() -> Option<AdcPath> {
    if let Some(path) = std::env::var(GOOGLE_APPLICATION_CREDENTIALS)
        .ok()
        .filter(|p| !p.is_empty())
    {
        return Some(AdcPath::FromEnv(path));
    }
    adc_well_known_path().map(AdcPath::WellKnown)
}

/// The path of the file created by `gcloud auth application-default login`.
fn adc_well_known_path() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var(WINDOWS_APPDATA)
            .ok()
            .map(|root| Path::new(&root).join("gcloud").join(USER_CREDENTIAL_FILE))
    } else {
        std::env::var(UNIX_HOME).ok().map(|root| {
            Path::new(&root)
                .join(".config")
                .join("gcloud")
                .join(USER_CREDENTIAL_FILE)
        })
    }
}
