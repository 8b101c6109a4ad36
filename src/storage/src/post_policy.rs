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

//! Signed POST policies (V4).
//!
//! A POST policy describes what an HTML-form style upload may contain. The
//! service accepts the upload only if every condition in the policy matches
//! the form fields, the policy has not expired, and the signature over the
//! policy is valid for the service account named in `x-goog-credential`.
//!
//! # Example
//! ```no_run
//! # use gcs_post_upload::post_policy::{PostPolicyV4Builder, PostPolicyV4Condition, PolicyFields};
//! # async fn sample(signer: &gcs_post_upload_auth::signer::Signer) -> anyhow::Result<()> {
//! let policy = PostPolicyV4Builder::for_object("my-bucket", "uploads/${filename}")
//!     .with_expiration(std::time::Duration::from_secs(600))
//!     .with_fields(PolicyFields::new().with_content_type("text/plain"))
//!     .with_condition(PostPolicyV4Condition::starts_with("$key", "uploads/"))
//!     .with_condition(PostPolicyV4Condition::content_length_range(0, 1024 * 1024))
//!     .sign_with(signer)
//!     .await?;
//! println!("POST to {} with fields {:?}", policy.url, policy.fields);
//! # Ok(()) }
//! ```

use crate::error::SigningError;
use base64::{Engine, prelude::BASE64_STANDARD};
use chrono::{DateTime, Utc};
use gcs_post_upload_auth::signer::Signer;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

const ALGORITHM: &str = "GOOG4-RSA-SHA256";
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_EXPIRATION: Duration = Duration::from_secs(10 * 60);
const MAX_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const METADATA_PREFIX: &str = "x-goog-meta-";

/// https://cloud.google.com/storage/docs/request-endpoints#encoding
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// The style of the URL returned with the policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum UrlStyle {
    /// Path style URL: `https://storage.googleapis.com/bucket/`.
    ///
    /// This is the default style.
    #[default]
    PathStyle,

    /// Virtual hosted style URL: `https://bucket.storage.googleapis.com/`.
    VirtualHostedStyle,

    /// Bucket bound hostname URL: `https://hostname/`.
    ///
    /// This style is used when you have a CNAME alias for your bucket.
    BucketBoundHostname(String),
}

/// A condition on the form fields of the upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostPolicyV4Condition(ConditionKind);

#[derive(Clone, Debug, PartialEq, Eq)]
enum ConditionKind {
    StartsWith(String, String),
    ContentLengthRange(u64, u64),
    Matches(String, String),
}

impl PostPolicyV4Condition {
    /// The value of `field` must start with `prefix`.
    ///
    /// Field names are prefixed with `$`, e.g. `$key`. An empty prefix
    /// allows any value for the field.
    pub fn starts_with<F, P>(field: F, prefix: P) -> Self
    where
        F: Into<String>,
        P: Into<String>,
    {
        Self(ConditionKind::StartsWith(field.into(), prefix.into()))
    }

    /// The size of the uploaded object, in bytes, must be in `[min, max]`.
    pub fn content_length_range(min: u64, max: u64) -> Self {
        Self(ConditionKind::ContentLengthRange(min, max))
    }

    /// The value of `field` must be exactly `value`.
    pub fn matches<F, V>(field: F, value: V) -> Self
    where
        F: Into<String>,
        V: Into<String>,
    {
        Self(ConditionKind::Matches(field.into(), value.into()))
    }

    fn validate(&self) -> Result<(), SigningError> {
        match &self.0 {
            ConditionKind::StartsWith(field, _) | ConditionKind::Matches(field, _)
                if field.is_empty() =>
            {
                Err(SigningError::invalid_parameter(
                    "conditions",
                    "the field name of a condition cannot be empty",
                ))
            }
            ConditionKind::ContentLengthRange(min, max) if min > max => {
                Err(SigningError::invalid_parameter(
                    "conditions",
                    format!("invalid content length range [{min}, {max}]"),
                ))
            }
            _ => Ok(()),
        }
    }

    fn to_json(&self) -> Value {
        match &self.0 {
            ConditionKind::StartsWith(field, prefix) => json!(["starts-with", field, prefix]),
            ConditionKind::ContentLengthRange(min, max) => {
                json!(["content-length-range", min, max])
            }
            ConditionKind::Matches(field, value) => json!(["eq", field, value]),
        }
    }
}

/// Form fields included in the policy.
///
/// Each non-empty field is returned in [PostPolicyV4::fields] and pinned with
/// an exact-match condition, so the upload must send it unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyFields {
    acl: String,
    cache_control: String,
    content_disposition: String,
    content_encoding: String,
    content_type: String,
    success_action_redirect: String,
    success_action_status: Option<u16>,
    metadata: BTreeMap<String, String>,
}

impl PolicyFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// The predefined ACL applied to the object, e.g. `private`.
    pub fn with_acl<V: Into<String>>(mut self, v: V) -> Self {
        self.acl = v.into();
        self
    }

    pub fn with_cache_control<V: Into<String>>(mut self, v: V) -> Self {
        self.cache_control = v.into();
        self
    }

    pub fn with_content_disposition<V: Into<String>>(mut self, v: V) -> Self {
        self.content_disposition = v.into();
        self
    }

    pub fn with_content_encoding<V: Into<String>>(mut self, v: V) -> Self {
        self.content_encoding = v.into();
        self
    }

    pub fn with_content_type<V: Into<String>>(mut self, v: V) -> Self {
        self.content_type = v.into();
        self
    }

    /// The URL the browser is redirected to after a successful upload.
    pub fn with_success_action_redirect<V: Into<String>>(mut self, v: V) -> Self {
        self.success_action_redirect = v.into();
        self
    }

    /// The status code returned after a successful upload, used when no
    /// redirect is configured.
    pub fn with_success_action_status(mut self, v: u16) -> Self {
        self.success_action_status = Some(v);
        self
    }

    /// Adds custom metadata. The key must start with `x-goog-meta-`.
    pub fn with_metadata<K, V>(mut self, k: K, v: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata.insert(k.into(), v.into());
        self
    }

    /// Returns the non-empty fields, sorted by name.
    fn entries(self) -> Result<BTreeMap<String, String>, SigningError> {
        if let Some(key) = self
            .metadata
            .keys()
            .find(|k| !k.starts_with(METADATA_PREFIX))
        {
            return Err(SigningError::invalid_parameter(
                "metadata",
                format!("metadata key `{key}` must start with `{METADATA_PREFIX}`"),
            ));
        }
        let named = [
            ("acl", self.acl),
            ("cache-control", self.cache_control),
            ("content-disposition", self.content_disposition),
            ("content-encoding", self.content_encoding),
            ("content-type", self.content_type),
            ("success_action_redirect", self.success_action_redirect),
            (
                "success_action_status",
                self.success_action_status
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            ),
        ];
        let entries = named
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .chain(self.metadata)
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Ok(entries)
    }
}

/// A signed POST policy: where to send the upload and the form fields to
/// send with it.
///
/// The file contents must be sent in a form field named `file`, after all
/// the other fields.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PostPolicyV4 {
    /// The URL for the `POST` request.
    pub url: String,
    /// The form fields, including `key`, `policy` and `x-goog-signature`.
    pub fields: BTreeMap<String, String>,
}

/// Creates [PostPolicyV4] values.
#[derive(Clone, Debug)]
pub struct PostPolicyV4Builder {
    bucket: String,
    key: String,
    expiration: Duration,
    fields: PolicyFields,
    conditions: Vec<PostPolicyV4Condition>,
    endpoint: String,
    url_style: UrlStyle,
    client_email: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl PostPolicyV4Builder {
    /// Creates a builder for uploads to `key` in `bucket`.
    ///
    /// The key may contain `${filename}`, the service replaces it with the
    /// file name sent in the upload.
    pub fn for_object<B, K>(bucket: B, key: K) -> Self
    where
        B: Into<String>,
        K: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            expiration: DEFAULT_EXPIRATION,
            fields: PolicyFields::default(),
            conditions: Vec::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            url_style: UrlStyle::default(),
            client_email: None,
            timestamp: None,
        }
    }

    /// Sets how long the policy is valid. Default is 10 minutes, the maximum
    /// is 7 days.
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_fields(mut self, fields: PolicyFields) -> Self {
        self.fields = fields;
        self
    }

    /// Adds a condition. Conditions appear in the policy in the order they
    /// are added.
    pub fn with_condition(mut self, condition: PostPolicyV4Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the endpoint. Default is "https://storage.googleapis.com".
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_url_style(mut self, url_style: UrlStyle) -> Self {
        self.url_style = url_style;
        self
    }

    /// Sets the client email for the policy.
    /// If not set, the email will be fetched from the signer.
    pub fn with_client_email<S: Into<String>>(mut self, client_email: S) -> Self {
        self.client_email = Some(client_email.into());
        self
    }

    /// Sets the time the policy becomes valid. Default is the current time.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Generates the signed policy using the provided signer.
    pub async fn sign_with(self, signer: &Signer) -> Result<PostPolicyV4, SigningError> {
        let bucket = self.bucket.trim_start_matches("projects/_/buckets/");
        if bucket.is_empty() {
            return Err(SigningError::invalid_parameter(
                "bucket",
                "the bucket name cannot be empty",
            ));
        }
        if self.key.is_empty() {
            return Err(SigningError::invalid_parameter(
                "key",
                "the object key cannot be empty",
            ));
        }
        if self.expiration.is_zero() || self.expiration > MAX_EXPIRATION {
            return Err(SigningError::invalid_parameter(
                "expiration",
                format!(
                    "must be greater than zero and at most 7 days, got {:?}",
                    self.expiration
                ),
            ));
        }
        self.conditions
            .iter()
            .try_for_each(PostPolicyV4Condition::validate)?;
        let mut fields = self.fields.entries()?;
        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| SigningError::invalid_parameter("endpoint", e))?;
        let url = policy_url(&endpoint, bucket, &self.url_style)?;

        let now = self.timestamp.unwrap_or_else(Utc::now);
        let expires_at = chrono::Duration::from_std(self.expiration)
            .map(|d| now + d)
            .map_err(|e| SigningError::invalid_parameter("expiration", e))?;
        let request_timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d");
        let client_email = if let Some(email) = self.client_email {
            email
        } else {
            signer
                .client_email()
                .await
                .map_err(SigningError::signing)?
        };
        let credential = format!("{client_email}/{datestamp}/auto/storage/goog4_request");

        let mut conditions: Vec<Value> = self
            .conditions
            .iter()
            .map(PostPolicyV4Condition::to_json)
            .collect();
        conditions.extend(fields.iter().map(|(k, v)| exact_match(k, v)));
        conditions.extend([
            exact_match("bucket", bucket),
            exact_match("key", &self.key),
            exact_match("x-goog-date", &request_timestamp),
            exact_match("x-goog-credential", &credential),
            exact_match("x-goog-algorithm", ALGORITHM),
        ]);
        let document = PolicyDocument {
            conditions,
            expiration: expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        let document = serde_json::to_string(&document).map_err(SigningError::signing)?;
        let policy = BASE64_STANDARD.encode(escape_non_ascii(&document));

        let signature = signer
            .sign(policy.as_str())
            .await
            .map_err(SigningError::signing)?;

        tracing::debug!(bucket, key = self.key.as_str(), %expires_at, "signed POST policy");
        fields.insert("key".to_string(), self.key);
        fields.insert("policy".to_string(), policy);
        fields.insert("x-goog-algorithm".to_string(), ALGORITHM.to_string());
        fields.insert("x-goog-credential".to_string(), credential);
        fields.insert("x-goog-date".to_string(), request_timestamp);
        fields.insert("x-goog-signature".to_string(), signature);

        Ok(PostPolicyV4 { url, fields })
    }
}

#[derive(serde::Serialize)]
struct PolicyDocument {
    conditions: Vec<Value>,
    expiration: String,
}

fn exact_match(name: &str, value: &str) -> Value {
    let mut condition = Map::new();
    condition.insert(name.to_string(), Value::String(value.to_string()));
    Value::Object(condition)
}

fn policy_url(
    endpoint: &url::Url,
    bucket: &str,
    url_style: &UrlStyle,
) -> Result<String, SigningError> {
    let host = endpoint
        .host_str()
        .ok_or_else(|| SigningError::invalid_parameter("endpoint", "invalid endpoint host"))?;
    let authority = match endpoint.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let scheme = endpoint.scheme();
    let url = match url_style {
        UrlStyle::PathStyle => format!(
            "{scheme}://{authority}/{}/",
            utf8_percent_encode(bucket, PATH_ENCODE_SET)
        ),
        UrlStyle::VirtualHostedStyle => format!("{scheme}://{bucket}.{authority}/"),
        UrlStyle::BucketBoundHostname(hostname) if hostname.is_empty() => {
            return Err(SigningError::invalid_parameter(
                "url_style",
                "the bucket bound hostname cannot be empty",
            ));
        }
        UrlStyle::BucketBoundHostname(hostname) => format!("{scheme}://{hostname}/"),
    };
    Ok(url)
}

// The service computes the signature over a policy where non-ASCII
// characters are `\uXXXX` escapes.
fn escape_non_ascii(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
            continue;
        }
        let mut buffer = [0_u16; 2];
        for unit in c.encode_utf16(&mut buffer) {
            escaped.push_str(&format!("\\u{unit:04x}"));
        }
    }
    escaped
}
