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

use crate::constants::IAM_CREDENTIALS_ENDPOINT;
use crate::errors;
use crate::signer::{Result, SigningError, SigningProvider};
use crate::token::TokenSource;
use base64::{Engine, prelude::BASE64_STANDARD};
use gax::backoff_policy::{BackoffPolicy, BackoffPolicyArg};
use gax::error::{CredentialsError as GaxCredentialsError, Error as GaxError};
use gax::exponential_backoff::ExponentialBackoffBuilder;
use gax::retry_loop_internal::retry_loop;
use gax::retry_policy::{RetryPolicy, RetryPolicyArg, RetryPolicyExt};
use gax::retry_result::RetryResult;
use gax::retry_throttler::{AdaptiveThrottler, RetryThrottlerArg, SharedRetryThrottler};
use gax::throttle_result::ThrottleResult;
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

// Implements Signer using the IAM signBlob API, authenticating with tokens
// from a `TokenSource`.
#[derive(Debug)]
pub(crate) struct IamSigner {
    client_email: String,
    tokens: Arc<dyn TokenSource>,
    sign_blob: SignBlobClient,
}

impl IamSigner {
    pub(crate) fn new(client_email: String, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client_email,
            tokens,
            sign_blob: SignBlobClient::new(),
        }
    }
}

#[async_trait::async_trait]
impl SigningProvider for IamSigner {
    async fn client_email(&self) -> Result<String> {
        Ok(self.client_email.clone())
    }

    async fn sign(&self, content: &[u8]) -> Result<String> {
        self.sign_blob
            .sign(&self.client_email, self.tokens.as_ref(), content)
            .await
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct SignBlobRequest {
    payload: String,
}

#[derive(Debug, serde::Deserialize)]
struct SignBlobResponse {
    #[serde(rename = "signedBlob")]
    signed_blob: String,
}

const ATTEMPT_LIMIT: u32 = 3;
const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAXIMUM_DELAY: Duration = Duration::from_secs(10);

/// Calls `signBlob`, shared by all the signers backed by the IAM API.
#[derive(Clone, Debug)]
pub(crate) struct SignBlobClient {
    pub(crate) endpoint: String,
    pub(crate) attempt_limit: u32,
    pub(crate) backoff_policy: Arc<dyn BackoffPolicy>,
    pub(crate) retry_throttler: SharedRetryThrottler,
    client: Client,
}

impl SignBlobClient {
    pub(crate) fn new() -> Self {
        let retry_throttler: RetryThrottlerArg = AdaptiveThrottler::default().into();
        Self {
            endpoint: IAM_CREDENTIALS_ENDPOINT.to_string(),
            attempt_limit: ATTEMPT_LIMIT,
            backoff_policy: backoff_policy(INITIAL_DELAY, MAXIMUM_DELAY),
            retry_throttler: retry_throttler.into(),
            client: Client::new(),
        }
    }

    pub(crate) async fn sign(
        &self,
        client_email: &str,
        tokens: &dyn TokenSource,
        content: &[u8],
    ) -> Result<String> {
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{client_email}:signBlob",
            self.endpoint
        );
        let body = SignBlobRequest {
            payload: BASE64_STANDARD.encode(content),
        };

        let sleep = async |d| tokio::time::sleep(d).await;
        let retry_policy: RetryPolicyArg =
            SignBlobRetryPolicy.with_attempt_limit(self.attempt_limit).into();
        let client = &self.client;
        let response = retry_loop(
            async move |_| sign_blob_call(client, &url, tokens, &body).await,
            sleep,
            true, // signBlob is idempotent
            self.retry_throttler.clone(),
            retry_policy.into(),
            self.backoff_policy.clone(),
        )
        .await
        .map_err(SigningError::transport)?;

        let response = response
            .json::<SignBlobResponse>()
            .await
            .map_err(SigningError::parsing)?;
        let signature = BASE64_STANDARD
            .decode(response.signed_blob)
            .map_err(SigningError::parsing)?;

        Ok(hex::encode(signature))
    }
}

/// Exponential backoff doubling from `initial_delay` up to `maximum_delay`.
pub(crate) fn backoff_policy(
    initial_delay: Duration,
    maximum_delay: Duration,
) -> Arc<dyn BackoffPolicy> {
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_delay(initial_delay)
        .with_maximum_delay(maximum_delay)
        .with_scaling(2.0)
        .clamp();
    let backoff: BackoffPolicyArg = backoff.into();
    backoff.into()
}

async fn sign_blob_call(
    client: &Client,
    url: &str,
    tokens: &dyn TokenSource,
    body: &SignBlobRequest,
) -> gax::Result<reqwest::Response> {
    let token = tokens
        .token()
        .await
        .map_err(|e| GaxError::authentication(GaxCredentialsError::new(e.is_retryable(), e)))?;
    let (name, value) = token
        .header()
        .map_err(|e| GaxError::authentication(GaxCredentialsError::new(false, e)))?;

    let response = client
        .post(url)
        .header(name, value)
        .json(body)
        .send()
        .await
        .map_err(|e| GaxError::transport(HeaderMap::new(), e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let payload = response
        .bytes()
        .await
        .map_err(|e| GaxError::transport(headers.clone(), e))?;
    Err(GaxError::http(status.as_u16(), headers, payload))
}

/// Retries transport errors, retryable token errors, and HTTP 408, 429 and
/// 5xx responses.
#[derive(Clone, Debug)]
struct SignBlobRetryPolicy;

impl RetryPolicy for SignBlobRetryPolicy {
    fn on_error(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
        idempotent: bool,
        error: GaxError,
    ) -> RetryResult {
        if idempotent && is_transient(&error) {
            RetryResult::Continue(error)
        } else {
            RetryResult::Permanent(error)
        }
    }

    fn on_throttle(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
        error: GaxError,
    ) -> ThrottleResult {
        ThrottleResult::Continue(error)
    }

    fn remaining_time(
        &self,
        _loop_start: std::time::Instant,
        _attempt_count: u32,
    ) -> Option<Duration> {
        None
    }
}

fn is_transient(error: &GaxError) -> bool {
    if error.is_authentication() {
        return error
            .source()
            .and_then(|e| e.downcast_ref::<GaxCredentialsError>())
            .is_some_and(GaxCredentialsError::is_retryable);
    }
    match error.http_status_code() {
        Some(code) => StatusCode::from_u16(code).is_ok_and(errors::is_retryable),
        None => error.is_transport(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::CredentialsError;
    use crate::signer::Signer;
    use crate::token::tests::{MockTokenSource, test_token};
    use gax::retry_throttler::CircuitBreaker;
    use httptest::cycle;
    use httptest::matchers::{all_of, contains, eq, json_decoded, request};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    pub(crate) const SIGN_BLOB_PATH: &str =
        "/v1/projects/-/serviceAccounts/test@example.com:signBlob";

    pub(crate) fn test_sign_blob_client(server: &Server) -> SignBlobClient {
        let endpoint = server.url("").to_string().trim_end_matches('/').to_string();
        test_sign_blob_client_for(endpoint)
    }

    fn test_sign_blob_client_for(endpoint: String) -> SignBlobClient {
        let mut client = SignBlobClient::new();
        client.endpoint = endpoint;
        client.backoff_policy =
            backoff_policy(Duration::from_millis(1), Duration::from_millis(2));
        // Never throttles the few retries in these tests.
        let throttler: RetryThrottlerArg = CircuitBreaker::default().into();
        client.retry_throttler = throttler.into();
        client
    }

    fn test_signer(server: &Server, tokens: MockTokenSource) -> IamSigner {
        let mut signer = IamSigner::new("test@example.com".to_string(), Arc::new(tokens));
        signer.sign_blob = test_sign_blob_client(server);
        signer
    }

    #[tokio::test]
    async fn iam_sign() -> TestResult {
        let server = Server::run();
        let payload = BASE64_STANDARD.encode("test");
        let signed_blob = BASE64_STANDARD.encode("signed_blob");
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", SIGN_BLOB_PATH),
                request::headers(contains(("authorization", "Bearer test-token"))),
                request::body(json_decoded(eq(json!({
                    "payload": payload,
                }))))
            ])
            .respond_with(json_encoded(json!({
                "signedBlob": signed_blob,
            }))),
        );

        let mut tokens = MockTokenSource::new();
        tokens.expect_token().return_once(|| Ok(test_token()));
        let signer = Signer::from(test_signer(&server, tokens));
        let signature = signer.sign(b"test").await?;
        assert_eq!(signature, hex::encode("signed_blob"));
        Ok(())
    }

    #[tokio::test]
    async fn iam_client_email() -> TestResult {
        let tokens = MockTokenSource::new();
        let signer = IamSigner::new("test@example.com".to_string(), Arc::new(tokens));
        assert_eq!(signer.client_email().await?, "test@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_retry() -> TestResult {
        let server = Server::run();
        let signed_blob = BASE64_STANDARD.encode("signed_blob");
        server.expect(
            Expectation::matching(request::method_path("POST", SIGN_BLOB_PATH))
                .times(3)
                .respond_with(cycle![
                    status_code(503).body("try-again"),
                    status_code(503).body("try-again"),
                    json_encoded(json!({
                        "signedBlob": signed_blob,
                    }))
                ]),
        );

        let mut tokens = MockTokenSource::new();
        tokens.expect_token().times(3).returning(|| Ok(test_token()));
        let signer = test_signer(&server, tokens);
        let signature = signer.sign(b"test").await?;
        assert_eq!(signature, hex::encode("signed_blob"));
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_retry_exhausted() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", SIGN_BLOB_PATH))
                .times(3)
                .respond_with(status_code(503).body("try-again")),
        );

        let mut tokens = MockTokenSource::new();
        tokens.expect_token().times(3).returning(|| Ok(test_token()));
        let signer = test_signer(&server, tokens);
        let err = signer.sign(b"test").await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert!(err.to_string().contains("try-again"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_permanent_error() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", SIGN_BLOB_PATH))
                .times(1)
                .respond_with(status_code(403).body("permission denied")),
        );

        let mut tokens = MockTokenSource::new();
        tokens.expect_token().times(1).returning(|| Ok(test_token()));
        let signer = test_signer(&server, tokens);
        let err = signer.sign(b"test").await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        assert!(err.to_string().contains("permission denied"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_bad_response() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", SIGN_BLOB_PATH))
                .respond_with(json_encoded(json!({"signedBlob": "not base64 !!"}))),
        );

        let mut tokens = MockTokenSource::new();
        tokens.expect_token().return_once(|| Ok(test_token()));
        let signer = test_signer(&server, tokens);
        let err = signer.sign(b"test").await.unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_token_error() -> TestResult {
        let server = Server::run();
        let mut tokens = MockTokenSource::new();
        tokens
            .expect_token()
            .times(1)
            .returning(|| Err(CredentialsError::from_msg(false, "test-only-token")));
        let signer = test_signer(&server, tokens);
        let err = signer.sign(b"test").await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_retry_transport_error() -> TestResult {
        // Reserve a port, then close it so connections are refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let endpoint = format!("http://{}", listener.local_addr()?);
        drop(listener);

        let mut tokens = MockTokenSource::new();
        tokens.expect_token().times(3).returning(|| Ok(test_token()));
        let mut signer = IamSigner::new("test@example.com".to_string(), Arc::new(tokens));
        signer.sign_blob = test_sign_blob_client_for(endpoint);
        let err = signer.sign(b"test").await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn iam_sign_retry_token_error() -> TestResult {
        let server = Server::run();
        let signed_blob = BASE64_STANDARD.encode("signed_blob");
        server.expect(
            Expectation::matching(request::method_path("POST", SIGN_BLOB_PATH))
                .times(1)
                .respond_with(json_encoded(json!({
                    "signedBlob": signed_blob,
                }))),
        );

        let mut seq = mockall::Sequence::new();
        let mut tokens = MockTokenSource::new();
        tokens
            .expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(CredentialsError::from_msg(true, "test-only-try-again")));
        tokens
            .expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(test_token()));
        let signer = test_signer(&server, tokens);
        let signature = signer.sign(b"test").await?;
        assert_eq!(signature, hex::encode("signed_blob"));
        Ok(())
    }

    #[test_case(408, true)]
    #[test_case(429, true)]
    #[test_case(500, true)]
    #[test_case(503, true)]
    #[test_case(400, false)]
    #[test_case(403, false)]
    #[test_case(404, false)]
    fn retry_policy_http(code: u16, want: bool) {
        let error = GaxError::http(code, HeaderMap::new(), bytes::Bytes::from_static(b"test"));
        let flow = SignBlobRetryPolicy.on_error(std::time::Instant::now(), 1, true, error);
        assert_eq!(flow.is_continue(), want, "{flow:?}");
    }

    #[test_case(true)]
    #[test_case(false)]
    fn retry_policy_authentication(retryable: bool) {
        let source = GaxCredentialsError::from_str(retryable, "test-only");
        let error = GaxError::authentication(source);
        let flow = SignBlobRetryPolicy.on_error(std::time::Instant::now(), 1, true, error);
        assert_eq!(flow.is_continue(), retryable, "{flow:?}");
    }

    #[test]
    fn retry_policy_transport() {
        let error = GaxError::transport(HeaderMap::new(), "test-only-connection-refused");
        let flow = SignBlobRetryPolicy.on_error(std::time::Instant::now(), 1, true, error);
        assert!(flow.is_continue(), "{flow:?}");

        let error = GaxError::transport(HeaderMap::new(), "test-only-connection-refused");
        let flow = SignBlobRetryPolicy.on_error(std::time::Instant::now(), 1, false, error);
        assert!(flow.is_permanent(), "{flow:?}");
    }
}
