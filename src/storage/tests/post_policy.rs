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

#[cfg(test)]
mod tests {
    use base64::{Engine, prelude::BASE64_STANDARD};
    use chrono::{TimeZone, Utc};
    use gcs_post_upload::upload_policy::upload_policy_builder;
    use gcs_post_upload_auth::credentials::Builder;
    use gcs_post_upload_auth::credentials::service_account::ServiceAccountKey;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const PKCS8_KEY: &str = include_str!("../../auth/testdata/rsa-pkcs8.pem");

    const EXPECTED_POLICY: &str = concat!(
        r#"{"conditions":["#,
        r#"["starts-with","$key","alice/job-123/"],"#,
        r#"["starts-with","$Content-Encoding",""],"#,
        r#"{"content-encoding":"gzip"},"#,
        r#"{"bucket":"test-bucket"},"#,
        r#"{"key":"alice/job-123/${filename}"},"#,
        r#"{"x-goog-date":"20260102T030405Z"},"#,
        r#"{"x-goog-credential":"test-sa@test-project.iam.gserviceaccount.com/20260102/auto/storage/goog4_request"},"#,
        r#"{"x-goog-algorithm":"GOOG4-RSA-SHA256"}"#,
        r#"],"expiration":"2026-01-02T03:19:05Z"}"#,
    );

    // Generated with `openssl dgst -sha256 -sign rsa-pkcs8.pem` over the
    // base64 encoding of `EXPECTED_POLICY`.
    const EXPECTED_SIGNATURE: &str = concat!(
        "642af3df18d1221d5d67fdad38a166c3f1d62b6ba605581fa08cdbc56a3ca266",
        "e2fe003b0c412fac19ceee401d45b97c27d7a7cc05f9db62a0a0f8f25641cd8f",
        "02297fab322064514a5ab38f956d06012dfcc6c1313b6290e3336ef3511bba3f",
        "8cc43a23166a3ea0bb01bf6811b6daf094958f04e98fe5c97acd0010280fbf5f",
        "ba865f77223016ab21b6eab3a1513bb812b6d145f32272d12576ab29e683689b",
        "d97825b740629bfbeeb8329c53fd0c758c8bfe181c50fedf473641edf3d0a18c",
        "b03944e8aee50e3685e67baa2f7dc2dddc5091183ed90ce53855da95908618f9",
        "0ccadd3ed2efe1fc2888198876c766dcd25911e7f47e08cd1201b88ff72f0038",
    );

    #[tokio::test]
    async fn scoped_policy_with_service_account_key() -> anyhow::Result<()> {
        let key = ServiceAccountKey {
            client_email: "test-sa@test-project.iam.gserviceaccount.com".to_string(),
            private_key: PKCS8_KEY.to_string(),
            ..ServiceAccountKey::default()
        };
        let signer = Builder::default()
            .with_service_account_key(key)
            .build_signer()?;

        let (builder, prefix) = upload_policy_builder("test-bucket", "alice", "job-123")?;
        let policy = builder
            .with_expiration(Duration::from_secs(15 * 60))
            .with_timestamp(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
            .sign_with(&signer)
            .await?;

        assert_eq!(prefix, "alice/job-123/");
        assert_eq!(policy.url, "https://storage.googleapis.com/test-bucket/");
        let document = String::from_utf8(BASE64_STANDARD.decode(&policy.fields["policy"])?)?;
        assert_eq!(document, EXPECTED_POLICY);
        assert_eq!(policy.fields["x-goog-signature"], EXPECTED_SIGNATURE);
        assert_eq!(
            policy.fields["x-goog-credential"],
            "test-sa@test-project.iam.gserviceaccount.com/20260102/auto/storage/goog4_request"
        );
        assert_eq!(policy.fields["x-goog-date"], "20260102T030405Z");
        assert_eq!(policy.fields["x-goog-algorithm"], "GOOG4-RSA-SHA256");
        assert_eq!(policy.fields["content-encoding"], "gzip");
        assert_eq!(policy.fields["key"], "alice/job-123/${filename}");
        assert_eq!(policy.fields.len(), 7, "{policy:?}");
        Ok(())
    }

    #[tokio::test]
    async fn policy_serializes_to_json() -> anyhow::Result<()> {
        let key = ServiceAccountKey {
            client_email: "test-sa@test-project.iam.gserviceaccount.com".to_string(),
            private_key: PKCS8_KEY.to_string(),
            ..ServiceAccountKey::default()
        };
        let signer = Builder::default()
            .with_service_account_key(key)
            .build_signer()?;
        let (builder, _) = upload_policy_builder("test-bucket", "alice", "job-123")?;
        let policy = builder.sign_with(&signer).await?;

        let json = serde_json::to_value(&policy)?;
        assert_eq!(json["url"], "https://storage.googleapis.com/test-bucket/");
        assert_eq!(json["fields"]["key"], "alice/job-123/${filename}");
        let roundtrip: gcs_post_upload::PostPolicyV4 = serde_json::from_value(json)?;
        assert_eq!(roundtrip, policy);
        Ok(())
    }
}
