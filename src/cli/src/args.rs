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

use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;

/// The longest expiration accepted for a POST policy, in minutes.
const MAX_EXPIRE_MINUTES: u64 = 7 * 24 * 60;

/// Command line options.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = super::DESCRIPTION)]
pub struct Args {
    /// The bucket that receives the upload.
    #[arg(long, env = "GCS_BUCKET")]
    pub bucket: String,

    /// The first component of the object prefix.
    #[arg(long, default_value = "alice")]
    pub username: String,

    /// The second component of the object prefix.
    ///
    /// A random UUID is used if not set.
    #[arg(long)]
    pub job_id: Option<String>,

    /// The local file that receives the gzipped content before the upload.
    #[arg(long, default_value = "/tmp/test.gz")]
    pub local_file: PathBuf,

    /// The object name, relative to the prefix.
    #[arg(long, default_value = "test.gz")]
    pub object_name: String,

    /// How long the policy is valid, in minutes.
    #[arg(long, default_value_t = 15)]
    pub expire_minutes: u64,

    /// The (uncompressed) content to upload.
    #[arg(
        long,
        default_value = "Hello world! This is a test file for GCS upload.\nLine 2 of the file."
    )]
    pub content: String,

    /// A service account key file used to sign the policy.
    ///
    /// Application Default Credentials are used if not set, including any
    /// key file named by `GOOGLE_APPLICATION_CREDENTIALS`.
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Sign as this service account when using the metadata server.
    ///
    /// The default service account signs if not set.
    #[arg(long)]
    pub signing_account: Option<String>,

    /// The Cloud Storage endpoint.
    #[arg(long, default_value = "https://storage.googleapis.com")]
    pub endpoint: String,

    /// Log debug messages.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Validates the arguments after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket.is_empty() {
            bail!("the bucket name must be non-empty")
        }
        check_segment("username", &self.username)?;
        if let Some(job_id) = &self.job_id {
            check_segment("job-id", job_id)?;
        }
        if self.object_name.is_empty() {
            bail!("the object name must be non-empty")
        }
        if self.expire_minutes == 0 || self.expire_minutes > MAX_EXPIRE_MINUTES {
            bail!(
                "invalid expire-minutes ({}), must be in the [1, {MAX_EXPIRE_MINUTES}] range",
                self.expire_minutes
            )
        }
        Ok(())
    }
}

fn check_segment(name: &str, value: &str) -> anyhow::Result<()> {
    if value.is_empty() || value.contains('/') {
        bail!("invalid {name} ({value:?}), must be non-empty and cannot contain '/'")
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let args = Args::try_parse_from(["program", "--bucket=bucket"])?;
        assert_eq!(args.bucket, "bucket");
        assert_eq!(args.username, "alice");
        assert_eq!(args.job_id, None);
        assert_eq!(args.local_file, PathBuf::from("/tmp/test.gz"));
        assert_eq!(args.object_name, "test.gz");
        assert_eq!(args.expire_minutes, 15);
        assert_eq!(
            args.content,
            "Hello world! This is a test file for GCS upload.\nLine 2 of the file."
        );
        assert_eq!(args.endpoint, "https://storage.googleapis.com");
        assert_eq!(args.credentials, None);
        assert_eq!(args.signing_account, None);
        assert!(!args.verbose, "{args:?}");
        let got = args.validate();
        assert!(got.is_ok(), "{got:?} {args:?}");
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn credentials_ignore_adc_env() -> anyhow::Result<()> {
        let _e = scoped_env::ScopedEnv::set("GOOGLE_APPLICATION_CREDENTIALS", "");
        let args = Args::try_parse_from(["program", "--bucket=bucket"])?;
        assert_eq!(args.credentials, None);

        let _e = scoped_env::ScopedEnv::set("GOOGLE_APPLICATION_CREDENTIALS", "/tmp/adc.json");
        let args = Args::try_parse_from(["program", "--bucket=bucket"])?;
        assert_eq!(args.credentials, None);
        Ok(())
    }

    #[test]
    fn validate_success() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "program",
            "--bucket=bucket",
            "--username=bob",
            "--job-id=job-456",
            "--expire-minutes=10080",
            "--object-name=data.gz",
            "--signing-account=signer@test-project.iam.gserviceaccount.com",
            "-v",
        ])?;
        assert_eq!(args.job_id.as_deref(), Some("job-456"));
        assert_eq!(
            args.signing_account.as_deref(),
            Some("signer@test-project.iam.gserviceaccount.com")
        );
        assert!(args.verbose, "{args:?}");
        let got = args.validate();
        assert!(got.is_ok(), "{got:?} {args:?}");
        Ok(())
    }

    #[test_case(&["program", "--bucket="])]
    #[test_case(&["program", "--bucket=bucket", "--username="])]
    #[test_case(&["program", "--bucket=bucket", "--username=a/b"])]
    #[test_case(&["program", "--bucket=bucket", "--job-id="])]
    #[test_case(&["program", "--bucket=bucket", "--job-id=a/b"])]
    #[test_case(&["program", "--bucket=bucket", "--object-name="])]
    #[test_case(&["program", "--bucket=bucket", "--expire-minutes=0"])]
    #[test_case(&["program", "--bucket=bucket", "--expire-minutes=10081"])]
    fn validate(input: &[&str]) -> anyhow::Result<()> {
        let args = Args::try_parse_from(input)?;
        let got = args.validate();
        assert!(got.is_err(), "{got:?} {args:?}");
        Ok(())
    }
}
