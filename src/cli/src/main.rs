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

//! Generate a scoped POST policy and use it to upload a gzipped file.

const DESCRIPTION: &str = concat!(
    "Generates a V4 POST policy that only allows uploads of gzip-encoded",
    " objects under the <username>/<job-id>/ prefix of a bucket. Then it uses",
    " the policy to upload a small gzipped file, as an unauthenticated client",
    " would. The policy is signed with a service account key, if available,",
    " or using the IAM signBlob API on behalf of the metadata server account."
);

mod args;

use anyhow::Context;
use args::Args;
use clap::Parser;
use gcs_post_upload::gzip::create_gzipped_file;
use gcs_post_upload::upload::upload_file_with_policy;
use gcs_post_upload::upload_policy::upload_policy_builder;
use gcs_post_upload_auth::credentials::Builder as CredentialsBuilder;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = enable_tracing(args.verbose);
    args.validate()?;
    tracing::info!("{args:?}");

    let mut builder = CredentialsBuilder::default();
    if let Some(path) = &args.credentials {
        builder = builder.with_key_file(path.clone());
    }
    if let Some(email) = &args.signing_account {
        builder = builder.with_signing_account(email);
    }
    let signer = builder
        .build_signer()
        .context("cannot create a signer for the POST policy")?;

    let job_id = args
        .job_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let (builder, prefix) = upload_policy_builder(&args.bucket, &args.username, &job_id)?;
    let policy = builder
        .with_endpoint(&args.endpoint)
        .with_expiration(Duration::from_secs(args.expire_minutes * 60))
        .sign_with(&signer)
        .await
        .context("cannot generate the POST policy")?;
    tracing::info!(prefix = prefix.as_str(), "generated POST policy");
    println!("Generated POST policy:");
    println!("{}", serde_json::to_string_pretty(&policy)?);

    create_gzipped_file(&args.local_file, args.content.as_bytes()).await?;
    let object = upload_file_with_policy(&policy, &args.local_file, &args.object_name)
        .await
        .context("upload failed")?;
    println!("Upload succeeded! Object key: {}", object.object_key);
    Ok(())
}

fn enable_tracing(verbose: bool) -> tracing::dispatcher::DefaultGuard {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_default(subscriber)
}
