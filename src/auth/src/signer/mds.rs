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

use crate::mds::MdsClient;
use crate::signer::iam::SignBlobClient;
use crate::signer::{Result, SigningError, SigningProvider};
use tokio::sync::OnceCell;

// Implements a Signer for the default service account of the metadata
// server. The email is fetched once and the signing is done via the IAM
// signBlob API.
#[derive(Debug)]
pub(crate) struct MdsSigner {
    client: MdsClient,
    client_email: OnceCell<String>,
    sign_blob: SignBlobClient,
}

impl MdsSigner {
    pub(crate) fn new(client: MdsClient) -> Self {
        Self {
            client,
            client_email: OnceCell::new(),
            sign_blob: SignBlobClient::new(),
        }
    }
}

#[async_trait::async_trait]
impl SigningProvider for MdsSigner {
    async fn client_email(&self) -> Result<String> {
        let email = self
            .client_email
            .get_or_try_init(|| async { self.client.email().await })
            .await
            .map_err(SigningError::transport)?;
        Ok(email.clone())
    }

    async fn sign(&self, content: &[u8]) -> Result<String> {
        let client_email = self.client_email().await?;
        self.sign_blob
            .sign(&client_email, &self.client, content)
            .await
    }
}
