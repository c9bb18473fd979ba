//! Azure Blob Storage backend
//!
//! Talks to the Blob service REST API directly:
//! - anonymous sessions issue plain `GET`s (the container must allow public
//!   blob reads)
//! - authenticated sessions first obtain an Azure AD token with the client
//!   credentials grant, then `PUT` block blobs with a bearer token

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{
    atomic_write_with, AccessMode, BlobClient, BlobStore, Credentials, StoreError, StoreResult,
};

/// Blob service REST API version sent with every request
const API_VERSION: &str = "2021-08-06";

/// OAuth scope for Azure Storage data-plane access
const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Connect timeout for all requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Azure Blob Storage account.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    account: String,
    credentials: Credentials,
    transfer_timeout: Option<Duration>,
}

impl AzureBlobStore {
    pub fn new(
        account: impl Into<String>,
        credentials: Credentials,
        transfer_timeout: Option<Duration>,
    ) -> Self {
        Self {
            account: account.into(),
            credentials,
            transfer_timeout,
        }
    }

    /// Blob service endpoint for the account.
    pub fn endpoint(&self) -> String {
        format!("https://{}.blob.core.windows.net", self.account)
    }

    fn agent(&self) -> ureq::Agent {
        let mut builder = ureq::AgentBuilder::new().timeout_connect(CONNECT_TIMEOUT);
        if let Some(timeout) = self.transfer_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    fn fetch_token(&self, agent: &ureq::Agent) -> StoreResult<String> {
        let creds = &self.credentials;
        if creds.tenant_id.is_empty() || creds.client_id.is_empty() {
            return Err(StoreError::Auth(
                "tenant id and user name are required for write access".to_string(),
            ));
        }

        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            creds.tenant_id
        );
        let response = agent
            .post(&url)
            .send_form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("scope", STORAGE_SCOPE),
            ])
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => {
                    StoreError::Auth(format!("token endpoint returned status {code}"))
                }
                ureq::Error::Transport(transport) => {
                    StoreError::Auth(format!("token request failed: {transport}"))
                }
            })?;

        let body = response
            .into_string()
            .map_err(|e| StoreError::Auth(format!("reading token response: {e}")))?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::Auth(format!("malformed token response: {e}")))?;
        Ok(token.access_token)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl BlobStore for AzureBlobStore {
    fn connect(&self, access: AccessMode) -> StoreResult<Box<dyn BlobClient>> {
        if self.account.is_empty() {
            return Err(StoreError::MissingAccount);
        }

        let agent = self.agent();
        let bearer = match access {
            AccessMode::Anonymous => None,
            AccessMode::Authenticated => Some(format!("Bearer {}", self.fetch_token(&agent)?)),
        };
        debug!(account = %self.account, %access, "opened azure blob session");

        Ok(Box::new(AzureBlobClient {
            agent,
            endpoint: self.endpoint(),
            bearer,
        }))
    }
}

struct AzureBlobClient {
    agent: ureq::Agent,
    endpoint: String,
    bearer: Option<String>,
}

impl AzureBlobClient {
    fn blob_url(&self, container: &str, blob: &str) -> StoreResult<String> {
        if container.is_empty() {
            return Err(StoreError::MissingContainer);
        }
        Ok(format!(
            "{}/{}/{}",
            self.endpoint,
            encode_path(container),
            encode_path(blob)
        ))
    }

    fn map_error(err: ureq::Error, container: &str, blob: &str) -> StoreError {
        match err {
            ureq::Error::Status(404, _) => StoreError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            },
            ureq::Error::Status(status, _) => StoreError::Status {
                status,
                container: container.to_string(),
                blob: blob.to_string(),
            },
            ureq::Error::Transport(transport) => StoreError::Transport {
                container: container.to_string(),
                blob: blob.to_string(),
                message: transport.to_string(),
            },
        }
    }
}

impl BlobClient for AzureBlobClient {
    fn download(&self, container: &str, blob: &str, dest: &Path) -> StoreResult<()> {
        let url = self.blob_url(container, blob)?;
        let mut request = self.agent.get(&url).set("x-ms-version", API_VERSION);
        if let Some(ref bearer) = self.bearer {
            request = request.set("Authorization", bearer);
        }

        let response = request
            .call()
            .map_err(|e| Self::map_error(e, container, blob))?;

        let bytes = atomic_write_with(dest, |out| {
            let mut reader = response.into_reader();
            io::copy(&mut reader, out).map_err(|e| StoreError::Transport {
                container: container.to_string(),
                blob: blob.to_string(),
                message: e.to_string(),
            })
        })?;
        debug!(blob, bytes, "downloaded blob");
        Ok(())
    }

    fn upload(&self, source: &Path, container: &str, blob: &str) -> StoreResult<()> {
        let url = self.blob_url(container, blob)?;
        let io_err = |e: io::Error| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        };
        let file = File::open(source).map_err(io_err)?;
        let length = file.metadata().map_err(io_err)?.len();

        let mut request = self
            .agent
            .put(&url)
            .set("x-ms-version", API_VERSION)
            .set("x-ms-blob-type", "BlockBlob")
            .set("Content-Length", &length.to_string());
        if let Some(ref bearer) = self.bearer {
            request = request.set("Authorization", bearer);
        }

        request
            .send(file)
            .map_err(|e| Self::map_error(e, container, blob))?;
        debug!(blob, bytes = length, "uploaded blob");
        Ok(())
    }
}

/// Percent-encode a blob path, keeping `/` separators.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
