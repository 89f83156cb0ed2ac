//! Bot API media fetcher
//!
//! Fetches media bytes over the Telegram Bot API: a `getFile` call resolves
//! the server-side path for a file id, then the file endpoint serves the
//! bytes. Bot API error responses are mapped onto the crate's error
//! classification so the retry policy treats rate limits and server errors
//! as transient and auth failures as permanent.

use crate::client::MediaFetcher;
use crate::error::{Error, Result};
use crate::types::MediaCandidate;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// [`MediaFetcher`] implementation backed by the Telegram Bot API
///
/// The bot must be a member of the source channel. File size is limited to
/// what the Bot API will serve (20 MB at the time of writing); larger files
/// need an MTProto fetcher supplied by the embedder.
pub struct BotApiFetcher {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl BotApiFetcher {
    /// Create a fetcher for the given bot token
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Override the API base URL (tests point this at a local server)
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Resolve the server-side file path for a remote file id
    async fn resolve_file_path(&self, remote_id: &str) -> Result<String> {
        let url = format!("{}/bot{}/getFile", self.api_base, self.token);
        let response = self
            .client
            .get(&url)
            .query(&[("file_id", remote_id)])
            .send()
            .await?;

        let status = response.status();
        let envelope: ApiEnvelope<FileInfo> = response.json().await?;

        if !envelope.ok {
            return Err(map_api_error(status, &envelope));
        }

        envelope
            .result
            .and_then(|info| info.file_path)
            .ok_or_else(|| Error::Api {
                code: 500,
                description: "getFile response carried no file_path".into(),
            })
    }

    /// Download the bytes behind a resolved file path
    async fn download(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, file_path);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_error(status, None));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl MediaFetcher for BotApiFetcher {
    async fn fetch(&self, candidate: &MediaCandidate) -> Result<Vec<u8>> {
        tracing::debug!(
            file_id = %candidate.file_id,
            remote_id = %candidate.remote_id,
            "Fetching media via Bot API"
        );
        let file_path = self.resolve_file_path(&candidate.remote_id).await?;
        self.download(&file_path).await
    }
}

/// Map a Bot API error envelope onto the crate error taxonomy
fn map_api_error<T>(status: reqwest::StatusCode, envelope: &ApiEnvelope<T>) -> Error {
    let code = envelope.error_code.unwrap_or_else(|| status.as_u16().into());
    let retry_after = envelope
        .parameters
        .as_ref()
        .and_then(|p| p.retry_after)
        .map(Duration::from_secs);

    match code {
        429 => Error::RateLimited { retry_after },
        401 | 403 => Error::Auth(
            envelope
                .description
                .clone()
                .unwrap_or_else(|| "bot token rejected".into()),
        ),
        _ => Error::Api {
            code,
            description: envelope
                .description
                .clone()
                .unwrap_or_else(|| "unknown API error".into()),
        },
    }
}

/// Map a bare HTTP status (no JSON envelope) onto the crate error taxonomy
fn map_http_error(status: reqwest::StatusCode, retry_after: Option<Duration>) -> Error {
    match status.as_u16() {
        429 => Error::RateLimited { retry_after },
        401 | 403 => Error::Auth(format!("file endpoint returned {status}")),
        code => Error::Api {
            code: code.into(),
            description: format!("file endpoint returned {status}"),
        },
    }
}
