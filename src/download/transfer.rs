//! Transfer executors
//!
//! The task state machine does not know how bytes are fetched. A
//! [`TransferExecutor`] opens a byte stream for a URL, resuming from an offset when
//! it can; [`HttpTransfer`] is the default. [`CustomDownloader`]s registered on the
//! [`TransferRegistry`] may claim individual episode URLs first (for example, pages
//! of a streaming site that need extraction before the media URL is known).

use crate::error::DownloadError;
use crate::model::Credentials;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header;
use reqwest::StatusCode;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// What to fetch
#[derive(Clone, Debug)]
pub struct TransferRequest {
    /// Media URL
    pub url: String,
    /// Bytes already on disk; a range request starts here
    pub resume_from: u64,
    /// Basic-auth credentials
    pub credentials: Option<Credentials>,
}

/// An opened transfer
pub struct TransferStream {
    /// Size of the complete file when the server announced it
    pub total_size: Option<u64>,
    /// MIME type from the response
    pub mime_type: Option<String>,
    /// Whether the stream continues at `resume_from` (false = starts at byte 0)
    pub resumed: bool,
    /// Body chunks
    pub body: BoxStream<'static, std::result::Result<Vec<u8>, DownloadError>>,
}

impl std::fmt::Debug for TransferStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferStream")
            .field("total_size", &self.total_size)
            .field("mime_type", &self.mime_type)
            .field("resumed", &self.resumed)
            .finish_non_exhaustive()
    }
}

/// Performs the byte transfer of a task
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Open the transfer described by `request`
    async fn open(
        &self,
        request: &TransferRequest,
    ) -> std::result::Result<TransferStream, DownloadError>;
}

/// Claims episode URLs that need a special executor
pub trait CustomDownloader: Send + Sync {
    /// Return an executor when this downloader handles `url`
    fn resolve(&self, url: &str) -> Option<Arc<dyn TransferExecutor>>;
}

/// Default executor: HTTP GET with `Range` resume
#[derive(Clone, Debug)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    /// Create an HTTP executor
    ///
    /// `connect_timeout` bounds connection setup only; transfers may take as long
    /// as they need.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TransferExecutor for HttpTransfer {
    async fn open(
        &self,
        request: &TransferRequest,
    ) -> std::result::Result<TransferStream, DownloadError> {
        let mut builder = self.client.get(&request.url);
        if request.resume_from > 0 {
            builder = builder.header(header::RANGE, format!("bytes={}-", request.resume_from));
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DownloadError::Transfer(format!("Failed to connect: {}", e)))?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && request.resume_from > 0 {
            // The partial file already holds every byte
            tracing::debug!(url = %request.url, "range not satisfiable, transfer already complete");
            return Ok(TransferStream {
                total_size: Some(request.resume_from),
                mime_type: None,
                resumed: true,
                body: stream::empty().boxed(),
            });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(DownloadError::AuthenticationRequired);
        }
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT && request.resume_from > 0;
        let headers = response.headers();
        let mime_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_string())
            .filter(|ct| !ct.is_empty());
        let total_size = if resumed {
            headers
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(content_range_total)
                .or_else(|| response.content_length().map(|len| len + request.resume_from))
        } else {
            response.content_length()
        };

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| DownloadError::Transfer(e.to_string()))
            })
            .boxed();

        Ok(TransferStream {
            total_size,
            mime_type,
            resumed,
            body,
        })
    }
}

/// Parse the complete length out of `Content-Range: bytes a-b/total`
pub(crate) fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// Picks the executor for an episode URL
///
/// Custom downloaders are consulted in registration order; the default executor
/// handles everything they decline.
#[derive(Clone)]
pub struct TransferRegistry {
    default: Arc<dyn TransferExecutor>,
    custom: Arc<RwLock<Vec<Arc<dyn CustomDownloader>>>>,
}

impl TransferRegistry {
    /// Registry with `default` as fallback executor
    pub fn new(default: Arc<dyn TransferExecutor>) -> Self {
        Self {
            default,
            custom: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a custom downloader
    pub fn register(&self, downloader: Arc<dyn CustomDownloader>) {
        self.custom
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(downloader);
    }

    /// Executor for `url`
    pub fn executor_for(&self, url: &str) -> Arc<dyn TransferExecutor> {
        let custom = self
            .custom
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        custom
            .iter()
            .find_map(|d| d.resolve(url))
            .unwrap_or_else(|| self.default.clone())
    }
}
