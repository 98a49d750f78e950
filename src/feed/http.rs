//! HTTP feed fetcher with conditional GET and status normalization

use super::{discover_feed_link, parse_feed, Feed, FeedFetcher, FetchRequest, FetchResult};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Response of a GET after temporary redirects were followed
enum Fetched {
    Body {
        url: String,
        bytes: Vec<u8>,
        is_html: bool,
        etag: Option<String>,
        last_modified: Option<String>,
        temporarily_redirected: bool,
    },
    NotModified {
        etag: Option<String>,
        last_modified: Option<String>,
    },
    Moved(String),
}

/// [`FeedFetcher`] backed by `reqwest`
///
/// Redirects are handled here rather than by the client: permanent redirects
/// (301, 308) are reported as [`FetchResult::NewLocation`] so the subscription URL can
/// be rewritten, temporary ones (302, 303, 307) are followed up to `max_redirects`.
#[derive(Clone, Debug)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    max_redirects: usize,
}

impl HttpFeedFetcher {
    /// Build a fetcher using the user agent, timeout and redirect limit of `config`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
        })
    }

    async fn get(
        &self,
        request: &FetchRequest,
        url: &str,
        conditional: bool,
        follow_permanent: bool,
    ) -> std::result::Result<Fetched, FeedError> {
        let mut current = url.to_string();
        let mut temporarily_redirected = false;

        for _ in 0..=self.max_redirects {
            let mut builder = self.client.get(&current);
            if conditional {
                if let Some(etag) = &request.etag {
                    builder = builder.header(header::IF_NONE_MATCH, etag);
                }
                if let Some(modified) = &request.last_modified {
                    builder = builder.header(header::IF_MODIFIED_SINCE, modified);
                }
            }
            if let Some(credentials) = &request.credentials {
                builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
            }

            let response = builder
                .send()
                .await
                .map_err(|e| FeedError::Offline(e.to_string()))?;
            let status = response.status();
            debug!(url = %current, status = status.as_u16(), "feed response");

            if status == StatusCode::NOT_MODIFIED {
                return Ok(Fetched::NotModified {
                    etag: header_value(response.headers(), header::ETAG),
                    last_modified: header_value(response.headers(), header::LAST_MODIFIED),
                });
            }

            if status.is_redirection() {
                let location = header_value(response.headers(), header::LOCATION)
                    .ok_or(FeedError::UnknownStatusCode(status.as_u16()))?;
                let target = resolve(&current, &location);
                match status {
                    StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
                        if !follow_permanent =>
                    {
                        return Ok(Fetched::Moved(target));
                    }
                    StatusCode::MOVED_PERMANENTLY
                    | StatusCode::PERMANENT_REDIRECT
                    | StatusCode::FOUND
                    | StatusCode::SEE_OTHER
                    | StatusCode::TEMPORARY_REDIRECT => {
                        temporarily_redirected |= !matches!(
                            status,
                            StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
                        );
                        current = target;
                        continue;
                    }
                    _ => return Err(FeedError::UnknownStatusCode(status.as_u16())),
                }
            }

            if !status.is_success() {
                return Err(map_status(status, request.credentials.is_some()));
            }

            let headers = response.headers();
            let etag = header_value(headers, header::ETAG);
            let last_modified = header_value(headers, header::LAST_MODIFIED);
            let content_type_html = header_value(headers, header::CONTENT_TYPE)
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"));
            let bytes = response
                .bytes()
                .await
                .map_err(|e| FeedError::Offline(format!("Failed to read feed body: {}", e)))?
                .to_vec();
            let is_html = content_type_html || body_looks_like_html(&bytes);

            return Ok(Fetched::Body {
                url: current,
                bytes,
                is_html,
                etag,
                last_modified,
                temporarily_redirected,
            });
        }

        Err(FeedError::TooManyRedirects)
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_channel(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<FetchResult, FeedError> {
        match self.get(request, &request.url, true, false).await? {
            Fetched::Moved(location) => Ok(FetchResult::NewLocation(location)),
            Fetched::NotModified { etag, last_modified } => {
                Ok(FetchResult::NotModified { etag, last_modified })
            }
            Fetched::Body {
                url,
                bytes,
                is_html,
                etag,
                last_modified,
                temporarily_redirected,
            } => match parse_feed(&bytes, etag, last_modified) {
                Ok(feed) => Ok(FetchResult::Updated(Box::new(feed))),
                Err(parse_err) if is_html => {
                    if temporarily_redirected {
                        return Err(FeedError::WifiLogin(url));
                    }
                    let html = String::from_utf8_lossy(&bytes);
                    match discover_feed_link(&html, &url) {
                        Some(feed_url) if feed_url != request.url => {
                            debug!(from = %request.url, to = %feed_url, "autodiscovered feed link");
                            Ok(FetchResult::NewLocation(feed_url))
                        }
                        _ => Err(parse_err),
                    }
                }
                Err(parse_err) => Err(parse_err),
            },
        }
    }

    async fn fetch_next_page(
        &self,
        request: &FetchRequest,
        url: &str,
    ) -> std::result::Result<Option<Box<dyn Feed>>, FeedError> {
        match self.get(request, url, false, true).await? {
            Fetched::Body { bytes, .. } => match parse_feed(&bytes, None, None) {
                Ok(feed) => Ok(Some(Box::new(feed))),
                Err(e) => {
                    warn!(url, error = %e, "next page is not a feed");
                    Ok(None)
                }
            },
            Fetched::NotModified { .. } | Fetched::Moved(_) => Ok(None),
        }
    }
}

/// Normalize a non-success, non-redirect status into a [`FeedError`]
pub(crate) fn map_status(status: StatusCode, has_credentials: bool) -> FeedError {
    match status.as_u16() {
        401 if has_credentials => FeedError::AuthenticationFailed,
        401 => FeedError::AuthenticationRequired,
        403 => FeedError::Unsubscribe("forbidden".to_string()),
        404 => FeedError::NotFound,
        410 => FeedError::Unsubscribe("gone".to_string()),
        429 => FeedError::RateLimited,
        code @ 400..=499 => {
            debug!(status = code, "client error treated as bad request");
            FeedError::BadRequest
        }
        code @ 500..=599 => FeedError::InternalServerError(code),
        code => FeedError::UnknownStatusCode(code),
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn resolve(base: &str, location: &str) -> String {
    url::Url::parse(base)
        .and_then(|b| b.join(location))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}

fn body_looks_like_html(bytes: &[u8]) -> bool {
    let head: String = String::from_utf8_lossy(&bytes[..bytes.len().min(512)])
        .trim_start()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}
