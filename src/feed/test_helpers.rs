//! Scripted in-memory feed fetcher for tests.

use super::{Feed, FeedEntry, FeedFetcher, FetchRequest, FetchResult, ParsedFeed};
use crate::error::FeedError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One scripted answer to `fetch_channel`
pub(crate) enum Scripted {
    Updated(ParsedFeed),
    NotModified,
    NewLocation(String),
    Fail(FeedError),
}

/// Fetcher that replays scripted responses in order and serves pages by URL
#[derive(Default)]
pub(crate) struct FakeFetcher {
    channel: Mutex<VecDeque<Scripted>>,
    pages: Mutex<HashMap<String, ParsedFeed>>,
    requests: Mutex<Vec<FetchRequest>>,
    page_requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, response: Scripted) {
        self.channel.lock().unwrap().push_back(response);
    }

    pub(crate) fn add_page(&self, url: &str, feed: ParsedFeed) {
        self.pages.lock().unwrap().insert(url.to_string(), feed);
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn page_requests(&self) -> Vec<String> {
        self.page_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedFetcher for FakeFetcher {
    async fn fetch_channel(&self, request: &FetchRequest) -> Result<FetchResult, FeedError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.channel.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Updated(feed)) => Ok(FetchResult::Updated(Box::new(feed))),
            Some(Scripted::NotModified) => Ok(FetchResult::NotModified {
                etag: None,
                last_modified: None,
            }),
            Some(Scripted::NewLocation(url)) => Ok(FetchResult::NewLocation(url)),
            Some(Scripted::Fail(e)) => Err(e),
            None => Err(FeedError::Offline("no scripted response".into())),
        }
    }

    async fn fetch_next_page(
        &self,
        _request: &FetchRequest,
        url: &str,
    ) -> Result<Option<Box<dyn Feed>>, FeedError> {
        self.page_requests.lock().unwrap().push(url.to_string());
        let page = self.pages.lock().unwrap().get(url).cloned();
        Ok(page.map(|p| Box::new(p) as Box<dyn Feed>))
    }
}

/// Noon on the given day of January 2024
pub(crate) fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 12, 0, 0).unwrap()
}

/// Entry with a media URL derived from its GUID
pub(crate) fn entry(guid: &str, published: Option<DateTime<Utc>>) -> FeedEntry {
    FeedEntry {
        guid: guid.to_string(),
        title: format!("Episode {guid}"),
        media_url: format!("http://example.com/media/{guid}.mp3"),
        mime_type: Some("audio/mpeg".into()),
        file_size: 1000,
        published,
        ..Default::default()
    }
}

/// Feed titled "Fake Podcast" listing `entries`
pub(crate) fn feed(entries: Vec<FeedEntry>) -> ParsedFeed {
    ParsedFeed {
        title: Some("Fake Podcast".into()),
        link: Some("http://example.com".into()),
        entries,
        ..Default::default()
    }
}
