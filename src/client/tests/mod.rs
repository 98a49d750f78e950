mod subscriptions;

use super::test_helpers::*;
use crate::download::test_helpers::{wait_for_status, wait_until, FakeTransfer};
use crate::error::{Error, FeedError, FeedErrorKind};
use crate::feed::test_helpers::{day, entry, feed, Scripted};
use crate::types::{EpisodeState, Event, PodcastId, TaskStatus};
use std::sync::atomic::Ordering;

const FEED_URL: &str = "http://example.com/feed.xml";

impl ClientHarness {
    /// Subscribe to a feed listing episodes `a`, `b` and `c`
    async fn subscribe_three(&self) -> PodcastId {
        self.fetcher.push(Scripted::Updated(feed(vec![
            entry("a", Some(day(1))),
            entry("b", Some(day(2))),
            entry("c", Some(day(3))),
        ])));
        self.client.subscribe_podcast(FEED_URL, None).await.unwrap()
    }
}
