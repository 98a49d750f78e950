use super::*;

const NEW_URL: &str = "http://example.com/moved.xml";

#[tokio::test]
async fn test_new_location_rewrites_url_and_retries() {
    let mut h = harness().await;
    h.podcast.http_etag = Some("\"stale\"".into());
    h.fetcher.push(Scripted::NewLocation(NEW_URL.into()));
    h.fetcher.push(Scripted::Updated(feed(vec![entry("a", Some(day(1)))])));

    let new = h.update(0).await.unwrap();

    assert_eq!(new.len(), 1);
    assert_eq!(h.podcast.url, NEW_URL);
    let requests = h.fetcher.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url, NEW_URL);
    assert_eq!(requests[1].etag, None, "caching headers belong to the old URL");

    let stored = h.db.get_podcast_by_url(NEW_URL).await.unwrap().unwrap();
    assert_eq!(stored.id, h.podcast.id);
    assert!(h.db.get_podcast_by_url(FEED_URL).await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_location_taken_by_other_subscription() {
    let mut h = harness().await;
    h.db.insert_podcast(NEW_URL, None).await.unwrap();
    h.fetcher.push(Scripted::NewLocation(NEW_URL.into()));

    let err = h.update(0).await.unwrap_err();

    assert!(
        matches!(err, crate::Error::Feed(FeedError::LocationTaken(ref url)) if url == NEW_URL),
        "got {err:?}"
    );
    assert_eq!(h.podcast.url, FEED_URL);
}

#[tokio::test]
async fn test_redirect_chain_is_bounded() {
    let mut h = harness().await;
    for n in 0..10 {
        h.fetcher
            .push(Scripted::NewLocation(format!("http://example.com/hop{n}.xml")));
    }

    let err = h.update(0).await.unwrap_err();

    assert!(
        matches!(err, crate::Error::Feed(FeedError::TooManyRedirects)),
        "got {err:?}"
    );
    assert_eq!(h.fetcher.requests().len(), 6, "initial request plus 5 redirects");
}
