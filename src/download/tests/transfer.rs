use crate::download::test_helpers::FakeTransfer;
use crate::download::transfer::content_range_total;
use crate::download::{
    CustomDownloader, HttpTransfer, TransferExecutor, TransferRegistry, TransferRequest,
};
use crate::error::DownloadError;
use crate::model::Credentials;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http() -> HttpTransfer {
    HttpTransfer::new("podcast-dl-test", Duration::from_secs(5)).unwrap()
}

fn request(url: String, resume_from: u64) -> TransferRequest {
    TransferRequest {
        url,
        resume_from,
        credentials: None,
    }
}

async fn body_of(stream: crate::download::TransferStream) -> Vec<u8> {
    stream.body.map(|chunk| chunk.unwrap()).concat().await
}

#[tokio::test]
async fn test_full_download_reports_size_and_mime() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episode.mp3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"0123456789".to_vec(), "audio/mpeg"),
        )
        .mount(&server)
        .await;

    let stream = http()
        .open(&request(format!("{}/episode.mp3", server.uri()), 0))
        .await
        .unwrap();

    assert_eq!(stream.total_size, Some(10));
    assert_eq!(stream.mime_type.as_deref(), Some("audio/mpeg"));
    assert!(!stream.resumed);
    assert_eq!(body_of(stream).await, b"0123456789");
}

#[tokio::test]
async fn test_resume_sends_range_and_reads_content_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episode.mp3"))
        .and(header("Range", "bytes=4-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 4-9/10")
                .set_body_raw(b"456789".to_vec(), "audio/mpeg"),
        )
        .mount(&server)
        .await;

    let stream = http()
        .open(&request(format!("{}/episode.mp3", server.uri()), 4))
        .await
        .unwrap();

    assert!(stream.resumed);
    assert_eq!(stream.total_size, Some(10));
    assert_eq!(body_of(stream).await, b"456789");
}

#[tokio::test]
async fn test_server_ignoring_range_restarts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episode.mp3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"0123456789".to_vec(), "audio/mpeg"),
        )
        .mount(&server)
        .await;

    let stream = http()
        .open(&request(format!("{}/episode.mp3", server.uri()), 4))
        .await
        .unwrap();

    assert!(!stream.resumed, "a 200 answer starts from byte 0");
    assert_eq!(stream.total_size, Some(10));
}

#[tokio::test]
async fn test_range_not_satisfiable_means_complete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/episode.mp3"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;

    let stream = http()
        .open(&request(format!("{}/episode.mp3", server.uri()), 10))
        .await
        .unwrap();

    assert!(stream.resumed);
    assert_eq!(stream.total_size, Some(10));
    assert!(body_of(stream).await.is_empty());
}

#[tokio::test]
async fn test_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.mp3"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.mp3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = http()
        .open(&request(format!("{}/private.mp3", server.uri()), 0))
        .await
        .unwrap_err();
    assert_eq!(err, DownloadError::AuthenticationRequired);

    let err = http()
        .open(&request(format!("{}/missing.mp3", server.uri()), 0))
        .await
        .unwrap_err();
    assert_eq!(err, DownloadError::HttpStatus { status: 404 });
}

#[tokio::test]
async fn test_credentials_sent_as_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.mp3"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"ok".to_vec(), "audio/mpeg"))
        .mount(&server)
        .await;

    let mut req = request(format!("{}/private.mp3", server.uri()), 0);
    req.credentials = Some(Credentials {
        username: "user".to_string(),
        password: "secret".to_string(),
    });
    let stream = http().open(&req).await.unwrap();
    assert_eq!(body_of(stream).await, b"ok");
}

#[tokio::test]
async fn test_unreachable_host_is_transfer_error() {
    let err = http()
        .open(&request("http://127.0.0.1:1/episode.mp3".to_string(), 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Transfer(_)), "got {err:?}");
}

#[test]
fn test_content_range_total() {
    assert_eq!(content_range_total("bytes 100-199/1000"), Some(1000));
    assert_eq!(content_range_total("bytes */1000"), Some(1000));
    assert_eq!(content_range_total("bytes 0-99/*"), None);
    assert_eq!(content_range_total("garbage"), None);
}

struct Claims {
    prefix: &'static str,
    executor: Arc<FakeTransfer>,
}

impl CustomDownloader for Claims {
    fn resolve(&self, url: &str) -> Option<Arc<dyn TransferExecutor>> {
        url.starts_with(self.prefix)
            .then(|| self.executor.clone() as Arc<dyn TransferExecutor>)
    }
}

#[tokio::test]
async fn test_registry_prefers_custom_downloaders() {
    let default = Arc::new(FakeTransfer::quick());
    let custom = Arc::new(FakeTransfer::quick());
    let registry = TransferRegistry::new(default.clone());
    registry.register(Arc::new(Claims {
        prefix: "https://video.example.com/",
        executor: custom.clone(),
    }));

    let executor = registry.executor_for("https://video.example.com/watch?v=1");
    executor
        .open(&request("https://video.example.com/watch?v=1".to_string(), 0))
        .await
        .unwrap();
    let executor = registry.executor_for("http://example.com/episode.mp3");
    executor
        .open(&request("http://example.com/episode.mp3".to_string(), 0))
        .await
        .unwrap();

    assert_eq!(custom.requests().len(), 1);
    assert_eq!(default.requests().len(), 1);
    assert_eq!(default.requests()[0].url, "http://example.com/episode.mp3");
}
