//! Integration tests for capturing items
//!
//! The writer side is a bare [`WriterHandle::channel`], so each test sees
//! exactly the batches a capture submits. Direct fetches go through
//! wiremock or in-process fake fetchers.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{StatusCode, Version};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_archiver::config::UserAgentConfig;
use sumi_archiver::crawler::{
    BrowserEvent, ByteStream, Capturer, CrawlContext, FetchedResponse, Fetcher, HttpFetcher, Item,
    Renderer, RequestMeta, SPOOL_THRESHOLD,
};
use sumi_archiver::spool::SpoolDir;
use sumi_archiver::warc::{RecordBatch, RecordContent, RecordType, WriterHandle};
use sumi_archiver::ArchiverError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIVE_MIB: usize = 5 * 1024 * 1024;

/// Hands out one prepared response, whatever URL is asked for
struct OneShotFetcher {
    response: Mutex<Option<FetchedResponse>>,
}

impl OneShotFetcher {
    fn new(response: FetchedResponse) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Some(response)),
        })
    }
}

#[async_trait]
impl Fetcher for OneShotFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResponse, ArchiverError> {
        self.response
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ArchiverError::Render {
                url: url.to_string(),
                message: "already fetched".to_string(),
            })
    }
}

/// Reports a page load plus one streamed exchange, and remembers whether
/// the DOM was asked for
struct FakeRenderer {
    want_dom_seen: Mutex<Vec<bool>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        url: &Url,
        want_dom: bool,
        events: mpsc::Sender<BrowserEvent>,
    ) -> Result<Option<String>, ArchiverError> {
        self.want_dom_seen.lock().unwrap().push(want_dom);

        let _ = events
            .send(BrowserEvent::ResponseReceived {
                url: url.to_string(),
                status: 200,
                mime_type: Some("text/html".to_string()),
            })
            .await;
        let request: ByteStream = Box::new(Cursor::new(b"GET / HTTP/1.1\r\n\r\n".to_vec()));
        let response: ByteStream =
            Box::new(Cursor::new(b"HTTP/1.1 200 OK\r\n\r\n<html></html>".to_vec()));
        let _ = events
            .send(BrowserEvent::Exchange {
                url: url.clone(),
                request,
                response,
            })
            .await;
        let _ = events.send(BrowserEvent::LoadEventFired).await;

        Ok(want_dom.then(|| r#"<a href="/rendered-link">next</a>"#.to_string()))
    }
}

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

async fn test_context(job: &Path) -> (Arc<CrawlContext>, mpsc::Receiver<RecordBatch>) {
    let spool = SpoolDir::create(job.join("temp")).await.unwrap();
    let (writer, rx) = WriterHandle::channel(8);
    (Arc::new(CrawlContext::new(writer, spool, job)), rx)
}

fn spool_file_count(job: &Path) -> usize {
    std::fs::read_dir(job.join("temp")).unwrap().count()
}

fn fake_response(url: &str, content_length: Option<u64>, body: ByteStream) -> FetchedResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    FetchedResponse {
        status: StatusCode::OK,
        version: Version::HTTP_11,
        headers,
        content_length,
        body,
        request: RequestMeta {
            method: "GET".to_string(),
            url: Url::parse(url).unwrap(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        },
    }
}

fn item(url: &str) -> Item {
    Item::seed(Url::parse(url).unwrap())
}

#[tokio::test]
async fn test_small_page_is_buffered_with_outlinks() {
    let server = MockServer::start().await;
    let mut html = String::from(r#"<html><body><a href="/next">next</a>"#);
    html.push_str(&" ".repeat(500 - html.len() - "</body></html>".len()));
    html.push_str("</body></html>");
    assert_eq!(html.len(), 500);

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.clone(), "text/html"))
        .mount(&server)
        .await;

    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;
    let fetcher = Arc::new(HttpFetcher::new(&user_agent()).unwrap());
    let capturer = Capturer::new(Arc::clone(&ctx), fetcher, 1);

    let url = format!("{}/start", server.uri());
    let outlinks = capturer
        .capture(&item(&url), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outlinks.len(), 1);
    assert!(outlinks.contains(&Url::parse(&format!("{}/next", server.uri())).unwrap()));

    let batch = rx.recv().await.unwrap();
    assert!(!batch.is_spooled());
    let records = batch.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].record_type(), RecordType::Response);
    assert_eq!(records[1].record_type(), RecordType::Request);
    assert_eq!(records[0].target_uri(), Some(url.as_str()));
    assert_eq!(records[1].target_uri(), Some(url.as_str()));

    let RecordContent::Memory(block) = records[0].content() else {
        panic!("small body should stay in memory");
    };
    let text = String::from_utf8(block.clone()).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body.len(), 500);
    assert_eq!(body, html);

    let RecordContent::Memory(request) = records[1].content() else {
        panic!("request should be in memory");
    };
    let request = String::from_utf8(request.clone()).unwrap();
    assert!(request.starts_with("GET /start HTTP/1.1\r\n"));

    assert_eq!(spool_file_count(job.path()), 0);
    assert_eq!(ctx.rate().total(), 1);
}

/// Captures a body of exactly `len` declared bytes and returns whether the
/// response record was spooled
async fn capture_declared_length(len: usize) -> bool {
    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;

    let body: ByteStream = Box::new(Cursor::new(vec![b'b'; len]));
    let fetcher = OneShotFetcher::new(fake_response(
        "https://example.com/edge.bin",
        Some(len as u64),
        body,
    ));
    let capturer = Arc::new(Capturer::new(Arc::clone(&ctx), fetcher, 0));

    let task = {
        let capturer = Arc::clone(&capturer);
        tokio::spawn(async move {
            capturer
                .capture(&item("https://example.com/edge.bin"), &CancellationToken::new())
                .await
        })
    };

    let batch = rx.recv().await.unwrap();
    let spooled = batch.is_spooled();
    let response = batch.records()[0].content().clone();
    match &response {
        RecordContent::Memory(block) => {
            let body_start = block.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
            assert_eq!(block.len() - body_start, len);
        }
        RecordContent::Spooled { payload_path, .. } => {
            assert_eq!(std::fs::metadata(payload_path).unwrap().len(), len as u64);
        }
    }

    batch.complete();
    task.await.unwrap().unwrap();
    assert_eq!(spool_file_count(job.path()), 0);
    spooled
}

#[tokio::test]
async fn test_body_just_below_threshold_stays_in_memory() {
    assert!(!capture_declared_length(SPOOL_THRESHOLD as usize - 1).await);
}

#[tokio::test]
async fn test_body_at_threshold_is_spooled() {
    assert!(capture_declared_length(SPOOL_THRESHOLD as usize).await);
}

#[tokio::test]
async fn test_unknown_length_body_is_spooled_then_removed() {
    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;

    let body: ByteStream = Box::new(Cursor::new(vec![b'x'; FIVE_MIB]));
    let fetcher = OneShotFetcher::new(fake_response("https://example.com/big.bin", None, body));
    let capturer = Arc::new(Capturer::new(Arc::clone(&ctx), fetcher, 0));

    let task = {
        let capturer = Arc::clone(&capturer);
        tokio::spawn(async move {
            capturer
                .capture(&item("https://example.com/big.bin"), &CancellationToken::new())
                .await
        })
    };

    let batch = rx.recv().await.unwrap();
    assert!(batch.is_spooled());

    let payload = batch.records()[0].payload_path().unwrap().to_path_buf();
    assert_eq!(std::fs::metadata(&payload).unwrap().len(), FIVE_MIB as u64);
    assert!(batch.records()[1].payload_path().is_none());

    // Still in use until the writer signals completion
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(payload.exists());
    assert!(!task.is_finished());

    batch.complete();
    let outlinks = task.await.unwrap().unwrap();

    assert!(outlinks.is_empty());
    assert!(!payload.exists());
    assert_eq!(spool_file_count(job.path()), 0);
}

#[tokio::test]
async fn test_rejected_spooled_batch_still_cleans_up() {
    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;

    let body: ByteStream = Box::new(Cursor::new(vec![b'y'; 3 * 1024 * 1024]));
    let fetcher = OneShotFetcher::new(fake_response(
        "https://example.com/big.bin",
        Some(3 * 1024 * 1024),
        body,
    ));
    let capturer = Arc::new(Capturer::new(Arc::clone(&ctx), fetcher, 0));

    let task = {
        let capturer = Arc::clone(&capturer);
        tokio::spawn(async move {
            capturer
                .capture(&item("https://example.com/big.bin"), &CancellationToken::new())
                .await
        })
    };

    let batch = rx.recv().await.unwrap();
    batch.reject("payload vanished");

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ArchiverError::BatchRejected(_))));
    assert_eq!(spool_file_count(job.path()), 0);
}

#[tokio::test]
async fn test_request_without_host_fails_and_removes_spool_file() {
    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;

    let body: ByteStream = Box::new(Cursor::new(vec![b'z'; 4096]));
    let fetcher = OneShotFetcher::new(fake_response("data:text/plain,hello", None, body));
    let capturer = Capturer::new(Arc::clone(&ctx), fetcher, 0);

    let result = capturer
        .capture(&item("https://example.com/odd"), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ArchiverError::RequestDump { .. })));
    assert_eq!(spool_file_count(job.path()), 0);
    assert!(rx.try_recv().is_err());

    // Failed captures still count against the rate
    assert_eq!(ctx.rate().total(), 1);
}

#[tokio::test]
async fn test_cancel_while_spooling_leaves_no_files() {
    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;

    // The body never ends while `feed` is alive
    let (body, mut feed) = tokio::io::duplex(64 * 1024);
    let fetcher = OneShotFetcher::new(fake_response(
        "https://example.com/endless",
        None,
        Box::new(body),
    ));
    let capturer = Arc::new(Capturer::new(Arc::clone(&ctx), fetcher, 0));
    let cancel = CancellationToken::new();

    let task = {
        let capturer = Arc::clone(&capturer);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            capturer
                .capture(&item("https://example.com/endless"), &cancel)
                .await
        })
    };

    tokio::io::AsyncWriteExt::write_all(&mut feed, &[b'q'; 1024])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(spool_file_count(job.path()), 1);

    cancel.cancel();
    let result = task.await.unwrap();

    assert!(matches!(result, Err(ArchiverError::Cancelled { .. })));
    assert_eq!(spool_file_count(job.path()), 0);
    assert!(rx.try_recv().is_err());
    drop(feed);
}

#[tokio::test]
async fn test_render_without_hops_skips_dom() {
    let job = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(job.path()).await;

    let renderer = Arc::new(FakeRenderer {
        want_dom_seen: Mutex::new(Vec::new()),
    });
    let fetcher = OneShotFetcher::new(fake_response(
        "https://example.com/",
        Some(0),
        Box::new(Cursor::new(Vec::new())),
    ));
    let capturer = Capturer::new(Arc::clone(&ctx), fetcher, 0).with_renderer(renderer.clone());

    let outlinks = capturer
        .capture(&item("https://example.com/page"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outlinks.is_empty());
    assert_eq!(*renderer.want_dom_seen.lock().unwrap(), vec![false]);

    // The streamed exchange is archived by a background producer
    ctx.drain_producers().await;
    let batch = rx.recv().await.unwrap();
    let types: Vec<RecordType> = batch.records().iter().map(|r| r.record_type()).collect();
    assert_eq!(types, vec![RecordType::Request, RecordType::Response]);
}

#[tokio::test]
async fn test_render_with_hops_extracts_dom_outlinks() {
    let job = tempfile::tempdir().unwrap();
    let (ctx, _rx) = test_context(job.path()).await;

    let renderer = Arc::new(FakeRenderer {
        want_dom_seen: Mutex::new(Vec::new()),
    });
    let fetcher = OneShotFetcher::new(fake_response(
        "https://example.com/",
        Some(0),
        Box::new(Cursor::new(Vec::new())),
    ));
    let capturer = Capturer::new(Arc::clone(&ctx), fetcher, 2).with_renderer(renderer.clone());

    let outlinks = capturer
        .capture(&item("https://example.com/page"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*renderer.want_dom_seen.lock().unwrap(), vec![true]);
    assert_eq!(outlinks.len(), 1);
    assert!(outlinks.contains(&Url::parse("https://example.com/rendered-link").unwrap()));
    ctx.drain_producers().await;
}
