//! Capture orchestration
//!
//! For each item the orchestrator picks a strategy (direct fetch or browser
//! render), runs it, hands the resulting exchange to the WARC writer and
//! returns the outlinks it found. Every capture call, successful or not,
//! counts once against the shared rate counter.

use crate::crawler::fetcher::{version_str, FetchedResponse, Fetcher, RequestMeta};
use crate::crawler::parser::{extract_outlinks, resolve_link};
use crate::crawler::render::{spawn_observer, Renderer, EVENT_BUFFER};
use crate::crawler::{CrawlContext, Item};
use crate::spool::SpoolGuard;
use crate::warc::{host_with_port, Record, RecordBatch, RecordContent};
use crate::ArchiverError;
use reqwest::header::{HeaderMap, CONTENT_TYPE, HOST, LOCATION, TRANSFER_ENCODING};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Bodies at least this large, or of unknown length, are spooled to disk
pub const SPOOL_THRESHOLD: u64 = 2 * 1024 * 1024;

/// How much of a spooled body is also kept in memory for outlink extraction
const MAX_OUTLINK_SCAN_BYTES: usize = 8 * 1024 * 1024;

/// Path extensions that never need a browser to render
const STATIC_EXTENSIONS: &[&str] = &[
    "7z", "avi", "bmp", "bz2", "css", "csv", "doc", "docx", "eot", "epub", "exe", "flac",
    "gif", "gz", "ico", "iso", "jpeg", "jpg", "js", "json", "m4a", "mkv", "mov", "mp3",
    "mp4", "mpeg", "odt", "ogg", "otf", "pdf", "png", "ppt", "pptx", "rar", "rss", "svg",
    "tar", "tgz", "tif", "tiff", "ttf", "txt", "wav", "webm", "webp", "woff", "woff2", "xls",
    "xlsx", "xml", "xz", "zip",
];

/// How an item gets captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One plain GET
    Direct,
    /// A headless browser session
    Rendered,
}

/// Cheap check: does this resource plausibly need script execution?
///
/// Only the URL is inspected; anything that looks like a static asset or
/// document download is fetched directly.
pub fn needs_browser(item: &Item) -> bool {
    let last_segment = item
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    match last_segment.rsplit_once('.') {
        Some((_, ext)) => !STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

/// Runs captures for crawl workers
pub struct Capturer {
    ctx: Arc<CrawlContext>,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    headless: bool,
    max_hops: u32,
}

impl Capturer {
    /// A capturer that only fetches directly
    pub fn new(ctx: Arc<CrawlContext>, fetcher: Arc<dyn Fetcher>, max_hops: u32) -> Self {
        Self {
            ctx,
            fetcher,
            renderer: None,
            headless: false,
            max_hops,
        }
    }

    /// Enables headless rendering through `renderer`
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self.headless = true;
        self
    }

    pub fn context(&self) -> &Arc<CrawlContext> {
        &self.ctx
    }

    /// Picks the strategy for an item
    pub fn strategy(&self, item: &Item) -> Strategy {
        if self.headless && self.renderer.is_some() && needs_browser(item) {
            Strategy::Rendered
        } else {
            Strategy::Direct
        }
    }

    /// Captures one item and returns its outlinks
    ///
    /// # Returns
    ///
    /// * `Ok(HashSet<Url>)` - The exchange was archived (direct fetch) or
    ///   rendered; the set holds the outlinks found
    /// * `Err(ArchiverError)` - The capture failed or was cancelled; no
    ///   outlinks are produced and any spool file is already gone
    pub async fn capture(
        &self,
        item: &Item,
        cancel: &CancellationToken,
    ) -> Result<HashSet<Url>, ArchiverError> {
        let result = match (self.strategy(item), &self.renderer) {
            (Strategy::Rendered, Some(renderer)) => {
                self.capture_rendered(item, renderer.as_ref(), cancel).await
            }
            _ => self.capture_direct(item, cancel).await,
        };

        // A failed attempt consumed rate budget too
        self.ctx.rate().increment();

        if let Err(e) = &result {
            tracing::warn!(hash = %item.hash, hop = item.hop, error = %e, "Capture failed: {}", item.url);
        }
        result
    }

    async fn capture_direct(
        &self,
        item: &Item,
        cancel: &CancellationToken,
    ) -> Result<HashSet<Url>, ArchiverError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(item)),
            response = self.fetcher.fetch(&item.url) => response?,
        };

        tracing::info!(
            rate = self.ctx.rate().rate(),
            status_code = response.status.as_u16(),
            hash = %item.hash,
            hop = item.hop,
            "{}",
            item.url
        );

        let exchange = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(item)),
            exchange = self.assemble_exchange(item, response) => exchange?,
        };
        let Exchange {
            records,
            spool,
            outlinks,
        } = exchange;

        let (batch, done) = RecordBatch::assemble(records);
        tokio::select! {
            // Not sent if cancelled; the spool guard then deletes the file
            _ = cancel.cancelled() => return Err(cancelled(item)),
            submitted = self.ctx.writer().submit(batch) => submitted?,
        }

        // Once submitted, the spool file is only removed after the writer
        // has finished reading it, even if the capture was cancelled
        if let Some(done) = done {
            let written = done.wait().await;
            if let Some(spool) = spool {
                let path = spool.path().to_path_buf();
                if let Err(e) = spool.remove().await {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove spool file");
                }
            }
            written?;
        }

        Ok(outlinks)
    }

    /// Reads the response and builds the `[response, request]` records
    async fn assemble_exchange(
        &self,
        item: &Item,
        mut response: FetchedResponse,
    ) -> Result<Exchange, ArchiverError> {
        let head = dump_response_head(&response);
        let scan_html = is_html(&response.headers);

        let (content, spool, scanned) = match response.content_length {
            Some(len) if len < SPOOL_THRESHOLD => {
                let mut body = Vec::with_capacity(len as usize);
                response.body.read_to_end(&mut body).await?;

                let mut block = head;
                block.extend_from_slice(&body);
                (RecordContent::Memory(block), None, body)
            }
            _ => {
                let (guard, mut file) = self.ctx.spool().allocate().await?;
                // On error the guard drops and deletes the partial file
                let scanned = spool_body(&mut response.body, &mut file, MAX_OUTLINK_SCAN_BYTES).await?;
                drop(file);

                let content = RecordContent::Spooled {
                    head,
                    payload_path: guard.path().to_path_buf(),
                };
                (content, Some(guard), scanned)
            }
        };

        let request_dump = match dump_request(&response.request) {
            Ok(dump) => dump,
            Err(e) => {
                if let Some(guard) = spool {
                    if let Err(remove_err) = guard.remove().await {
                        tracing::warn!(error = %remove_err, "Failed to remove spool file");
                    }
                }
                return Err(e);
            }
        };

        let mut outlinks = HashSet::new();
        if scan_html {
            outlinks = extract_outlinks(&String::from_utf8_lossy(&scanned), &response.request.url);
        }
        if response.status.is_redirection() {
            if let Some(location) = response
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| resolve_link(v, &response.request.url))
            {
                outlinks.insert(location);
            }
        }

        let target = &response.request.url;
        let records = vec![
            Record::response(target, content),
            Record::request(target, RecordContent::Memory(request_dump)),
        ];

        tracing::debug!(
            hash = %item.hash,
            spooled = spool.is_some(),
            outlinks = outlinks.len(),
            "Assembled exchange"
        );

        Ok(Exchange {
            records,
            spool,
            outlinks,
        })
    }

    async fn capture_rendered(
        &self,
        item: &Item,
        renderer: &dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<HashSet<Url>, ArchiverError> {
        // Without further hops the DOM is never needed
        let want_dom = self.max_hops > 0;

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let observer = spawn_observer(item.clone(), Arc::clone(&self.ctx), events_rx);

        // The sender moves into the render; dropping it ends the observer
        let rendered = tokio::select! {
            _ = cancel.cancelled() => Err(cancelled(item)),
            rendered = renderer.render(&item.url, want_dom, events_tx) => rendered,
        };

        let observed = observer.await?;
        tracing::debug!(
            hash = %item.hash,
            responses = observed.responses,
            exchanges = observed.exchanges,
            loaded = observed.loaded,
            "Render finished"
        );

        let dom = rendered?;
        Ok(match dom {
            Some(html) if want_dom => extract_outlinks(&html, &item.url),
            _ => HashSet::new(),
        })
    }
}

/// Records produced by a direct fetch, plus the spool file backing them
struct Exchange {
    records: Vec<Record>,
    spool: Option<SpoolGuard>,
    outlinks: HashSet<Url>,
}

fn cancelled(item: &Item) -> ArchiverError {
    ArchiverError::Cancelled {
        url: item.url.to_string(),
    }
}

/// True unless the response declares a non-HTML content type
fn is_html(headers: &HeaderMap) -> bool {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(content_type) => content_type.to_ascii_lowercase().contains("html"),
        None => true,
    }
}

/// Streams the body into the spool file, keeping up to `scan_limit` bytes
/// in memory for outlink extraction
async fn spool_body<R, W>(body: &mut R, file: &mut W, scan_limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut scanned = Vec::new();

    loop {
        let n = body.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;

        let room = scan_limit.saturating_sub(scanned.len());
        scanned.extend_from_slice(&buf[..n.min(room)]);
    }

    // The file must be complete before the batch is submitted
    file.flush().await?;
    Ok(scanned)
}

/// Status line and headers of a response, as they would appear on the wire
///
/// `Transfer-Encoding` is left out because the stored body is de-chunked.
fn dump_response_head(response: &FetchedResponse) -> Vec<u8> {
    let mut head = Vec::new();
    let reason = response.status.canonical_reason().unwrap_or("");
    // Writes into a Vec cannot fail
    let _ = write!(
        head,
        "{} {} {}\r\n",
        version_str(response.version),
        response.status.as_u16(),
        reason
    );
    write_headers(&mut head, &response.headers, |name| *name == TRANSFER_ENCODING);
    head.extend_from_slice(b"\r\n");
    head
}

/// Reconstructs the request from the metadata of the outgoing request
pub(crate) fn dump_request(request: &RequestMeta) -> Result<Vec<u8>, ArchiverError> {
    let host = host_with_port(&request.url).ok_or_else(|| ArchiverError::RequestDump {
        url: request.url.to_string(),
        message: "request URL has no host".to_string(),
    })?;

    let mut target = request.url.path().to_string();
    if let Some(query) = request.url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut dump = Vec::new();
    let _ = write!(
        dump,
        "{} {} {}\r\nHost: {}\r\n",
        request.method,
        target,
        version_str(request.version),
        host
    );
    write_headers(&mut dump, &request.headers, |name| *name == HOST);
    dump.extend_from_slice(b"\r\n");
    Ok(dump)
}

fn write_headers(
    out: &mut Vec<u8>,
    headers: &HeaderMap,
    skip: impl Fn(&reqwest::header::HeaderName) -> bool,
) {
    for (name, value) in headers {
        if skip(name) {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}
