//! Shared state for every capture worker of one crawl

use crate::crawler::fetcher::ByteStream;
use crate::crawler::stream::write_exchange_from_streams;
use crate::crawler::RateCounter;
use crate::spool::SpoolDir;
use crate::warc::WriterHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use url::Url;

/// Crawl-wide context shared by all capture workers
///
/// Created once at startup. Teardown is explicit: [`drain_producers`]
/// waits for background exchange writers, after which dropping the context
/// releases its writer handle so the writer can shut down.
///
/// [`drain_producers`]: CrawlContext::drain_producers
#[derive(Debug)]
pub struct CrawlContext {
    writer: WriterHandle,
    spool: SpoolDir,
    producers: TaskTracker,
    job_path: PathBuf,
    rate: Arc<RateCounter>,
}

impl CrawlContext {
    pub fn new(writer: WriterHandle, spool: SpoolDir, job_path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            spool,
            producers: TaskTracker::new(),
            job_path: job_path.into(),
            rate: Arc::new(RateCounter::new()),
        }
    }

    pub fn writer(&self) -> &WriterHandle {
        &self.writer
    }

    pub fn spool(&self) -> &SpoolDir {
        &self.spool
    }

    pub fn job_path(&self) -> &Path {
        &self.job_path
    }

    pub fn rate(&self) -> &Arc<RateCounter> {
        &self.rate
    }

    /// Archives a streamed exchange in the background
    ///
    /// The task is tracked so teardown can wait for it.
    pub fn spawn_exchange_writer(&self, url: Url, request: ByteStream, response: ByteStream) {
        let writer = self.writer.clone();
        self.producers.spawn(async move {
            if let Err(e) = write_exchange_from_streams(&writer, &url, request, response).await {
                tracing::error!(url = %url, error = %e, "Failed to archive streamed exchange");
            }
        });
    }

    /// Number of background exchange writers still running
    pub fn producers_in_flight(&self) -> usize {
        self.producers.len()
    }

    /// Stops accepting new background writers and waits for the running ones
    pub async fn drain_producers(&self) {
        self.producers.close();
        self.producers.wait().await;
    }
}
