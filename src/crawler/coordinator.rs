//! Crawler coordinator - main crawl orchestration logic
//!
//! This module ties the pieces of a crawl together:
//! - Starting the WARC writer (fatal if it cannot start)
//! - Keeping a simple in-memory frontier of items
//! - Running a bounded number of captures concurrently
//! - Feeding outlinks back into the frontier within the hop limit
//! - Tearing down: draining producers, then shutting the writer down

use crate::config::Config;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::render::Renderer;
use crate::crawler::{Capturer, CrawlContext, Item};
use crate::spool::SpoolSettings;
use crate::warc::{RotatorSettings, WarcWriter};
use crate::ArchiverError;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Totals for a finished crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Items captured successfully
    pub captured: u64,

    /// Items whose capture failed
    pub failed: u64,

    /// WARC segments written
    pub segments: u64,

    /// WARC records written (warcinfo excluded)
    pub records: u64,
}

/// FIFO of items still to capture, de-duplicated by hash
#[derive(Debug, Default)]
struct Frontier {
    queue: VecDeque<Item>,
    seen: HashSet<String>,
}

impl Frontier {
    fn push(&mut self, item: Item) -> bool {
        if self.seen.insert(item.hash.clone()) {
            self.queue.push_back(item);
            true
        } else {
            false
        }
    }

    fn pop(&mut self) -> Option<Item> {
        self.queue.pop_front()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Runs a complete crawl
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `fetcher` - Direct fetch capability
/// * `renderer` - Headless rendering capability, used when the
///   configuration enables headless mode
/// * `shutdown` - Cancelling this stops new captures and aborts running ones
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl finished and every segment was closed
/// * `Err(ArchiverError)` - The writer could not start or died mid-crawl
pub async fn run_crawl(
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    shutdown: CancellationToken,
) -> Result<CrawlSummary, ArchiverError> {
    let mut frontier = Frontier::default();
    for seed in &config.seeds {
        frontier.push(Item::seed(Url::parse(seed)?));
    }

    let writer = WarcWriter::start(
        RotatorSettings::from_config(&config),
        SpoolSettings::from_config(&config),
    )
    .await?;

    let ctx = Arc::new(CrawlContext::new(
        writer.handle(),
        writer.spool().clone(),
        config.crawl.job_path.clone(),
    ));

    let mut capturer = Capturer::new(Arc::clone(&ctx), fetcher, config.crawl.max_hops);
    if config.crawl.headless {
        match renderer {
            Some(renderer) => capturer = capturer.with_renderer(renderer),
            None => tracing::warn!("Headless mode enabled but no renderer given; fetching directly"),
        }
    }
    let capturer = Arc::new(capturer);
    tracing::info!(
        seeds = frontier.len(),
        workers = config.crawl.workers,
        max_hops = config.crawl.max_hops,
        "Starting crawl"
    );

    let outcome = crawl_loop(
        &capturer,
        &mut frontier,
        config.crawl.workers,
        config.crawl.max_hops,
        &shutdown,
    )
    .await;

    // Teardown order: producers, then every handle, then the writer itself
    ctx.drain_producers().await;
    drop(capturer);
    drop(ctx);
    let written = writer.shutdown().await;

    let mut summary = outcome?;
    let written = written?;
    summary.segments = written.segments;
    summary.records = written.records;

    tracing::info!(
        captured = summary.captured,
        failed = summary.failed,
        segments = summary.segments,
        records = summary.records,
        "Crawl finished"
    );
    Ok(summary)
}

async fn crawl_loop(
    capturer: &Arc<Capturer>,
    frontier: &mut Frontier,
    workers: usize,
    max_hops: u32,
    shutdown: &CancellationToken,
) -> Result<CrawlSummary, ArchiverError> {
    let mut summary = CrawlSummary::default();
    let mut running = JoinSet::new();
    let start_time = Instant::now();

    loop {
        while running.len() < workers.max(1) && !shutdown.is_cancelled() {
            let Some(item) = frontier.pop() else { break };
            let capturer = Arc::clone(capturer);
            let cancel = shutdown.child_token();
            running.spawn(async move {
                let result = capturer.capture(&item, &cancel).await;
                (item, result)
            });
        }

        let Some(joined) = running.join_next().await else {
            break;
        };
        let (item, result) = joined?;

        match result {
            Ok(outlinks) => {
                summary.captured += 1;
                let next_hop = item.hop + 1;
                if next_hop <= max_hops {
                    for url in outlinks {
                        frontier.push(Item::new(url, next_hop));
                    }
                }
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "Archival failed, stopping crawl");
                shutdown.cancel();
                running.shutdown().await;
                return Err(e);
            }
            Err(_) => summary.failed += 1,
        }

        let done = summary.captured + summary.failed;
        if done % 10 == 0 {
            tracing::info!(
                "Progress: {} pages captured, {} failed, {} in frontier, {:.2} pages/sec",
                summary.captured,
                summary.failed,
                frontier.len(),
                done as f64 / start_time.elapsed().as_secs_f64()
            );
        }
    }

    if shutdown.is_cancelled() {
        tracing::info!(remaining = frontier.len(), "Crawl interrupted");
    } else {
        tracing::info!("Frontier is empty, crawl complete");
    }
    Ok(summary)
}
