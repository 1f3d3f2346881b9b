//! The archival writer: a single serialized consumer of record batches
//!
//! Capture workers hold cheap [`WriterHandle`] clones and submit batches
//! into a bounded queue. One blocking thread drains the queue in receipt
//! order and owns the open segment. When the queue is full, `submit` waits,
//! which throttles capture to archival throughput.

use crate::spool::{SpoolDir, SpoolSettings, Sweeper};
use crate::warc::rotator::{BatchError, SegmentRotator, WriterSummary};
use crate::warc::{RecordBatch, RotatorSettings};
use crate::ArchiverError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sending side of the writer's handoff queue
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<RecordBatch>,
}

impl WriterHandle {
    /// Creates a handle and the receiving end of its queue
    ///
    /// [`WarcWriter::start`] uses this internally; it is public so tests and
    /// alternative sinks can observe batches directly.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RecordBatch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues a batch, waiting while the queue is full
    ///
    /// Fails with [`ArchiverError::WriterClosed`] once the writer has stopped.
    pub async fn submit(&self, batch: RecordBatch) -> Result<(), ArchiverError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| ArchiverError::WriterClosed)
    }

    /// Returns true if the writer is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A running archival writer and the spool sweeper tied to its lifetime
pub struct WarcWriter {
    handle: WriterHandle,
    spool: SpoolDir,
    worker: JoinHandle<Result<WriterSummary, ArchiverError>>,
    sweeper: Sweeper,
}

impl WarcWriter {
    /// Creates the output and spool directories, opens the first segment
    /// and starts the writer thread and the spool sweeper
    ///
    /// Any failure here is fatal for the crawl and is reported before any
    /// capture work begins.
    pub async fn start(
        settings: RotatorSettings,
        spool_settings: SpoolSettings,
    ) -> Result<Self, ArchiverError> {
        let spool = SpoolDir::create(&spool_settings.dir).await.map_err(|e| {
            ArchiverError::WriterInit(format!(
                "cannot create spool directory {}: {}",
                spool_settings.dir.display(),
                e
            ))
        })?;

        let output = settings.output_directory.clone();
        let capacity = settings.queue_capacity;
        let rotator = tokio::task::spawn_blocking(move || SegmentRotator::open(settings))
            .await?
            .map_err(|e| {
                ArchiverError::WriterInit(format!(
                    "cannot open WARC output in {}: {}",
                    output.display(),
                    e
                ))
            })?;

        let (handle, rx) = WriterHandle::channel(capacity);
        let worker = tokio::task::spawn_blocking(move || run_worker(rotator, rx));
        let sweeper = Sweeper::spawn(
            spool.clone(),
            spool_settings.sweep_interval,
            spool_settings.grace_period,
        );

        tracing::info!(
            output = %output.display(),
            spool = %spool.path().display(),
            "WARC writer started"
        );

        Ok(Self {
            handle,
            spool,
            worker,
            sweeper,
        })
    }

    /// A new handle onto the writer's queue
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// The spool directory managed alongside this writer
    pub fn spool(&self) -> &SpoolDir {
        &self.spool
    }

    /// Closes the queue, waits for every queued batch to be written, closes
    /// the last segment and stops the sweeper
    ///
    /// The queue only closes once every [`WriterHandle`] clone is dropped,
    /// so callers drop their handles (and wait for producers) first.
    pub async fn shutdown(self) -> Result<WriterSummary, ArchiverError> {
        let WarcWriter {
            handle,
            spool: _,
            worker,
            sweeper,
        } = self;
        drop(handle);

        let result = worker.await;
        sweeper.stop().await;

        let summary = result??;
        tracing::info!(
            segments = summary.segments,
            records = summary.records,
            rejected = summary.rejected_batches,
            "WARC writer finished"
        );
        Ok(summary)
    }
}

/// Drains the queue until every sender is gone
fn run_worker(
    mut rotator: SegmentRotator,
    mut rx: mpsc::Receiver<RecordBatch>,
) -> Result<WriterSummary, ArchiverError> {
    while let Some(batch) = rx.blocking_recv() {
        match rotator.write_batch(&batch) {
            Ok(()) => batch.complete(),
            Err(BatchError::Payload(e)) => {
                tracing::error!(error = %e, "Skipping batch with unreadable spool payload");
                rotator.note_rejected();
                batch.reject(e.to_string());
            }
            Err(BatchError::Output(e)) => {
                tracing::error!(error = %e, "Failed to write WARC segment");
                // Dropping the receiver makes every later submit fail
                return Err(ArchiverError::Writer(e.to_string()));
            }
        }
    }

    rotator
        .finish()
        .map_err(|e| ArchiverError::Writer(format!("cannot close segment: {}", e)))
}
