//! Record batches: the unit of work handed to the WARC writer

use crate::warc::Record;
use crate::ArchiverError;
use tokio::sync::oneshot;

/// Outcome the writer reports for a spooled batch
type BatchOutcome = std::result::Result<(), String>;

/// A group of records written atomically, in order
///
/// A batch whose records reference spool files carries a completion
/// sender; the producer keeps the matching [`BatchDone`] and must not delete
/// the spool files before it resolves. Batches without spool files are
/// fire-and-forget.
#[derive(Debug)]
pub enum RecordBatch {
    /// Every record is held in memory
    Buffered { records: Vec<Record> },

    /// At least one record is backed by a spool file
    Spooled {
        records: Vec<Record>,
        done: oneshot::Sender<BatchOutcome>,
    },
}

impl RecordBatch {
    /// Groups records into a batch, picking the variant from their content
    ///
    /// Returns a [`BatchDone`] exactly when some record is spooled to disk.
    pub fn assemble(records: Vec<Record>) -> (Self, Option<BatchDone>) {
        if records.iter().any(|r| r.payload_path().is_some()) {
            let (tx, rx) = oneshot::channel();
            (
                RecordBatch::Spooled { records, done: tx },
                Some(BatchDone { rx }),
            )
        } else {
            (RecordBatch::Buffered { records }, None)
        }
    }

    /// Records in write order
    pub fn records(&self) -> &[Record] {
        match self {
            RecordBatch::Buffered { records } | RecordBatch::Spooled { records, .. } => records,
        }
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, RecordBatch::Spooled { .. })
    }

    /// Signals that every record has been consumed
    ///
    /// Consumes the batch, so the signal fires at most once.
    pub fn complete(self) {
        self.finish(Ok(()));
    }

    /// Signals that the batch was dropped without being written
    pub fn reject(self, reason: impl Into<String>) {
        self.finish(Err(reason.into()));
    }

    fn finish(self, outcome: BatchOutcome) {
        if let RecordBatch::Spooled { done, .. } = self {
            // The producer may have given up waiting; nothing to do then
            let _ = done.send(outcome);
        }
    }
}

/// Completion signal for a spooled batch
#[derive(Debug)]
pub struct BatchDone {
    rx: oneshot::Receiver<BatchOutcome>,
}

impl BatchDone {
    /// Waits until the writer is finished with the batch's spool files
    ///
    /// Resolves with [`ArchiverError::WriterClosed`] if the writer went away
    /// without answering; the spool files are no longer read in either case.
    pub async fn wait(self) -> Result<(), ArchiverError> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ArchiverError::BatchRejected(reason)),
            Err(_) => Err(ArchiverError::WriterClosed),
        }
    }
}
