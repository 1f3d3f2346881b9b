//! WARC output
//!
//! This module contains everything between a captured HTTP exchange and
//! the bytes on disk:
//! - The record model (buffered or spool-backed content)
//! - Record batches with an optional completion signal
//! - Rotator settings shared by every segment of a crawl
//! - The serialized writer that rotates and compresses segments

mod batch;
mod record;
mod rotator;
mod settings;
mod writer;

pub use batch::{BatchDone, RecordBatch};
pub use record::{Record, RecordContent, RecordType};
pub use rotator::WriterSummary;
pub use settings::{RotatorSettings, SOFTWARE};
pub use writer::{WarcWriter, WriterHandle};

pub(crate) use record::host_with_port;
