//! Segment rotation and WARC record serialization
//!
//! Everything here is blocking I/O and runs on the writer's dedicated
//! thread. A segment is written as `<name>.open` and renamed to its final
//! name when closed.

use crate::config::CompressionMode;
use crate::warc::settings::OPEN_SUFFIX;
use crate::warc::{Record, RecordBatch, RecordContent, RotatorSettings};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;


/// Totals reported by the writer when it shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterSummary {
    /// Segments closed
    pub segments: u64,

    /// Request/response records written (warcinfo excluded)
    pub records: u64,

    /// Batches dropped because a payload could not be read
    pub rejected_batches: u64,
}

/// Why a batch could not be written
#[derive(Debug)]
pub(crate) enum BatchError {
    /// A spooled payload could not be read; the output is untouched
    Payload(io::Error),

    /// The output segment could not be written; archival is broken
    Output(io::Error),
}

/// Counts bytes as they pass through to the segment file
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct Segment {
    open_path: PathBuf,
    final_path: PathBuf,
    out: CountingWriter<BufWriter<File>>,
    records: u64,
}

/// Owns the output directory, the open segment and the sequence counter
pub(crate) struct SegmentRotator {
    settings: RotatorSettings,
    next_sequence: u32,
    current: Option<Segment>,
    summary: WriterSummary,
}

impl SegmentRotator {
    /// Prepares the output directory and opens the first segment
    pub(crate) fn open(settings: RotatorSettings) -> io::Result<Self> {
        fs::create_dir_all(&settings.output_directory)?;
        let next_sequence = settings.next_free_sequence()?;

        let mut rotator = Self {
            settings,
            next_sequence,
            current: None,
            summary: WriterSummary::default(),
        };
        rotator.ensure_segment()?;
        Ok(rotator)
    }

    /// Writes every record of the batch into one segment
    ///
    /// Spooled payloads are hashed before anything is written, so a missing
    /// payload leaves the segment untouched.
    pub(crate) fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), BatchError> {
        let prepared = batch
            .records()
            .iter()
            .map(|record| block_digest(record.content()).map(|digest| (record, digest)))
            .collect::<io::Result<Vec<_>>>()
            .map_err(BatchError::Payload)?;

        if self.current_is_full() {
            self.close_current().map_err(BatchError::Output)?;
        }

        let compression = self.settings.compression;
        let segment = self.ensure_segment().map_err(BatchError::Output)?;
        for (record, (digest, length)) in &prepared {
            write_record(&mut segment.out, compression, record, digest, *length)
                .map_err(BatchError::Output)?;
            segment.records += 1;
        }
        segment.out.flush().map_err(BatchError::Output)?;

        self.summary.records += prepared.len() as u64;
        Ok(())
    }

    pub(crate) fn note_rejected(&mut self) {
        self.summary.rejected_batches += 1;
    }

    /// Closes the open segment and returns the final totals
    pub(crate) fn finish(mut self) -> io::Result<WriterSummary> {
        self.close_current()?;
        Ok(self.summary)
    }

    fn current_is_full(&self) -> bool {
        match &self.current {
            // A segment holding only its warcinfo record is never full
            Some(segment) if segment.records > 0 => {
                segment.out.written >= self.settings.max_segment_size
                    || (self.settings.max_segment_records > 0
                        && segment.records >= self.settings.max_segment_records)
            }
            _ => false,
        }
    }

    fn ensure_segment(&mut self) -> io::Result<&mut Segment> {
        let segment = match self.current.take() {
            Some(segment) => segment,
            None => self.start_segment()?,
        };
        Ok(self.current.insert(segment))
    }

    fn start_segment(&mut self) -> io::Result<Segment> {
        let name = self.settings.segment_file_name(self.next_sequence);
        self.next_sequence += 1;

        let final_path = self.settings.output_directory.join(&name);
        let open_path = self
            .settings
            .output_directory
            .join(format!("{}{}", name, OPEN_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&open_path)?;

        let mut out = CountingWriter {
            inner: BufWriter::new(file),
            written: 0,
        };

        let info = Record::warcinfo(&self.settings.warcinfo_fields())
            .with_header("WARC-Filename", name.as_str());
        let (digest, length) = block_digest(info.content())?;
        write_record(&mut out, self.settings.compression, &info, &digest, length)?;
        out.flush()?;

        tracing::info!(path = %final_path.display(), "Opened WARC segment");

        Ok(Segment {
            open_path,
            final_path,
            out,
            records: 0,
        })
    }

    fn close_current(&mut self) -> io::Result<()> {
        let Some(segment) = self.current.take() else {
            return Ok(());
        };

        let written = segment.out.written;
        let file = segment.out.inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&segment.open_path, &segment.final_path)?;
        self.summary.segments += 1;

        tracing::info!(
            path = %segment.final_path.display(),
            records = segment.records,
            bytes = written,
            "Closed WARC segment"
        );
        Ok(())
    }
}

/// Computes the `sha256:` block digest and block length
fn block_digest(content: &RecordContent) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let length = match content {
        RecordContent::Memory(bytes) => {
            hasher.update(bytes);
            bytes.len() as u64
        }
        RecordContent::Spooled { head, payload_path } => {
            hasher.update(head);
            let payload = hash_file(&mut hasher, payload_path)?;
            head.len() as u64 + payload
        }
    };
    Ok((format!("sha256:{}", hex::encode(hasher.finalize())), length))
}

fn hash_file(hasher: &mut Sha256, path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
}

/// Writes one record, as its own gzip member when compressing
fn write_record<W: Write>(
    out: &mut W,
    compression: CompressionMode,
    record: &Record,
    digest: &str,
    length: u64,
) -> io::Result<()> {
    match compression {
        CompressionMode::Gzip => {
            let mut gz = GzEncoder::new(&mut *out, Compression::default());
            encode_record(&mut gz, record, digest, length)?;
            gz.finish()?;
            Ok(())
        }
        CompressionMode::None => encode_record(out, record, digest, length),
    }
}

fn encode_record<W: Write>(out: &mut W, record: &Record, digest: &str, length: u64) -> io::Result<()> {
    write!(out, "WARC/1.1\r\n")?;
    write!(out, "WARC-Type: {}\r\n", record.record_type().as_str())?;
    write!(out, "WARC-Record-ID: <urn:uuid:{}>\r\n", Uuid::new_v4())?;
    write!(out, "WARC-Date: {}\r\n", Utc::now().format("%Y-%m-%dT%H:%M:%SZ"))?;
    if let Some(uri) = record.target_uri() {
        write!(out, "WARC-Target-URI: {}\r\n", uri)?;
    }
    if let Some(host) = record.host() {
        write!(out, "Host: {}\r\n", host)?;
    }
    for (name, value) in record.extra_headers() {
        write!(out, "{}: {}\r\n", name, value)?;
    }
    write!(out, "Content-Type: {}\r\n", record.content_type())?;
    write!(out, "WARC-Block-Digest: {}\r\n", digest)?;
    write!(out, "Content-Length: {}\r\n\r\n", length)?;

    match record.content() {
        RecordContent::Memory(bytes) => out.write_all(bytes)?,
        RecordContent::Spooled { head, payload_path } => {
            out.write_all(head)?;
            let mut file = File::open(payload_path)?;
            io::copy(&mut file, out)?;
        }
    }

    out.write_all(b"\r\n\r\n")
}
