use crate::config::{CompressionMode, Config};
use std::io;
use std::path::PathBuf;

/// Suffix of the segment currently being written
pub(crate) const OPEN_SUFFIX: &str = ".open";

/// Name written in the `software` field of every warcinfo record
pub const SOFTWARE: &str = concat!("sumi-archiver/", env!("CARGO_PKG_VERSION"));

/// Settings for the segment rotator
///
/// Built once when the crawl starts and handed to the writer by value; the
/// writer never mutates them.
#[derive(Debug, Clone)]
pub struct RotatorSettings {
    /// Directory segments are written to
    pub output_directory: PathBuf,

    pub compression: CompressionMode,

    /// Filename prefix shared by every segment
    pub prefix: String,

    /// Optional operator for the warcinfo record
    pub operator: Option<String>,

    /// Rotate once a segment reaches this many bytes on disk
    pub max_segment_size: u64,

    /// Rotate once a segment holds this many records (0 disables)
    pub max_segment_records: u64,

    /// Capacity of the handoff queue in front of the writer
    pub queue_capacity: usize,
}

impl RotatorSettings {
    /// Settings with gzip compression and a 1 GB segment size
    pub fn new(output_directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_directory: output_directory.into(),
            compression: CompressionMode::Gzip,
            prefix: prefix.into(),
            operator: None,
            max_segment_size: 1_000_000_000,
            max_segment_records: 0,
            queue_capacity: 256,
        }
    }

    /// Derives settings from the crawl configuration
    ///
    /// Segments go to `{job-path}/warcs`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_directory: config.crawl.job_path.join("warcs"),
            compression: config.warc.compression,
            prefix: config.warc.prefix.clone(),
            operator: config.warc.operator.clone().filter(|o| !o.is_empty()),
            max_segment_size: config.warc.max_segment_size,
            max_segment_records: config.warc.max_segment_records,
            queue_capacity: config.warc.queue_capacity,
        }
    }

    /// Fields of the warcinfo record that opens each segment
    pub fn warcinfo_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("software".to_string(), SOFTWARE.to_string()),
            ("format".to_string(), "WARC File Format 1.1".to_string()),
        ];
        if let Some(operator) = &self.operator {
            fields.push(("operator".to_string(), operator.clone()));
        }
        fields
    }

    /// Final file name of the segment with the given sequence number
    pub fn segment_file_name(&self, sequence: u32) -> String {
        format!("{}-{:05}.{}", self.prefix, sequence, self.extension())
    }

    /// Sequence number encoded in `name`, if it is one of this writer's
    /// segments (`{prefix}-NNNNN.{ext}`, optionally still `.open`)
    pub fn segment_sequence(&self, name: &str) -> Option<u32> {
        let name = name.strip_suffix(OPEN_SUFFIX).unwrap_or(name);
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')?
            .strip_suffix(self.extension())?
            .strip_suffix('.')?;

        if digits.len() < 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// First sequence number not already used in the output directory
    ///
    /// A directory that does not exist yet starts at 0.
    pub fn next_free_sequence(&self) -> io::Result<u32> {
        let entries = match std::fs::read_dir(&self.output_directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut next = 0u32;
        for entry in entries {
            let name = entry?.file_name();
            let Some(sequence) = name.to_str().and_then(|n| self.segment_sequence(n)) else {
                continue;
            };
            next = next.max(sequence.checked_add(1).ok_or_else(|| {
                io::Error::other("segment sequence numbers exhausted")
            })?);
        }

        Ok(next)
    }

    /// File extension for the configured compression
    pub fn extension(&self) -> &'static str {
        match self.compression {
            CompressionMode::Gzip => "warc.gz",
            CompressionMode::None => "warc",
        }
    }
}
