//! In-memory representation of a single WARC record

use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// The kinds of WARC record this crate produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Warcinfo,
    Request,
    Response,
}

impl RecordType {
    /// Value of the `WARC-Type` header
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Warcinfo => "warcinfo",
            RecordType::Request => "request",
            RecordType::Response => "response",
        }
    }
}

/// Where the bytes of a record block live
///
/// A record is either fully buffered, or its HTTP header block is buffered
/// and the payload (body) has been spooled to a temporary file. The spool
/// file belongs to the batch until the writer signals completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordContent {
    /// Entire block held in memory
    Memory(Vec<u8>),

    /// Header block in memory, payload in a spool file
    Spooled {
        head: Vec<u8>,
        payload_path: PathBuf,
    },
}

impl RecordContent {
    /// Path of the spooled payload, if any
    pub fn payload_path(&self) -> Option<&Path> {
        match self {
            RecordContent::Memory(_) => None,
            RecordContent::Spooled { payload_path, .. } => Some(payload_path),
        }
    }

    /// Total block length in bytes
    ///
    /// For spooled content this stats the payload file.
    pub fn len(&self) -> io::Result<u64> {
        match self {
            RecordContent::Memory(bytes) => Ok(bytes.len() as u64),
            RecordContent::Spooled { head, payload_path } => {
                let payload = std::fs::metadata(payload_path)?.len();
                Ok(head.len() as u64 + payload)
            }
        }
    }

    /// Returns true when the block holds no bytes at all
    pub fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|len| len == 0)
    }
}

/// One WARC entry
#[derive(Debug, Clone)]
pub struct Record {
    record_type: RecordType,
    target_uri: Option<String>,
    host: Option<String>,
    content_type: String,
    extra_headers: Vec<(String, String)>,
    content: RecordContent,
}

impl Record {
    /// Builds a `request` record for the given target
    pub fn request(target: &Url, content: RecordContent) -> Self {
        Self::http(RecordType::Request, target, content)
    }

    /// Builds a `response` record for the given target
    pub fn response(target: &Url, content: RecordContent) -> Self {
        Self::http(RecordType::Response, target, content)
    }

    fn http(record_type: RecordType, target: &Url, content: RecordContent) -> Self {
        let msgtype = match record_type {
            RecordType::Request => "request",
            _ => "response",
        };

        Self {
            record_type,
            target_uri: Some(target.as_str().to_string()),
            host: host_with_port(target),
            content_type: format!("application/http; msgtype={}", msgtype),
            extra_headers: Vec::new(),
            content,
        }
    }

    /// Builds a `warcinfo` record from `key: value` fields
    pub fn warcinfo(fields: &[(String, String)]) -> Self {
        let mut body = String::new();
        for (key, value) in fields {
            body.push_str(key);
            body.push_str(": ");
            body.push_str(value);
            body.push_str("\r\n");
        }

        Self {
            record_type: RecordType::Warcinfo,
            target_uri: None,
            host: None,
            content_type: "application/warc-fields".to_string(),
            extra_headers: Vec::new(),
            content: RecordContent::Memory(body.into_bytes()),
        }
    }

    /// Adds an extra WARC header, written after the standard ones
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.target_uri.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    pub fn content(&self) -> &RecordContent {
        &self.content
    }

    /// Path of the spooled payload backing this record, if any
    pub fn payload_path(&self) -> Option<&Path> {
        self.content.payload_path()
    }
}

/// `host[:port]` as it appears in an HTTP `Host` header
pub(crate) fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
