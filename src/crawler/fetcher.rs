//! Direct HTTP fetching
//!
//! This module defines the fetch capability the capture orchestrator relies
//! on, plus its reqwest implementation:
//! - Building HTTP clients with proper user agent strings
//! - Issuing a single GET per URL (redirects are archived, not followed)
//! - Exposing the body as a stream so large payloads never sit in memory
//! - Keeping the outgoing request metadata so the request can be archived

use crate::config::UserAgentConfig;
use crate::ArchiverError;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode, Version};
use std::io;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

/// A single-pass byte stream (response body, or one side of an exchange)
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// The request as it was sent on the wire
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub url: Url,
    pub version: Version,
    pub headers: HeaderMap,
}

/// A response whose headers have arrived and whose body is still streaming
pub struct FetchedResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,

    /// Declared body length; None when unknown (e.g. chunked)
    pub content_length: Option<u64>,

    pub body: ByteStream,

    /// The request that produced this response
    pub request: RequestMeta,
}

impl std::fmt::Debug for FetchedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("content_length", &self.content_length)
            .field("request", &self.request.url.as_str())
            .finish_non_exhaustive()
    }
}

/// Capability: fetch a URL and hand back the response with a streaming body
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedResponse, ArchiverError>;
}

/// Builds an HTTP client with proper configuration
///
/// Transparent decompression stays off so archived bodies match the bytes
/// on the wire, and redirects are returned rather than followed so each
/// hop is archived as its own exchange.
///
/// # Example
///
/// ```no_run
/// use sumi_archiver::config::UserAgentConfig;
/// use sumi_archiver::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiArchiver".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .redirect(Policy::none())
        .build()
}

/// [`Fetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, ArchiverError> {
        Ok(Self {
            client: build_http_client(config)?,
            user_agent: config.header_value(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResponse, ArchiverError> {
        // Set explicitly so the header shows up in the archived request
        let request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .build()?;

        let meta = RequestMeta {
            method: request.method().to_string(),
            url: request.url().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        };

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| ArchiverError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(io::Error::other);

        Ok(FetchedResponse {
            status,
            version,
            headers,
            content_length,
            body: Box::new(StreamReader::new(stream)),
            request: meta,
        })
    }
}

/// HTTP version as written in a status or request line
pub(crate) fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
