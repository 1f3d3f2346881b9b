//! Headless rendering capability and its event observer
//!
//! The browser automation transport is supplied by the caller through the
//! [`Renderer`] trait. While a page renders, the renderer reports what the
//! browser does as typed [`BrowserEvent`]s on a channel; a dedicated
//! observer task logs them and hands captured exchanges to the archive.

use crate::crawler::fetcher::ByteStream;
use crate::crawler::item::url_hash;
use crate::crawler::{CrawlContext, Item};
use crate::ArchiverError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Capacity of the channel between a renderer and its observer
pub const EVENT_BUFFER: usize = 64;

/// Things a browser reports while rendering a page
pub enum BrowserEvent {
    /// Response headers arrived for the page or one of its assets
    ResponseReceived {
        url: String,
        status: u16,
        mime_type: Option<String>,
    },

    /// The page's load event fired
    LoadEventFired,

    /// A full request/response exchange captured as live byte streams
    Exchange {
        url: Url,
        request: ByteStream,
        response: ByteStream,
    },
}

impl fmt::Debug for BrowserEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserEvent::ResponseReceived {
                url,
                status,
                mime_type,
            } => f
                .debug_struct("ResponseReceived")
                .field("url", url)
                .field("status", status)
                .field("mime_type", mime_type)
                .finish(),
            BrowserEvent::LoadEventFired => f.write_str("LoadEventFired"),
            BrowserEvent::Exchange { url, .. } => f
                .debug_struct("Exchange")
                .field("url", &url.as_str())
                .finish_non_exhaustive(),
        }
    }
}

/// Capability: render a page in a browser
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Navigates to `url`, reports events until the page has loaded, and
    /// returns the final rendered document when `want_dom` is set
    ///
    /// Implementations must not extract the document when `want_dom` is
    /// false; returning `None` is expected then.
    async fn render(
        &self,
        url: &Url,
        want_dom: bool,
        events: mpsc::Sender<BrowserEvent>,
    ) -> Result<Option<String>, ArchiverError>;
}

/// What the observer saw during one render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservedEvents {
    pub responses: u64,
    pub exchanges: u64,
    pub loaded: bool,
}

/// Spawns the task consuming one render's event channel
///
/// The task ends once the renderer drops its sender.
pub fn spawn_observer(
    item: Item,
    ctx: Arc<CrawlContext>,
    mut events: mpsc::Receiver<BrowserEvent>,
) -> JoinHandle<ObservedEvents> {
    tokio::spawn(async move {
        let mut observed = ObservedEvents::default();

        while let Some(event) = events.recv().await {
            match event {
                BrowserEvent::ResponseReceived { url, status, .. } => {
                    observed.responses += 1;
                    let hash = Url::parse(&url)
                        .map(|u| url_hash(&u))
                        .unwrap_or_default();

                    if url == item.url.as_str() {
                        tracing::info!(status_code = status, hash = %hash, hop = item.hop, "{}", url);
                    } else {
                        tracing::debug!(
                            kind = "asset",
                            status_code = status,
                            hash = %hash,
                            hop = item.hop,
                            "{}",
                            url
                        );
                    }
                }
                BrowserEvent::LoadEventFired => {
                    observed.loaded = true;
                    tracing::trace!(url = %item.url, "Load event fired");
                }
                BrowserEvent::Exchange {
                    url,
                    request,
                    response,
                } => {
                    observed.exchanges += 1;
                    ctx.spawn_exchange_writer(url, request, response);
                }
            }
        }

        observed
    })
}
