//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`run`] - Run orchestration (resolve, list, filter, dispatch, summarize)
//! - [`task`] - Per-candidate download pipeline (retry, store, commit)

mod run;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::client::{MediaFetcher, MessageLister};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::LedgerStore;
use crate::rate_gate::RateGate;
use crate::types::{Event, MediaSelection};

/// One download run over a single channel
///
/// Mirrors the command surface of a CLI front end: which channel, which
/// media categories, how many messages back, and whether to actually
/// download anything.
#[derive(Clone, Debug)]
pub struct RunRequest {
    /// Channel reference (username, t.me link, numeric id)
    pub channel: String,
    /// Media categories to consider
    pub selection: MediaSelection,
    /// Stop listing after this many messages (None = whole channel)
    pub message_limit: Option<u32>,
    /// Report what would be downloaded without performing any I/O
    pub dry_run: bool,
}

impl RunRequest {
    /// Request everything from a channel with default settings
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            selection: MediaSelection::All,
            message_limit: None,
            dry_run: false,
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Ledger of completed downloads; the Mutex enforces single-writer commits
    pub(crate) ledger: std::sync::Arc<tokio::sync::Mutex<LedgerStore>>,
    /// Channel resolution and message listing
    pub(crate) lister: std::sync::Arc<dyn MessageLister>,
    /// Media byte retrieval
    pub(crate) fetcher: std::sync::Arc<dyn MediaFetcher>,
    /// Aggregate transfer-rate gate shared across all in-flight downloads
    pub(crate) rate_gate: RateGate,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Cancellation token checked between dispatches and attempts
    pub(crate) cancel_token: tokio_util::sync::CancellationToken,
}

// Manual impl: the trait-object collaborators have no Debug bound
impl std::fmt::Debug for MediaDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDownloader")
            .field("config", &self.config)
            .field("rate_gate_limit", &self.rate_gate.limit())
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Validates the configuration, ensures the output directory exists,
    /// loads the ledger (a corrupt ledger file fails here, before any run
    /// starts), and sets up the event broadcast channel.
    pub async fn new(
        config: Config,
        lister: std::sync::Arc<dyn MessageLister>,
        fetcher: std::sync::Arc<dyn MediaFetcher>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.output_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create output directory '{}': {}",
                        config.download.output_dir.display(),
                        e
                    ),
                ))
            })?;

        let ledger = LedgerStore::load(&config.download.ledger_path)?;

        // Buffer size of 1000 events lets multiple subscribers receive all
        // events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let rate_gate = RateGate::new(config.download.speed_limit_bps);

        Ok(Self {
            config: std::sync::Arc::new(config),
            ledger: std::sync::Arc::new(tokio::sync::Mutex::new(ledger)),
            lister,
            fetcher,
            rate_gate,
            event_tx,
            cancel_token: tokio_util::sync::CancellationToken::new(),
        })
    }

    /// Subscribe to download events
    ///
    /// Each subscriber gets an independent receiver; events emitted before
    /// subscribing are not replayed.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Request cancellation of the current run
    ///
    /// No new downloads are dispatched after this; in-flight attempts finish
    /// or abort cleanly, and the ledger is never left mid-commit.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Number of entries currently in the ledger
    pub async fn ledger_len(&self) -> usize {
        self.ledger.lock().await.len()
    }

    /// Emit an event, ignoring the error when no subscribers exist
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
