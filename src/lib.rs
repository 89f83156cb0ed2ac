//! # telegram-media-dl
//!
//! Backend library for downloading media from Telegram channels with a
//! persistent dedup ledger, so interrupted runs resume where they left off.
//!
//! ## Design Philosophy
//!
//! telegram-media-dl is designed to be:
//! - **Resumable** - Every completed download is committed to a JSON ledger;
//!   re-running over the same channel never downloads a file twice
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use telegram_media_dl::{Config, MediaDownloader, RunRequest};
//! use telegram_media_dl::client::botapi::BotApiFetcher;
//! # use telegram_media_dl::client::MessageLister;
//! # fn my_lister() -> Arc<dyn MessageLister> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let fetcher = Arc::new(BotApiFetcher::new("123456:bot-token")?);
//!     let lister = my_lister(); // MTProto listing supplied by the embedder
//!
//!     let downloader = MediaDownloader::new(config, lister, fetcher).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = downloader.run(RunRequest::new("@my_channel")).await?;
//!     println!("Downloaded {} files", summary.succeeded);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Telegram client abstractions and the Bot API fetcher
pub mod client;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Pure candidate filtering
pub mod filter;
/// Persistent dedup ledger
pub mod ledger;
/// Channel link extraction from message text
pub mod link_extractor;
/// File naming, organization, and atomic writes
pub mod organizer;
/// Transfer-rate limiting with a token bucket
pub mod rate_gate;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::{ChannelInfo, MediaFetcher, MessageLister};
pub use config::{Config, DownloadConfig, FilterConfig, RetryConfig, TelegramConfig};
pub use downloader::{MediaDownloader, RunRequest};
pub use error::{Error, ErrorKind, Result};
pub use ledger::LedgerStore;
pub use types::{
    DownloadOutcome, Event, FileId, FileRecord, MediaCandidate, MediaKind, MediaSelection,
    RunSummary, SkipReason,
};

/// Run one download request with graceful signal handling.
///
/// Spawns a background task that waits for a termination signal and cancels
/// the downloader when one arrives; in-flight attempts abort cleanly and the
/// ledger keeps everything committed so far.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use telegram_media_dl::{Config, MediaDownloader, RunRequest, run_with_shutdown};
/// # use std::sync::Arc;
/// # use telegram_media_dl::client::{MessageLister, MediaFetcher};
/// # fn my_lister() -> Arc<dyn MessageLister> { unimplemented!() }
/// # fn my_fetcher() -> Arc<dyn MediaFetcher> { unimplemented!() }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default(), my_lister(), my_fetcher()).await?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(downloader, RunRequest::new("@my_channel")).await?;
///     println!("{} files downloaded", summary.succeeded);
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    downloader: MediaDownloader,
    request: RunRequest,
) -> Result<RunSummary> {
    let canceller = downloader.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        canceller.cancel();
    });

    let summary = downloader.run(request).await;
    signal_task.abort();
    summary
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
