//! Telegram client abstractions
//!
//! The downloader talks to Telegram through two trait seams so the wire
//! protocol stays outside the library and tests can script both sides:
//! [`MessageLister`] resolves a channel and enumerates its media, and
//! [`MediaFetcher`] retrieves the bytes for one candidate. A Bot API
//! fetcher over plain HTTP ships in [`botapi`]; listing requires an MTProto
//! session and is supplied by the embedding application.

pub mod botapi;

use crate::error::Result;
use crate::types::{MediaCandidate, MediaSelection};
use async_trait::async_trait;

/// A resolved channel the account can read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Numeric channel id
    pub id: i64,
    /// Username or normalized name used for folder organization
    pub name: String,
    /// Display title
    pub title: String,
}

/// Resolves channels and enumerates their media messages
#[async_trait]
pub trait MessageLister: Send + Sync {
    /// Resolve a channel reference (username, t.me link, numeric id)
    ///
    /// Fails with [`crate::Error::InvalidChannel`] when the channel does not
    /// exist or the account cannot access it; that failure aborts the whole
    /// run before any downloads start.
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelInfo>;

    /// List media candidates in the channel, newest first
    ///
    /// Bounded by `limit` messages when given. The listing is finite and
    /// non-restartable: a new run lists from the start again and relies on
    /// the ledger for dedup.
    async fn list_media(
        &self,
        channel: &ChannelInfo,
        selection: MediaSelection,
        limit: Option<u32>,
    ) -> Result<Vec<MediaCandidate>>;
}

/// Retrieves the bytes of one media candidate
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the complete media payload
    ///
    /// Errors must be classified via [`crate::Error::kind`]: rate limits and
    /// server-side failures as transient, auth and not-found as permanent.
    async fn fetch(&self, candidate: &MediaCandidate) -> Result<Vec<u8>>;
}
