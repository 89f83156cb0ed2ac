//! Core types for telegram-media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ErrorKind;

/// Stable identifier for a piece of media, derived from the source message
///
/// The id is stable across runs for the same message (`video_{msg}_{media}`,
/// `photo_{msg}_{media}`, `doc_{msg}_{media}`), which is what makes the
/// ledger's dedup guarantee work.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    /// Create a new FileId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the id for a message's media attachment
    pub fn for_media(kind: MediaKind, message_id: i64, media_id: i64) -> Self {
        let prefix = match kind {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "doc",
        };
        Self(format!("{prefix}_{message_id}_{media_id}"))
    }
}

impl From<String> for FileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad media category of a message attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Photo attachment
    Photo,
    /// Video attachment
    Video,
    /// Generic document attachment (anything with a file name)
    Document,
}

impl MediaKind {
    /// Folder name used when organizing output by media kind
    pub fn folder_name(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photos",
            MediaKind::Video => "videos",
            MediaKind::Document => "documents",
        }
    }
}

/// Which media categories a run should consider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSelection {
    /// All supported media (default)
    #[default]
    All,
    /// Photos only
    Images,
    /// Videos only
    Videos,
    /// All documents
    Documents,
    /// PDF documents only
    Pdfs,
    /// ZIP archives only
    Zips,
}

impl MediaSelection {
    /// Whether a candidate of the given kind and mime type falls within this selection
    pub fn matches(&self, kind: MediaKind, mime_type: Option<&str>) -> bool {
        match self {
            MediaSelection::All => true,
            MediaSelection::Images => kind == MediaKind::Photo,
            MediaSelection::Videos => kind == MediaKind::Video,
            MediaSelection::Documents => kind == MediaKind::Document,
            MediaSelection::Pdfs => {
                kind == MediaKind::Document && mime_type == Some("application/pdf")
            }
            MediaSelection::Zips => {
                kind == MediaKind::Document && mime_type == Some("application/zip")
            }
        }
    }
}

/// A piece of media discovered while listing a channel
///
/// Candidates are ephemeral: they exist only for the duration of a run and
/// are never persisted. Only the [`FileRecord`] of a completed download goes
/// into the ledger.
#[derive(Clone, Debug)]
pub struct MediaCandidate {
    /// Stable media identifier
    pub file_id: FileId,
    /// Transport-specific handle the fetcher uses to retrieve the bytes
    /// (for the Bot API this is Telegram's own file id)
    pub remote_id: String,
    /// Numeric id of the source channel
    pub channel_id: i64,
    /// Channel name used for folder organization
    pub channel_name: String,
    /// Id of the message carrying the media
    pub message_id: i64,
    /// Original file name, if the message carries one
    pub file_name: Option<String>,
    /// Lowercased extension including the leading dot, if known (e.g. ".mp4")
    pub extension: Option<String>,
    /// Declared size in bytes
    pub size_bytes: u64,
    /// Media category
    pub kind: MediaKind,
    /// Declared MIME type, if the message carries one
    pub mime_type: Option<String>,
    /// Date of the source message
    pub message_date: DateTime<Utc>,
    /// Display name of the sender, if available
    pub sender: Option<String>,
}

impl MediaCandidate {
    /// File name to use on disk, falling back to the id when the message has none
    pub fn effective_file_name(&self) -> String {
        match &self.file_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => match &self.extension {
                Some(ext) => format!("{}{ext}", self.file_id),
                None => self.file_id.to_string(),
            },
        }
    }
}

/// Ledger entry for a successfully downloaded file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable media identifier (ledger key)
    pub file_id: FileId,
    /// Numeric id of the source channel
    pub channel_id: i64,
    /// Id of the message the file came from
    pub message_id: i64,
    /// Path of the stored file, relative to the output root
    pub file_path: PathBuf,
    /// Size of the stored file in bytes
    pub size_bytes: u64,
    /// SHA-256 hex digest of the stored bytes
    pub content_hash: String,
    /// When the download completed
    pub downloaded_at: DateTime<Utc>,
}

/// Why a candidate was skipped rather than downloaded
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Ledger already has this file id
    AlreadyDownloaded,
    /// Extension not in the configured whitelist
    ExtensionNotAllowed,
    /// Extension is in the configured blacklist
    ExtensionExcluded,
    /// Size outside the configured min/max bounds
    SizeOutOfBounds,
    /// Media kind outside the requested selection
    MediaTypeMismatch,
    /// Dry-run mode: would have been downloaded
    DryRun,
}

/// Terminal state of one candidate within a run
#[derive(Clone, Debug)]
pub enum DownloadOutcome {
    /// File downloaded, stored, and committed to the ledger
    Succeeded(FileRecord),
    /// Candidate was not downloaded and the run moved on
    Skipped(SkipReason),
    /// All attempts failed
    Failed {
        /// Classification of the final error
        kind: ErrorKind,
        /// Total attempts made
        attempts: u32,
        /// Display form of the final error
        reason: String,
    },
}

/// Aggregate counts for a completed run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Files downloaded and committed
    pub succeeded: u64,
    /// Candidates skipped by the filter or by dry-run
    pub skipped: u64,
    /// Candidates whose every attempt failed
    pub failed: u64,
    /// Skips because the ledger already had the file
    pub skipped_duplicates: u64,
    /// Skips because of dry-run mode
    pub skipped_dry_run: u64,
    /// Skip counts broken down by reason
    pub skipped_by_reason: BTreeMap<SkipReason, u64>,
    /// Total bytes written for succeeded files
    pub bytes_downloaded: u64,
}

impl RunSummary {
    /// Fold one outcome into the summary
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Succeeded(record) => {
                self.succeeded += 1;
                self.bytes_downloaded += record.size_bytes;
            }
            DownloadOutcome::Skipped(reason) => {
                self.skipped += 1;
                *self.skipped_by_reason.entry(*reason).or_insert(0) += 1;
                match reason {
                    SkipReason::AlreadyDownloaded => self.skipped_duplicates += 1,
                    SkipReason::DryRun => self.skipped_dry_run += 1,
                    _ => {}
                }
            }
            DownloadOutcome::Failed { .. } => {
                self.failed += 1;
            }
        }
    }

    /// Total candidates that reached a terminal state
    pub fn total(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }
}

/// Event emitted during a download run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run accepted and channel resolved
    RunStarted {
        /// Resolved channel name
        channel: String,
        /// Whether this run is a dry run
        dry_run: bool,
    },

    /// Message listing finished
    Listing {
        /// Resolved channel name
        channel: String,
        /// Number of candidates found
        candidates: u64,
    },

    /// A candidate was rejected or skipped
    CandidateSkipped {
        /// Media identifier
        file_id: FileId,
        /// Why it was skipped
        reason: SkipReason,
    },

    /// Download attempt pipeline started for a candidate
    DownloadStarted {
        /// Media identifier
        file_id: FileId,
        /// Declared size in bytes
        size_bytes: u64,
    },

    /// File stored and committed to the ledger
    DownloadComplete {
        /// Media identifier
        file_id: FileId,
        /// Path relative to the output root
        file_path: PathBuf,
        /// Stored size in bytes
        size_bytes: u64,
    },

    /// All attempts for a candidate failed
    DownloadFailed {
        /// Media identifier
        file_id: FileId,
        /// Error message from the final attempt
        error: String,
        /// Total attempts made
        attempts: u32,
    },

    /// Run reached a terminal state
    RunComplete {
        /// Aggregate counts
        summary: RunSummary,
    },
}
