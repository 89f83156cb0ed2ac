//! Per-candidate download pipeline.
//!
//! Each accepted candidate flows through: rate-gated retry-wrapped fetch,
//! hash, atomic write into the organized destination, optional metadata
//! sidecar, then ledger commit. The ledger entry is written strictly after
//! the file is safely on disk, so the ledger never claims a file that does
//! not exist.

use super::MediaDownloader;
use crate::error::{Error, ErrorKind};
use crate::organizer;
use crate::retry::run_with_retry;
use crate::types::{DownloadOutcome, Event, FileRecord, MediaCandidate, SkipReason};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

impl MediaDownloader {
    /// Download one candidate to its terminal outcome
    ///
    /// Never returns an error: every failure mode is folded into
    /// [`DownloadOutcome`] so one bad file cannot abort the run.
    pub(super) async fn download_one(&self, candidate: MediaCandidate) -> DownloadOutcome {
        if self.cancel_token.is_cancelled() {
            return DownloadOutcome::Failed {
                kind: ErrorKind::Permanent,
                attempts: 0,
                reason: Error::Cancelled.to_string(),
            };
        }

        self.emit_event(Event::DownloadStarted {
            file_id: candidate.file_id.clone(),
            size_bytes: candidate.size_bytes,
        });

        // Coarse-grained gate: reserve the declared size once per candidate
        // so concurrent downloads share the byte budget. Retried attempts
        // re-transfer the same bytes and are not charged again.
        self.rate_gate.acquire(candidate.size_bytes).await;

        // Count actual attempts so the outcome reports how often we tried
        let attempt_counter = Arc::new(AtomicU32::new(0));

        let fetch_result = run_with_retry(&self.config.download.retry, || {
            let counter = attempt_counter.clone();
            let candidate = &candidate;
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if self.cancel_token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                self.fetcher.fetch(candidate).await
            }
        })
        .await;

        let bytes = match fetch_result {
            Ok(bytes) => bytes,
            Err(exhausted) => {
                self.emit_event(Event::DownloadFailed {
                    file_id: candidate.file_id.clone(),
                    error: exhausted.error.to_string(),
                    attempts: exhausted.attempts,
                });
                return DownloadOutcome::Failed {
                    kind: exhausted.error.kind(),
                    attempts: exhausted.attempts,
                    reason: exhausted.error.to_string(),
                };
            }
        };

        let attempts = attempt_counter.load(Ordering::SeqCst);
        match self.store_and_commit(&candidate, &bytes).await {
            Ok(Some(record)) => {
                self.emit_event(Event::DownloadComplete {
                    file_id: record.file_id.clone(),
                    file_path: record.file_path.clone(),
                    size_bytes: record.size_bytes,
                });
                DownloadOutcome::Succeeded(record)
            }
            Ok(None) => {
                // A concurrent task committed the same id while we were
                // fetching; the ledger wins
                self.emit_event(Event::CandidateSkipped {
                    file_id: candidate.file_id.clone(),
                    reason: SkipReason::AlreadyDownloaded,
                });
                DownloadOutcome::Skipped(SkipReason::AlreadyDownloaded)
            }
            Err(e) => {
                tracing::warn!(
                    file_id = %candidate.file_id,
                    error = %e,
                    "Failed to store fetched media"
                );
                self.emit_event(Event::DownloadFailed {
                    file_id: candidate.file_id.clone(),
                    error: e.to_string(),
                    attempts,
                });
                // Local storage failures are not retried; disk problems need
                // user action
                DownloadOutcome::Failed {
                    kind: ErrorKind::Permanent,
                    attempts,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Write fetched bytes to their final location and commit the ledger entry
    ///
    /// Runs under the ledger mutex so collision-safe naming, the file write,
    /// and the commit are serialized across concurrent downloads. Returns
    /// `Ok(None)` when the ledger already has the id.
    async fn store_and_commit(
        &self,
        candidate: &MediaCandidate,
        bytes: &[u8],
    ) -> crate::error::Result<Option<FileRecord>> {
        let mut ledger = self.ledger.lock().await;

        if ledger.contains(&candidate.file_id) {
            return Ok(None);
        }

        let dir = organizer::destination_dir(&self.config.download, candidate);
        let file_name = organizer::sanitize_file_name(&candidate.effective_file_name());
        let final_path = organizer::unique_path(&dir.join(file_name))?;

        organizer::write_media(bytes, &final_path)?;

        let relative_path = final_path
            .strip_prefix(&self.config.download.output_dir)
            .unwrap_or(&final_path)
            .to_path_buf();

        let record = FileRecord {
            file_id: candidate.file_id.clone(),
            channel_id: candidate.channel_id,
            message_id: candidate.message_id,
            file_path: relative_path,
            size_bytes: bytes.len() as u64,
            content_hash: organizer::sha256_hex(bytes),
            downloaded_at: Utc::now(),
        };

        if self.config.download.preserve_metadata {
            organizer::write_metadata(candidate, &record, &final_path);
        }

        // Commit strictly after the file write; a crash between the two
        // leaves an orphan file (harmless, re-run picks a fresh name) but
        // never a ledger entry without a file
        ledger.commit(record.clone())?;

        Ok(Some(record))
    }
}
