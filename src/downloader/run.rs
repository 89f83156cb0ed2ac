//! Run orchestration: resolve the channel, list candidates, filter, and
//! dispatch accepted candidates with bounded concurrency.

use super::{MediaDownloader, RunRequest};
use crate::error::Result;
use crate::filter::{self, Decision};
use crate::types::{DownloadOutcome, Event, RunSummary, SkipReason};
use futures::StreamExt;

impl MediaDownloader {
    /// Execute one download run
    ///
    /// Run-level failures (unreachable channel, auth failure, corrupt
    /// ledger) abort the run with an error. Per-candidate failures never
    /// do: each candidate reaches a terminal outcome and the run carries on,
    /// returning aggregate counts when every candidate is resolved.
    ///
    /// The orchestrator reports progress through the event channel and never
    /// formats human-readable output; rendering belongs to the embedder.
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary> {
        // Channel must resolve before anything else happens; failure here
        // aborts the run
        let channel = self.lister.resolve_channel(&request.channel).await?;

        tracing::info!(
            channel = %channel.name,
            selection = ?request.selection,
            dry_run = request.dry_run,
            "Starting download run"
        );
        self.emit_event(Event::RunStarted {
            channel: channel.name.clone(),
            dry_run: request.dry_run,
        });

        let candidates = self
            .lister
            .list_media(&channel, request.selection, request.message_limit)
            .await?;

        self.emit_event(Event::Listing {
            channel: channel.name.clone(),
            candidates: candidates.len() as u64,
        });

        let mut summary = RunSummary::default();
        let mut accepted = Vec::new();

        {
            // Filter decisions read the ledger; hold the lock once for the
            // whole pass rather than per candidate
            let ledger = self.ledger.lock().await;
            for candidate in candidates {
                let decision = filter::evaluate(
                    &candidate,
                    &ledger,
                    &self.config.filter,
                    request.selection,
                );
                match decision {
                    Decision::Accept if request.dry_run => {
                        let outcome = DownloadOutcome::Skipped(SkipReason::DryRun);
                        self.emit_event(Event::CandidateSkipped {
                            file_id: candidate.file_id.clone(),
                            reason: SkipReason::DryRun,
                        });
                        summary.record(&outcome);
                    }
                    Decision::Accept => accepted.push(candidate),
                    Decision::Reject(reason) => {
                        self.emit_event(Event::CandidateSkipped {
                            file_id: candidate.file_id.clone(),
                            reason,
                        });
                        summary.record(&DownloadOutcome::Skipped(reason));
                    }
                }
            }
        }

        // Dispatch accepted candidates with bounded concurrency; a full
        // batch of outcomes is collected even when some of them fail
        let outcomes: Vec<DownloadOutcome> = futures::stream::iter(accepted)
            .map(|candidate| {
                let downloader = self.clone();
                async move { downloader.download_one(candidate).await }
            })
            .buffer_unordered(self.config.download.batch_size)
            .collect()
            .await;

        for outcome in &outcomes {
            summary.record(outcome);
        }

        tracing::info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            bytes = summary.bytes_downloaded,
            "Run complete"
        );
        self.emit_event(Event::RunComplete {
            summary: summary.clone(),
        });

        Ok(summary)
    }
}
