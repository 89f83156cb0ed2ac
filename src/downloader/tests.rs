//! Downloader tests with scripted lister and fetcher stubs.

use super::{MediaDownloader, RunRequest};
use crate::client::{ChannelInfo, MediaFetcher, MessageLister};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::LedgerStore;
use crate::types::{Event, FileId, MediaCandidate, MediaKind, MediaSelection, SkipReason};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct StubLister {
    candidates: Vec<MediaCandidate>,
    fail_resolve: bool,
}

#[async_trait]
impl MessageLister for StubLister {
    async fn resolve_channel(&self, channel: &str) -> Result<ChannelInfo> {
        if self.fail_resolve {
            return Err(Error::InvalidChannel(channel.to_string()));
        }
        Ok(ChannelInfo {
            id: 42,
            name: channel.to_string(),
            title: format!("Title of {channel}"),
        })
    }

    async fn list_media(
        &self,
        _channel: &ChannelInfo,
        _selection: MediaSelection,
        _limit: Option<u32>,
    ) -> Result<Vec<MediaCandidate>> {
        Ok(self.candidates.clone())
    }
}

/// Fetcher that fails a scripted number of times before yielding the payload.
///
/// Remote ids listed in `permanent_ids` always fail with a permanent error.
struct StubFetcher {
    payload: Vec<u8>,
    transient_failures: u32,
    permanent_ids: Vec<String>,
    calls: AtomicU32,
}

impl StubFetcher {
    fn ok(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            transient_failures: 0,
            permanent_ids: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for StubFetcher {
    async fn fetch(&self, candidate: &MediaCandidate) -> Result<Vec<u8>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.permanent_ids.contains(&candidate.remote_id) {
            return Err(Error::Auth("forbidden".into()));
        }
        if call <= self.transient_failures {
            return Err(Error::Timeout("simulated timeout".into()));
        }
        Ok(self.payload.clone())
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.output_dir = dir.path().join("out");
    config.download.ledger_path = dir.path().join("state.json");
    config.download.organize_by_channel = false;
    config.download.organize_by_date = false;
    config.download.retry.max_attempts = 3;
    config.download.retry.initial_delay = Duration::from_millis(1);
    config.download.retry.max_delay = Duration::from_millis(5);
    config.download.retry.backoff_multiplier = 1.0;
    config.download.retry.jitter = false;
    config
}

fn candidate(message_id: i64, name: &str, ext: &str, size: u64) -> MediaCandidate {
    MediaCandidate {
        file_id: FileId::for_media(MediaKind::Document, message_id, message_id * 10),
        remote_id: format!("remote_{message_id}"),
        channel_id: 42,
        channel_name: "test_channel".into(),
        message_id,
        file_name: Some(name.to_string()),
        extension: Some(ext.to_string()),
        size_bytes: size,
        kind: MediaKind::Document,
        mime_type: None,
        message_date: Utc::now(),
        sender: Some("alice".into()),
    }
}

async fn downloader(
    config: Config,
    candidates: Vec<MediaCandidate>,
    fetcher: Arc<StubFetcher>,
) -> MediaDownloader {
    let lister = Arc::new(StubLister {
        candidates,
        fail_resolve: false,
    });
    MediaDownloader::new(config, lister, fetcher)
        .await
        .expect("downloader should initialize")
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn successful_run_writes_file_and_commits_ledger() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"hello world"));
    let dl = downloader(config.clone(), vec![candidate(1, "report.pdf", ".pdf", 11)], fetcher).await;

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.bytes_downloaded, 11);

    let path = config.download.output_dir.join("documents/report.pdf");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world");

    // Reload from disk rather than trusting in-memory state
    let ledger = LedgerStore::load(&config.download.ledger_path).unwrap();
    let record = ledger
        .get(&FileId::for_media(MediaKind::Document, 1, 10))
        .expect("record should be committed");
    assert_eq!(record.file_path, std::path::PathBuf::from("documents/report.pdf"));
    assert_eq!(
        record.content_hash,
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
}

#[tokio::test]
async fn sidecar_metadata_written_next_to_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"data"));
    let dl = downloader(config.clone(), vec![candidate(1, "clip.mp4", ".mp4", 4)], fetcher).await;

    dl.run(RunRequest::new("chan")).await.unwrap();

    let sidecar = config.download.output_dir.join("documents/clip.mp4.json");
    let text = std::fs::read_to_string(&sidecar).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["message_id"], 1);
    assert_eq!(value["channel_name"], "test_channel");
}

#[tokio::test]
async fn second_run_skips_committed_files() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"payload"));
    let dl = downloader(
        config,
        vec![candidate(1, "a.bin", ".bin", 7)],
        fetcher.clone(),
    )
    .await;

    let first = dl.run(RunRequest::new("chan")).await.unwrap();
    let second = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(first.succeeded, 1);
    assert_eq!(second.succeeded, 0);
    assert_eq!(second.skipped_duplicates, 1);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn dry_run_performs_no_io() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"payload"));
    let dl = downloader(
        config.clone(),
        vec![candidate(1, "a.bin", ".bin", 7)],
        fetcher.clone(),
    )
    .await;

    let mut request = RunRequest::new("chan");
    request.dry_run = true;
    let summary = dl.run(request).await.unwrap();

    assert_eq!(summary.skipped_dry_run, 1);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(dl.ledger_len().await, 0);
    // Output dir was created at construction but nothing was written into it
    let entries: Vec<_> = std::fs::read_dir(&config.download.output_dir)
        .unwrap()
        .collect();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher {
        payload: b"late".to_vec(),
        transient_failures: 2,
        permanent_ids: Vec::new(),
        calls: AtomicU32::new(0),
    });
    let dl = downloader(config, vec![candidate(1, "a.bin", ".bin", 4)], fetcher.clone()).await;

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_report_failure_with_attempt_count() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher {
        payload: Vec::new(),
        transient_failures: u32::MAX,
        permanent_ids: Vec::new(),
        calls: AtomicU32::new(0),
    });
    let dl = downloader(config, vec![candidate(1, "a.bin", ".bin", 4)], fetcher.clone()).await;
    let mut rx = dl.subscribe();

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(dl.ledger_len().await, 0);

    let events = drain_events(&mut rx);
    let failed = events
        .iter()
        .find_map(|e| match e {
            Event::DownloadFailed { attempts, .. } => Some(*attempts),
            _ => None,
        })
        .expect("DownloadFailed event");
    assert_eq!(failed, 3);
}

#[tokio::test]
async fn permanent_failure_stops_after_one_attempt() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher {
        payload: Vec::new(),
        transient_failures: 0,
        permanent_ids: vec!["remote_1".into()],
        calls: AtomicU32::new(0),
    });
    let dl = downloader(config, vec![candidate(1, "a.bin", ".bin", 4)], fetcher.clone()).await;

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn one_failure_does_not_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher {
        payload: b"good".to_vec(),
        transient_failures: 0,
        permanent_ids: vec!["remote_1".into()],
        calls: AtomicU32::new(0),
    });
    let dl = downloader(
        config,
        vec![
            candidate(1, "bad.bin", ".bin", 4),
            candidate(2, "good.bin", ".bin", 4),
        ],
        fetcher,
    )
    .await;

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total(), 2);
    assert_eq!(dl.ledger_len().await, 1);
}

#[tokio::test]
async fn unresolvable_channel_aborts_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"payload"));
    let lister = Arc::new(StubLister {
        candidates: vec![candidate(1, "a.bin", ".bin", 4)],
        fail_resolve: true,
    });
    let dl = MediaDownloader::new(config, lister, fetcher.clone())
        .await
        .unwrap();

    let err = dl.run(RunRequest::new("no_such_channel")).await.unwrap_err();

    assert!(matches!(err, Error::InvalidChannel(_)));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn filter_rejections_are_counted_and_reported() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"ok"));
    let dl = downloader(
        config,
        vec![
            candidate(1, "installer.exe", ".exe", 100),
            candidate(2, "huge.iso", ".iso", 2 * 1024 * 1024 * 1024),
            candidate(3, "photo.jpg", ".jpg", 2),
        ],
        fetcher.clone(),
    )
    .await;
    let mut rx = dl.subscribe();

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(fetcher.calls(), 1);

    let events = drain_events(&mut rx);
    let reasons: Vec<SkipReason> = events
        .iter()
        .filter_map(|e| match e {
            Event::CandidateSkipped { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();
    assert!(reasons.contains(&SkipReason::ExtensionExcluded));
    assert!(reasons.contains(&SkipReason::SizeOutOfBounds));
}

#[tokio::test]
async fn duplicate_ids_within_one_run_commit_once() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"same"));
    let first = candidate(1, "a.bin", ".bin", 4);
    let second = first.clone();
    let dl = downloader(config, vec![first, second], fetcher).await;

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded + summary.skipped_duplicates, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(dl.ledger_len().await, 1);
}

#[tokio::test]
async fn colliding_file_names_get_numeric_suffixes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"body"));
    let dl = downloader(
        config.clone(),
        vec![
            candidate(1, "vacation.jpg", ".jpg", 4),
            candidate(2, "vacation.jpg", ".jpg", 4),
        ],
        fetcher,
    )
    .await;

    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    let base = config.download.output_dir.join("documents");
    assert!(base.join("vacation.jpg").exists());
    assert!(base.join("vacation (1).jpg").exists());
}

#[tokio::test]
async fn corrupt_ledger_fails_construction() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::write(&config.download.ledger_path, "{ not json").unwrap();
    let fetcher = Arc::new(StubFetcher::ok(b"payload"));
    let lister = Arc::new(StubLister {
        candidates: Vec::new(),
        fail_resolve: false,
    });

    let err = MediaDownloader::new(config, lister, fetcher)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CorruptLedger { .. }));
}

#[tokio::test]
async fn events_follow_the_run_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"payload"));
    let dl = downloader(config, vec![candidate(1, "a.bin", ".bin", 7)], fetcher).await;
    let mut rx = dl.subscribe();

    dl.run(RunRequest::new("chan")).await.unwrap();

    let events = drain_events(&mut rx);
    let kinds: Vec<&'static str> = events
        .iter()
        .map(|e| match e {
            Event::RunStarted { .. } => "run_started",
            Event::Listing { .. } => "listing",
            Event::CandidateSkipped { .. } => "candidate_skipped",
            Event::DownloadStarted { .. } => "download_started",
            Event::DownloadComplete { .. } => "download_complete",
            Event::DownloadFailed { .. } => "download_failed",
            Event::RunComplete { .. } => "run_complete",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "run_started",
            "listing",
            "download_started",
            "download_complete",
            "run_complete"
        ]
    );
}

#[tokio::test]
async fn retries_do_not_recharge_the_rate_gate() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    // Bucket holds exactly one candidate's worth of tokens; a second
    // acquire of the same size would have to wait about a second
    config.download.speed_limit_bps = Some(64);
    let fetcher = Arc::new(StubFetcher {
        payload: b"late".to_vec(),
        transient_failures: 2,
        permanent_ids: Vec::new(),
        calls: AtomicU32::new(0),
    });
    let dl = downloader(config, vec![candidate(1, "a.bin", ".bin", 64)], fetcher.clone()).await;

    let started = std::time::Instant::now();
    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(fetcher.calls(), 3);
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "retries re-charged the gate: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn downloader_debug_output_omits_collaborators() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::ok(b""));
    let dl = downloader(test_config(&dir), Vec::new(), fetcher).await;

    let rendered = format!("{dl:?}");
    assert!(rendered.starts_with("MediaDownloader"), "got {rendered}");
}

#[tokio::test]
async fn cancelled_downloader_dispatches_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fetcher = Arc::new(StubFetcher::ok(b"payload"));
    let dl = downloader(
        config,
        vec![candidate(1, "a.bin", ".bin", 7)],
        fetcher.clone(),
    )
    .await;

    dl.cancel();
    let summary = dl.run(RunRequest::new("chan")).await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(fetcher.calls(), 0);
}
