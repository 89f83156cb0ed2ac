//! Persistent ledger of completed downloads
//!
//! The ledger is a flat JSON file mapping stable file ids to records of
//! completed downloads. It is the single source of truth for deduplication
//! and resume: re-running over the same channel skips every file the ledger
//! already contains. A file id is only committed after its bytes are safely
//! on disk, so the ledger never claims a file that does not exist.

use crate::error::{Error, Result};
use crate::types::{FileId, FileRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// On-disk shape of the ledger file
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    /// When the ledger was last written
    last_updated: Option<DateTime<Utc>>,
    /// Completed downloads keyed by file id
    #[serde(default)]
    files: HashMap<FileId, FileRecord>,
}

/// In-memory view of the download ledger, backed by a JSON file
///
/// `contains` is an O(1) in-memory lookup; `commit` persists the whole
/// ledger durably before returning. Commits rewrite the file via a temp
/// file and atomic rename, so a crash mid-commit leaves the previous
/// ledger intact.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    records: HashMap<FileId, FileRecord>,
}

impl LedgerStore {
    /// Load the ledger from `path`
    ///
    /// A missing file yields an empty ledger (first run). A file that exists
    /// but cannot be parsed yields [`Error::CorruptLedger`]; the caller
    /// decides whether to abort or move the file aside and start fresh.
    /// A corrupt ledger is never silently replaced.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No ledger file, starting empty");
                return Ok(Self {
                    path,
                    records: HashMap::new(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let file: LedgerFile =
            serde_json::from_str(&contents).map_err(|e| Error::CorruptLedger {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            path = %path.display(),
            entries = file.files.len(),
            "Loaded download ledger"
        );

        Ok(Self {
            path,
            records: file.files,
        })
    }

    /// Whether a file id has already been downloaded
    pub fn contains(&self, file_id: &FileId) -> bool {
        self.records.contains_key(file_id)
    }

    /// Get the record for a file id, if present
    pub fn get(&self, file_id: &FileId) -> Option<&FileRecord> {
        self.records.get(file_id)
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger has no entries
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all committed records
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a record and durably persist the ledger before returning
    ///
    /// Committing an id that is already present overwrites the previous
    /// record (last write wins); commits are idempotent.
    pub fn commit(&mut self, record: FileRecord) -> Result<()> {
        self.records.insert(record.file_id.clone(), record);
        self.persist()
    }

    /// Rewrite the backing file from the in-memory map
    fn persist(&self) -> Result<()> {
        let file = LedgerFile {
            last_updated: Some(Utc::now()),
            files: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // Write-to-temp then rename so a crash cannot corrupt the ledger
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}
