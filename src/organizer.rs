//! Output file organization
//!
//! Maps a media candidate to a safe location under the output root, writes
//! the fetched bytes atomically, and optionally drops a JSON metadata
//! sidecar next to the file. Folder layout is driven by the organize
//! settings: `<root>[/<channel>][/<YYYY-MM-DD>]/<media-kind>/<file>`.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::{FileRecord, MediaCandidate};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Characters that are unsafe in file names on at least one supported platform
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Give up rather than scan forever when a directory is full of collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Make a file name safe for the local filesystem
///
/// Path separators and other invalid characters are replaced with
/// underscores, leading and trailing spaces and dots are stripped (Windows
/// rejects them), and an empty result falls back to `unnamed_file`. Any
/// path components in the input are reduced to their final component first,
/// so a name like `../../etc/passwd` cannot escape the destination
/// directory.
pub fn sanitize_file_name(name: &str) -> String {
    // Keep only the final path component
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let replaced: String = base
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches([' ', '.']).to_string();

    if trimmed.is_empty() {
        "unnamed_file".to_string()
    } else {
        trimmed
    }
}

/// Compute the destination directory for a candidate
///
/// Layout under the output root, outermost first: channel folder (when
/// `organize_by_channel`), date folder from the message date (when
/// `organize_by_date`), then a media-kind folder. The channel folder name
/// is sanitized like a file name.
pub fn destination_dir(config: &DownloadConfig, candidate: &MediaCandidate) -> PathBuf {
    let mut dir = config.output_dir.clone();

    if config.organize_by_channel {
        dir.push(sanitize_file_name(&candidate.channel_name));
    }
    if config.organize_by_date {
        dir.push(candidate.message_date.format("%Y-%m-%d").to_string());
    }
    dir.push(candidate.kind.folder_name());

    dir
}

/// Find a path that does not collide with an existing file
///
/// If `path` is free it is returned unchanged. Otherwise ` (1)`, ` (2)`, ...
/// is appended to the stem until a free name is found.
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Other(format!(
        "could not find unique name for {} after {MAX_RENAME_ATTEMPTS} attempts",
        path.display()
    )))
}

/// Write media bytes to `final_path` atomically
///
/// Bytes go to a `.part` temp file in the destination directory, which is
/// synced and then renamed into place. On any failure the temp file is
/// removed; a partial file never appears at the final path.
pub fn write_media(bytes: &[u8], final_path: &Path) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_path = final_path.as_os_str().to_owned();
    tmp_path.push(".part");
    let tmp_path = PathBuf::from(tmp_path);

    let write_result = (|| -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&tmp_path, final_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// SHA-256 hex digest of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Metadata sidecar written next to a downloaded file
#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    message_id: i64,
    channel_id: i64,
    channel_name: &'a str,
    date: String,
    sender: Option<&'a str>,
    file_name: String,
    file_size: u64,
    content_hash: &'a str,
    downloaded_at: String,
}

/// Write a `<file>.json` metadata sidecar next to a downloaded file
///
/// Sidecar failures are logged and swallowed; metadata is best-effort and
/// never fails the download that produced it.
pub fn write_metadata(candidate: &MediaCandidate, record: &FileRecord, file_path: &Path) {
    let sidecar = Sidecar {
        message_id: candidate.message_id,
        channel_id: candidate.channel_id,
        channel_name: &candidate.channel_name,
        date: candidate.message_date.to_rfc3339(),
        sender: candidate.sender.as_deref(),
        file_name: file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: record.size_bytes,
        content_hash: &record.content_hash,
        downloaded_at: Utc::now().to_rfc3339(),
    };

    let mut sidecar_path = file_path.as_os_str().to_owned();
    sidecar_path.push(".json");
    let sidecar_path = PathBuf::from(sidecar_path);

    let result = serde_json::to_string_pretty(&sidecar)
        .map_err(Error::from)
        .and_then(|json| std::fs::write(&sidecar_path, json).map_err(Error::from));

    if let Err(e) = result {
        tracing::warn!(
            error = %e,
            path = %sidecar_path.display(),
            "Failed to write metadata sidecar"
        );
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileId, MediaKind};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn candidate() -> MediaCandidate {
        MediaCandidate {
            file_id: FileId::new("video_1_2"),
            remote_id: "remote".into(),
            channel_id: 42,
            channel_name: "My Channel".into(),
            message_id: 1,
            file_name: Some("clip.mp4".into()),
            extension: Some(".mp4".into()),
            size_bytes: 4,
            kind: MediaKind::Video,
            mime_type: Some("video/mp4".into()),
            message_date: chrono::Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
            sender: Some("alice".into()),
        }
    }

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_file_name("a<b>c:d\"e|f?g*h"), "a_b_c_d_e_f_g_h");
    }

    #[test]
    fn sanitize_strips_leading_and_trailing_dots_and_spaces() {
        assert_eq!(sanitize_file_name("  file.txt.  "), "file.txt");
        assert_eq!(sanitize_file_name("...hidden"), "hidden");
    }

    #[test]
    fn sanitize_empty_input_falls_back() {
        assert_eq!(sanitize_file_name(""), "unnamed_file");
        assert_eq!(sanitize_file_name("   "), "unnamed_file");
        assert_eq!(sanitize_file_name("..."), "unnamed_file");
    }

    #[test]
    fn sanitize_defuses_path_traversal() {
        let name = sanitize_file_name("../../etc/passwd");
        assert_eq!(name, "passwd");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));

        let windows = sanitize_file_name("..\\..\\windows\\system32");
        assert_eq!(windows, "system32");
    }

    #[test]
    fn sanitize_replaces_control_characters() {
        assert_eq!(sanitize_file_name("a\x00b\nc"), "a_b_c");
    }

    #[test]
    fn destination_uses_channel_and_kind_folders_by_default() {
        let config = DownloadConfig::default();
        let dir = destination_dir(&config, &candidate());
        assert_eq!(dir, PathBuf::from("downloads/My Channel/videos"));
    }

    #[test]
    fn destination_adds_date_folder_when_enabled() {
        let config = DownloadConfig {
            organize_by_date: true,
            ..DownloadConfig::default()
        };
        let dir = destination_dir(&config, &candidate());
        assert_eq!(dir, PathBuf::from("downloads/My Channel/2024-03-15/videos"));
    }

    #[test]
    fn destination_flat_when_organization_disabled() {
        let config = DownloadConfig {
            organize_by_channel: false,
            organize_by_date: false,
            ..DownloadConfig::default()
        };
        let dir = destination_dir(&config, &candidate());
        assert_eq!(dir, PathBuf::from("downloads/videos"));
    }

    #[test]
    fn destination_sanitizes_channel_name() {
        let config = DownloadConfig::default();
        let mut c = candidate();
        c.channel_name = "bad/channel:name".into();
        let dir = destination_dir(&config, &c);
        // Path components collapse to the final one, then ':' is replaced
        assert_eq!(dir, PathBuf::from("downloads/channel_name/videos"));
    }

    #[test]
    fn unique_path_returns_original_when_free() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        assert_eq!(unique_path(&path).unwrap(), path);
    }

    #[test]
    fn unique_path_appends_counter_suffixes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let first = unique_path(&path).unwrap();
        assert_eq!(first, dir.path().join("clip (1).mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = unique_path(&path).unwrap();
        assert_eq!(second, dir.path().join("clip (2).mp4"));
    }

    #[test]
    fn unique_path_handles_names_without_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive");
        std::fs::write(&path, b"x").unwrap();

        assert_eq!(unique_path(&path).unwrap(), dir.path().join("archive (1)"));
    }

    #[test]
    fn write_media_creates_parents_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channel/videos/clip.mp4");

        write_media(b"data", &path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        let parent_entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(parent_entries, vec![std::ffi::OsString::from("clip.mp4")]);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sidecar_is_written_next_to_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let c = candidate();
        let record = FileRecord {
            file_id: c.file_id.clone(),
            channel_id: c.channel_id,
            message_id: c.message_id,
            file_path: PathBuf::from("clip.mp4"),
            size_bytes: 4,
            content_hash: sha256_hex(b"data"),
            downloaded_at: Utc::now(),
        };
        write_metadata(&c, &record, &path);

        let sidecar_path = dir.path().join("clip.mp4.json");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sidecar_path).unwrap()).unwrap();
        assert_eq!(json["message_id"], 1);
        assert_eq!(json["channel_name"], "My Channel");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["file_name"], "clip.mp4");
        assert_eq!(json["file_size"], 4);
    }

    #[test]
    fn sidecar_failure_does_not_panic() {
        // Point the sidecar at a directory that cannot exist below a file
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let c = candidate();
        let record = FileRecord {
            file_id: c.file_id.clone(),
            channel_id: c.channel_id,
            message_id: c.message_id,
            file_path: PathBuf::from("clip.mp4"),
            size_bytes: 4,
            content_hash: "x".into(),
            downloaded_at: Utc::now(),
        };
        // blocker is a file, so blocker/clip.mp4.json cannot be created;
        // write_metadata logs and returns
        write_metadata(&c, &record, &blocker.join("clip.mp4"));
    }
}
