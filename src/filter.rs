//! Candidate filtering
//!
//! Pure decision logic applied to every listed candidate before any I/O
//! happens. Checks run in a fixed precedence order and short-circuit, so a
//! candidate failing several rules always reports the highest-precedence
//! rejection: already-downloaded, then extension whitelist, then extension
//! blacklist, then size bounds, then media-type selection.

use crate::config::FilterConfig;
use crate::ledger::LedgerStore;
use crate::types::{MediaCandidate, MediaSelection, SkipReason};

/// Outcome of evaluating one candidate against the filter rules
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Candidate should be downloaded
    Accept,
    /// Candidate is skipped for the given reason
    Reject(SkipReason),
}

impl Decision {
    /// Whether this decision admits the candidate
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

/// Evaluate one candidate against the ledger and filter configuration
///
/// Deterministic and side-effect free: the same candidate, ledger state, and
/// configuration always produce the same decision.
pub fn evaluate(
    candidate: &MediaCandidate,
    ledger: &LedgerStore,
    filter: &FilterConfig,
    selection: MediaSelection,
) -> Decision {
    // 1. Dedup against the ledger
    if ledger.contains(&candidate.file_id) {
        return Decision::Reject(SkipReason::AlreadyDownloaded);
    }

    let extension = candidate.extension.as_deref().map(normalize_extension);

    // 2. Whitelist: when non-empty, only listed extensions pass
    if !filter.allowed_extensions.is_empty() {
        let allowed = extension.as_deref().is_some_and(|ext| {
            filter
                .allowed_extensions
                .iter()
                .any(|a| normalize_extension(a) == ext)
        });
        if !allowed {
            return Decision::Reject(SkipReason::ExtensionNotAllowed);
        }
    }

    // 3. Blacklist
    if let Some(ext) = extension.as_deref()
        && filter
            .excluded_extensions
            .iter()
            .any(|e| normalize_extension(e) == ext)
    {
        return Decision::Reject(SkipReason::ExtensionExcluded);
    }

    // 4. Size bounds (inclusive)
    if candidate.size_bytes < filter.min_file_size || candidate.size_bytes > filter.max_file_size {
        return Decision::Reject(SkipReason::SizeOutOfBounds);
    }

    // 5. Media-type selection
    if !selection.matches(candidate.kind, candidate.mime_type.as_deref()) {
        return Decision::Reject(SkipReason::MediaTypeMismatch);
    }

    Decision::Accept
}

/// Lowercase an extension and ensure it carries a leading dot
fn normalize_extension(ext: &str) -> String {
    let lower = ext.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}
