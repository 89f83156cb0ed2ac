//! Channel link extraction from message text.
//!
//! Scans message texts and captions for Telegram channel links in all their
//! spellings (full URLs, bare `t.me/` references, `@username` mentions,
//! invite links, private `/c/` message links) and aggregates them into a
//! JSON-serializable report. The extractor never touches the network; the
//! embedder feeds it texts obtained through the listing collaborator.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use url::Url;

/// Where in a message a link was found
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkContext {
    /// Main message text
    Text,
    /// Media caption
    Caption,
}

impl LinkContext {
    fn key(&self) -> &'static str {
        match self {
            LinkContext::Text => "text",
            LinkContext::Caption => "caption",
        }
    }
}

/// One message's extractable texts
#[derive(Clone, Debug, Default)]
pub struct MessageText {
    /// Id of the message
    pub message_id: i64,
    /// Id of the containing chat, if known
    pub chat_id: Option<i64>,
    /// Main message text
    pub text: Option<String>,
    /// Media caption
    pub caption: Option<String>,
}

/// A single link occurrence
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// The matched link text, verbatim
    pub link: String,
    /// Message the link was found in
    pub message_id: i64,
    /// Chat the message belongs to, if known
    pub chat_id: Option<i64>,
    /// Where in the message it was found
    pub context: LinkContext,
    /// Byte span of the match within the source text
    pub position: (usize, usize),
    /// When the extraction ran
    pub timestamp: DateTime<Utc>,
}

/// Header block of an [`ExtractionReport`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionInfo {
    /// Channel the messages came from
    pub channel_identifier: String,
    /// When the extraction ran
    pub extraction_date: DateTime<Utc>,
    /// Number of messages scanned
    pub total_messages_processed: u64,
    /// Number of link occurrences found (duplicates included)
    pub total_links_found: u64,
}

/// Aggregate statistics over the extracted links
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractionStatistics {
    /// Occurrence counts per context ("text", "caption")
    pub link_types: BTreeMap<String, u64>,
    /// Number of distinct link strings
    pub unique_links: u64,
}

/// Full result of one extraction pass
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Run metadata
    pub extraction_info: ExtractionInfo,
    /// Every link occurrence in message order
    pub links: Vec<ExtractedLink>,
    /// Aggregate statistics
    pub statistics: ExtractionStatistics,
}

impl ExtractionReport {
    /// Write the report as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Link report saved");
        Ok(())
    }
}

/// Scans message texts for Telegram channel links
#[derive(Clone, Debug)]
pub struct LinkExtractor {
    patterns: Vec<Regex>,
}

impl LinkExtractor {
    /// Compile the link patterns
    pub fn new() -> Result<Self> {
        // Specific forms first; the bare t.me pattern also matches inside
        // the full-URL forms, which inflates occurrence counts the same way
        // for every spelling and washes out in the unique count
        let sources = [
            r"(?i)https?://t\.me/joinchat/[a-zA-Z0-9_-]+",
            r"(?i)https?://t\.me/c/\d+/\d+",
            r"(?i)https?://t\.me/[a-zA-Z0-9_]+",
            r"(?i)\bt\.me/[a-zA-Z0-9_]+",
            r"@[a-zA-Z0-9_]{5,32}",
        ];
        let patterns = sources
            .iter()
            .map(|s| Regex::new(s).map_err(|e| Error::Other(format!("Invalid link pattern: {e}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Extract every link occurrence from one piece of text
    pub fn extract_from_text(
        &self,
        text: &str,
        message_id: i64,
        chat_id: Option<i64>,
        context: LinkContext,
    ) -> Vec<ExtractedLink> {
        let now = Utc::now();
        let mut links = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.find_iter(text) {
                links.push(ExtractedLink {
                    link: m.as_str().to_string(),
                    message_id,
                    chat_id,
                    context,
                    position: (m.start(), m.end()),
                    timestamp: now,
                });
            }
        }
        links
    }

    /// Extract links from a message's text and caption
    pub fn extract_from_message(&self, message: &MessageText) -> Vec<ExtractedLink> {
        let mut links = Vec::new();
        if let Some(text) = &message.text {
            links.extend(self.extract_from_text(
                text,
                message.message_id,
                message.chat_id,
                LinkContext::Text,
            ));
        }
        if let Some(caption) = &message.caption {
            links.extend(self.extract_from_text(
                caption,
                message.message_id,
                message.chat_id,
                LinkContext::Caption,
            ));
        }
        links
    }

    /// Scan a set of messages and build the aggregate report
    pub fn build_report(
        &self,
        channel_identifier: &str,
        messages: &[MessageText],
    ) -> ExtractionReport {
        let mut links = Vec::new();
        for message in messages {
            links.extend(self.extract_from_message(message));
        }

        let mut link_types = BTreeMap::new();
        for link in &links {
            *link_types.entry(link.context.key().to_string()).or_insert(0u64) += 1;
        }
        let unique: HashSet<&str> = links.iter().map(|l| l.link.as_str()).collect();

        tracing::info!(
            channel = channel_identifier,
            messages = messages.len(),
            links = links.len(),
            unique = unique.len(),
            "Link extraction complete"
        );

        ExtractionReport {
            extraction_info: ExtractionInfo {
                channel_identifier: channel_identifier.to_string(),
                extraction_date: Utc::now(),
                total_messages_processed: messages.len() as u64,
                total_links_found: links.len() as u64,
            },
            statistics: ExtractionStatistics {
                link_types,
                unique_links: unique.len() as u64,
            },
            links,
        }
    }
}

/// Normalize a matched link to a bare channel name where one exists
///
/// Returns `None` for invite and `/c/` message links, which carry no public
/// username.
pub fn channel_name(link: &str) -> Option<String> {
    if let Some(stripped) = link.strip_prefix('@') {
        return Some(stripped.to_string());
    }
    let with_scheme = if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{link}")
    };
    let url = Url::parse(&with_scheme).ok()?;
    if url.host_str() != Some("t.me") {
        return None;
    }
    let mut segments = url.path_segments()?;
    let first = segments.next()?;
    match first {
        "joinchat" | "c" | "" => None,
        name => Some(name.to_string()),
    }
}
