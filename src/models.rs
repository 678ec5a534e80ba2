//! Core data models used throughout the harness.
//!
//! These types represent the playlist channels, catalog entries, guide
//! channels, and match results that flow through the loading, matching,
//! and consolidation pipeline. All of them are read-only snapshots built
//! once per run; the only field written after construction is
//! [`MatchResult::source_document`], set when results from several guide
//! documents are folded together.

use std::fmt;

use crate::xml::XmlElement;

/// A channel entry from a subscriber playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    /// Name exactly as it appeared in the playlist.
    pub raw_name: String,
    /// `raw_name` with the region prefix removed.
    pub clean_name: String,
    /// `tvg-id` (M3U) or channel id (XML playlist). Empty when absent.
    pub external_id: String,
    /// Stream URL, or a synthesized `#EXTURL:` placeholder for XML playlists.
    pub stream_ref: String,
    /// The metadata line this record was parsed from.
    pub source_line: String,
}

/// One row of a static channel mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub site_name: String,
    pub site_id: String,
    pub external_id: String,
    pub language: String,
    pub original_name: String,
}

/// A `<channel>` element of a guide document.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideChannel {
    pub id: String,
    /// Non-empty, trimmed display names in document order. Never empty.
    pub display_names: Vec<String>,
    /// `src` attributes of the channel's icons.
    pub icons: Vec<String>,
    /// Every child element that is not a `display-name`, in document order.
    pub extra_children: Vec<XmlElement>,
}

impl GuideChannel {
    /// The name used for listings and reports.
    pub fn primary_name(&self) -> &str {
        self.display_names.first().map(String::as_str).unwrap_or("")
    }
}

/// A `<programme>` element, kept opaque apart from its channel reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammeEntry {
    pub channel_id: String,
    pub element: XmlElement,
}

/// How a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMethod {
    Exact,
    Similarity,
    Partial,
    TokenSort,
    TokenSet,
    None,
}

impl MatchMethod {
    pub fn label(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "Exact match",
            MatchMethod::Similarity => "String similarity",
            MatchMethod::Partial => "Partial match",
            MatchMethod::TokenSort => "Token sort",
            MatchMethod::TokenSet => "Token set",
            MatchMethod::None => "None",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The entity a playlist channel was matched to.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTarget {
    Catalog(CatalogEntry),
    Guide(GuideChannel),
}

impl MatchTarget {
    /// Catalog `xmltv_id` or guide channel id, whichever applies.
    pub fn native_id(&self) -> &str {
        match self {
            MatchTarget::Catalog(entry) => &entry.external_id,
            MatchTarget::Guide(channel) => &channel.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            MatchTarget::Catalog(entry) => &entry.original_name,
            MatchTarget::Guide(channel) => channel.primary_name(),
        }
    }

    pub fn as_guide(&self) -> Option<&GuideChannel> {
        match self {
            MatchTarget::Guide(channel) => Some(channel),
            MatchTarget::Catalog(_) => None,
        }
    }
}

/// Outcome of matching one playlist channel.
///
/// `target == None` and `method == MatchMethod::None` together denote
/// "no match above threshold". A score of 100 is only ever produced by
/// [`MatchMethod::Exact`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub channel: ChannelRecord,
    pub target: Option<MatchTarget>,
    /// 0..=100
    pub score: u8,
    pub method: MatchMethod,
    /// File name of the guide document the target came from.
    pub source_document: Option<String>,
}

impl MatchResult {
    pub fn unmatched(channel: ChannelRecord) -> Self {
        Self {
            channel,
            target: None,
            score: 0,
            method: MatchMethod::None,
            source_document: None,
        }
    }

    pub fn exact(channel: ChannelRecord, target: MatchTarget) -> Self {
        Self {
            channel,
            target: Some(target),
            score: 100,
            method: MatchMethod::Exact,
            source_document: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_perfect(&self) -> bool {
        self.is_matched() && self.score == 100
    }

    pub fn with_source(mut self, document: impl Into<String>) -> Self {
        self.source_document = Some(document.into());
        self
    }
}

/// Counts reported after a matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub total: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub unmatched: usize,
}

impl MatchSummary {
    pub fn from_results(results: &[MatchResult]) -> Self {
        let mut summary = MatchSummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.method {
                MatchMethod::Exact => summary.exact += 1,
                MatchMethod::None => summary.unmatched += 1,
                _ => summary.fuzzy += 1,
            }
        }
        summary
    }

    pub fn matched(&self) -> usize {
        self.exact + self.fuzzy
    }

    /// Share of matched channels as a percentage with one decimal of precision.
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.matched() as f64 * 1000.0 / self.total as f64).round() / 10.0
    }
}
