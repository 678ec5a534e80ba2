//! Matching engine.
//!
//! Two target universes are supported:
//!
//! - **Catalog mode** ([`CatalogMatcher`]): exact lookup in the catalog's
//!   normalized index, then a similarity scan over entries sharing the
//!   first character. A candidate must score strictly above the catalog
//!   threshold (80 by default). Runs across a bounded `rayon` pool; results
//!   come back in playlist order.
//! - **Guide mode** ([`GuideMatcher`]): exact pass over every display name
//!   of every guide channel, then a fuzzy pass taking the best of four
//!   scores. The best candidate is accepted at or above the threshold
//!   (70 by default).
//!
//! Only the exact paths report a score of 100. Similarity scores are
//! capped at 99.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::fuzzy;
use crate::guide::GuideDocument;
use crate::models::{ChannelRecord, MatchMethod, MatchResult, MatchSummary, MatchTarget};
use crate::normalize::Normalizer;

pub const DEFAULT_THRESHOLD: u8 = 70;
pub const DEFAULT_CATALOG_THRESHOLD: u8 = 80;
pub const MAX_WORKERS: usize = 32;
const FUZZY_CEILING: u8 = 99;

/// `min(32, 4 × available parallelism)`.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * 4).min(MAX_WORKERS)
}

pub struct CatalogMatcher<'a> {
    catalog: &'a Catalog,
    threshold: u8,
}

impl<'a> CatalogMatcher<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            threshold: DEFAULT_CATALOG_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn match_channel(&self, channel: &ChannelRecord) -> MatchResult {
        let name = self.catalog.normalizer().normalize(&channel.clean_name);
        let Some(first) = name.chars().next() else {
            return MatchResult::unmatched(channel.clone());
        };

        if let Some(entry) = self.catalog.exact(&name) {
            return MatchResult::exact(channel.clone(), MatchTarget::Catalog(entry.clone()));
        }

        let bar = f64::from(self.threshold) / 100.0;
        let mut best: Option<(f64, usize)> = None;
        for (i, (key, _)) in self.catalog.scan().enumerate() {
            if key.chars().next() != Some(first) {
                continue;
            }
            let score = fuzzy::similarity(&name, key);
            if score > bar && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, i));
            }
        }

        match best {
            Some((score, i)) => MatchResult {
                channel: channel.clone(),
                target: Some(MatchTarget::Catalog(self.catalog.entries()[i].clone())),
                score: fuzzy::to_score(score).min(FUZZY_CEILING),
                method: MatchMethod::Similarity,
                source_document: None,
            },
            None => MatchResult::unmatched(channel.clone()),
        }
    }

    /// Match every channel on a pool of `workers` threads (0 = automatic).
    /// Output order follows `channels`.
    pub fn match_all(&self, channels: &[ChannelRecord], workers: usize) -> Vec<MatchResult> {
        let workers = if workers == 0 {
            default_workers()
        } else {
            workers.min(MAX_WORKERS)
        };
        info!(
            channels = channels.len(),
            catalog = self.catalog.len(),
            workers,
            "matching against catalog"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build();
        let results: Vec<MatchResult> = match pool {
            Ok(pool) => pool.install(|| {
                channels
                    .par_iter()
                    .map(|channel| self.match_channel(channel))
                    .collect()
            }),
            Err(e) => {
                warn!(error = %e, "worker pool unavailable, matching sequentially");
                channels.iter().map(|c| self.match_channel(c)).collect()
            }
        };

        log_summary(&results);
        results
    }
}

pub struct GuideMatcher<'a> {
    document: &'a GuideDocument,
    normalizer: Normalizer,
    threshold: u8,
    /// Normalized display names, parallel to `document.channels`.
    names: Vec<Vec<String>>,
}

impl<'a> GuideMatcher<'a> {
    /// Uses the matching profile with the built-in region prefixes.
    pub fn new(document: &'a GuideDocument) -> Self {
        Self::with_normalizer(document, Normalizer::catalog())
    }

    pub fn with_normalizer(document: &'a GuideDocument, normalizer: Normalizer) -> Self {
        let names = document
            .channels
            .iter()
            .map(|c| c.display_names.iter().map(|n| normalizer.normalize(n)).collect())
            .collect();
        Self {
            document,
            normalizer,
            threshold: DEFAULT_THRESHOLD,
            names,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn match_channel(&self, channel: &ChannelRecord) -> MatchResult {
        self.best_match(channel).with_source(self.document.name.clone())
    }

    fn best_match(&self, channel: &ChannelRecord) -> MatchResult {
        let name = self.normalizer.normalize(&channel.clean_name);
        if name.is_empty() {
            return MatchResult::unmatched(channel.clone());
        }

        for (i, names) in self.names.iter().enumerate() {
            if names.iter().any(|n| *n == name) {
                let target = MatchTarget::Guide(self.document.channels[i].clone());
                return MatchResult::exact(channel.clone(), target);
            }
        }

        let mut best_score = 0u8;
        let mut best: Option<(usize, MatchMethod)> = None;
        for (i, names) in self.names.iter().enumerate() {
            for candidate in names {
                for (method, score) in fuzzy::all_scores(&name, candidate) {
                    if score > best_score {
                        best_score = score;
                        best = Some((i, method));
                    }
                }
            }
        }

        // Candidates compete on raw scores; only the reported score is capped.
        let best_score = best_score.min(FUZZY_CEILING);
        match best {
            Some((i, method)) if best_score >= self.threshold => MatchResult {
                channel: channel.clone(),
                target: Some(MatchTarget::Guide(self.document.channels[i].clone())),
                score: best_score,
                method,
                source_document: None,
            },
            _ => {
                debug!(channel = %channel.raw_name, best_score, "no match above threshold");
                MatchResult::unmatched(channel.clone())
            }
        }
    }

    pub fn match_all(&self, channels: &[ChannelRecord]) -> Vec<MatchResult> {
        info!(
            channels = channels.len(),
            guide = %self.document.name,
            candidates = self.document.channels.len(),
            threshold = self.threshold,
            "matching against guide"
        );
        let results: Vec<MatchResult> = channels.iter().map(|c| self.match_channel(c)).collect();
        log_summary(&results);
        results
    }
}

/// Match one channel against a catalog with the default catalog threshold.
pub fn match_catalog(channel: &ChannelRecord, catalog: &Catalog) -> MatchResult {
    CatalogMatcher::new(catalog).match_channel(channel)
}

/// Match one channel against a guide document.
pub fn match_guide(
    channel: &ChannelRecord,
    document: &GuideDocument,
    threshold: u8,
) -> MatchResult {
    GuideMatcher::new(document)
        .with_threshold(threshold)
        .match_channel(channel)
}

fn log_summary(results: &[MatchResult]) {
    let summary = MatchSummary::from_results(results);
    info!(
        exact = summary.exact,
        fuzzy = summary.fuzzy,
        unmatched = summary.unmatched,
        "matching finished"
    );
}
