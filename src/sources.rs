//! Region → guide source resolution.
//!
//! A region's guides are the union of three places, in this order:
//!
//! 1. `[regions.XX].guides` in the config (URLs or local paths),
//! 2. the legacy JSON sources file named by `[sources].json`,
//! 3. files already sitting in `paths.epg_dir` whose names carry the code
//!    (`*_UK_*.xml`, `*_UK1.xml`, optionally gzipped).
//!
//! Duplicates are dropped, keeping the first occurrence.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;

static CODE_IN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_([A-Z]{2})(?:_|[0-9])").unwrap());

static CODE_IN_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([a-z]{2})/").unwrap());

/// Where a region's guides come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSources {
    pub code: String,
    /// Playlist prefix used to filter channels for this region.
    pub prefix: String,
    pub remote: Vec<String>,
    pub local: Vec<PathBuf>,
}

impl RegionSources {
    pub fn is_empty(&self) -> bool {
        self.remote.is_empty() && self.local.is_empty()
    }

    fn push_remote(&mut self, url: &str) {
        if !self.remote.iter().any(|u| u == url) {
            self.remote.push(url.to_string());
        }
    }

    fn push_local(&mut self, path: PathBuf) {
        if !self.local.contains(&path) {
            self.local.push(path);
        }
    }
}

/// `"UK:"`, `"uk"`, `"UK"` → `Some("UK")`. Anything that is not exactly
/// two ASCII letters once a trailing colon is dropped is rejected.
pub fn region_code(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim();
    let code = trimmed.strip_suffix(':').unwrap_or(trimmed);
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// Region code embedded in a guide file name or URL, e.g.
/// `epg_ripper_UK1.xml.gz` → `UK`, `https://host/epg/uk/guide.xml` → `UK`.
pub fn extract_region_code(name: &str) -> Option<String> {
    let base = name.rsplit('/').next().unwrap_or(name);
    if let Some(caps) = CODE_IN_NAME.captures(base) {
        return Some(caps[1].to_string());
    }
    CODE_IN_PATH
        .captures(name)
        .map(|caps| caps[1].to_ascii_uppercase())
}

fn is_remote(source: &str) -> bool {
    source.contains("://")
}

// ═══════════════════════════════════════════════════════════════════════
// Legacy JSON sources file
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    country_mappings: Option<BTreeMap<String, OneOrMany>>,
    #[serde(default)]
    epg_sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(url) => vec![url],
            OneOrMany::Many(urls) => urls,
        }
    }
}

/// Read a sources file into `code → urls`.
///
/// `country_mappings` wins when present. Otherwise each URL of the flat
/// `epg_sources` list is assigned to the region named in its file name or
/// path (see [`extract_region_code`]); URLs without a code are skipped.
pub fn load_sources_json(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {}", path.display()))?;
    parse_sources_json(&content)
        .with_context(|| format!("Failed to parse sources file: {}", path.display()))
}

pub fn parse_sources_json(content: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let file: SourcesFile = serde_json::from_str(content)?;
    let mut mappings: BTreeMap<String, Vec<String>> = BTreeMap::new();

    if let Some(countries) = file.country_mappings {
        for (key, urls) in countries {
            match region_code(&key) {
                Some(code) => mappings.entry(code).or_default().extend(urls.into_vec()),
                None => {
                    tracing::warn!(key = %key, "ignoring sources entry with invalid region code")
                }
            }
        }
        return Ok(mappings);
    }

    for url in file.epg_sources {
        match extract_region_code(&url) {
            Some(code) => mappings.entry(code).or_default().push(url.clone()),
            None => tracing::debug!(url = %url, "no region code in source url"),
        }
    }
    Ok(mappings)
}

// ═══════════════════════════════════════════════════════════════════════
// Local files
// ═══════════════════════════════════════════════════════════════════════

fn region_globs(code: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in ["xml", "xml.gz"] {
        builder.add(Glob::new(&format!("*_{}_*.{}", code, ext))?);
        builder.add(Glob::new(&format!("*_{}[0-9]*.{}", code, ext))?);
    }
    Ok(builder.build()?)
}

/// Guide files in `epg_dir` (top level only) whose names carry `code`.
/// Sorted by file name; a missing directory yields nothing.
pub fn local_guides(epg_dir: &Path, code: &str) -> Result<Vec<PathBuf>> {
    if !epg_dir.is_dir() {
        return Ok(Vec::new());
    }
    let globs = region_globs(code)?;

    let mut found = BTreeSet::new();
    for entry in WalkDir::new(epg_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if globs.is_match(entry.file_name()) {
            found.insert(entry.into_path());
        }
    }
    Ok(found.into_iter().collect())
}

// ═══════════════════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════════════════

/// Every region code known to the config or the sources file, sorted.
pub fn known_regions(config: &Config) -> Result<Vec<String>> {
    let mut codes: BTreeSet<String> = config.regions.keys().cloned().collect();
    if let Some(json) = &config.sources.json {
        codes.extend(load_sources_json(json)?.into_keys());
    }
    Ok(codes.into_iter().collect())
}

/// Resolve the guide sources for `code` (already a valid region code).
pub fn resolve_region(config: &Config, code: &str) -> Result<RegionSources> {
    let mut sources = RegionSources {
        code: code.to_string(),
        prefix: config.region_prefix(code),
        ..Default::default()
    };

    if let Some(region) = config.regions.get(code) {
        for guide in &region.guides {
            if is_remote(guide) {
                sources.push_remote(guide);
            } else {
                sources.push_local(PathBuf::from(guide));
            }
        }
    }

    if let Some(json) = &config.sources.json {
        let mappings = load_sources_json(json)?;
        for url in mappings.get(code).into_iter().flatten() {
            if is_remote(url) {
                sources.push_remote(url);
            } else {
                sources.push_local(PathBuf::from(url));
            }
        }
    }

    for path in local_guides(&config.paths.epg_dir, code)? {
        sources.push_local(path);
    }

    tracing::debug!(
        region = %code,
        remote = sources.remote.len(),
        local = sources.local.len(),
        "resolved region sources"
    );
    Ok(sources)
}

pub fn list_sources(config: &Config) -> Result<()> {
    let regions = known_regions(config)?;
    if regions.is_empty() {
        println!("No regions configured.");
        return Ok(());
    }

    println!("{:<8} {:<10} {:<8} {:<8} STATUS", "REGION", "PREFIX", "REMOTE", "LOCAL");
    for code in &regions {
        let sources = resolve_region(config, code)?;
        let status = if sources.is_empty() {
            "NO SOURCES"
        } else {
            "OK"
        };
        println!(
            "{:<8} {:<10} {:<8} {:<8} {}",
            code,
            sources.prefix,
            sources.remote.len(),
            sources.local.len(),
            status
        );
    }

    Ok(())
}
