//! Static channel catalog.
//!
//! A catalog directory holds mapping documents named `<site>.channels.xml`:
//!
//! ```xml
//! <channels>
//!   <channel site="sky.com" lang="en" xmltv_id="BBCOne.uk" site_id="101">BBC One</channel>
//! </channels>
//! ```
//!
//! Every entry with a `site_id` and a non-empty name is kept. Lookups go
//! through two structures:
//!
//! - an exact index from normalized name to entry. When two entries
//!   normalize to the same key, the one loaded later owns the key.
//! - a scan list holding every entry in load order, used by the similarity
//!   pass. Entries that lost their exact key are still reachable here.
//!
//! Files load in file-name order, so "later" is well defined.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::CatalogEntry;
use crate::normalize::Normalizer;
use crate::xml;

const CHANNELS_SUFFIX: &str = ".channels.xml";

#[derive(Debug, Clone)]
pub struct Catalog {
    normalizer: Normalizer,
    entries: Vec<CatalogEntry>,
    /// Normalized name of each entry, parallel to `entries`.
    keys: Vec<String>,
    exact: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            entries: Vec::new(),
            keys: Vec::new(),
            exact: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Build a catalog from already-parsed entries, indexing them in order.
    pub fn from_entries(normalizer: Normalizer, entries: Vec<CatalogEntry>) -> Self {
        let mut catalog = Self::new(normalizer);
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        let key = self.normalizer.normalize(&entry.original_name);
        let index = self.entries.len();
        if let Some(previous) = self.exact.insert(key.clone(), index) {
            debug!(
                key = %key,
                replaced = %self.entries[previous].original_name,
                by = %entry.original_name,
                "catalog key collision"
            );
        }
        self.by_name.insert(entry.original_name.clone(), index);
        self.keys.push(key);
        self.entries.push(entry);
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of distinct normalized keys.
    pub fn key_count(&self) -> usize {
        self.exact.len()
    }

    /// Entry owning the normalized key, if any.
    pub fn exact(&self, normalized: &str) -> Option<&CatalogEntry> {
        self.exact.get(normalized).map(|&i| &self.entries[i])
    }

    /// Entry by its literal name as written in the mapping document.
    pub fn by_name(&self, original_name: &str) -> Option<&CatalogEntry> {
        self.by_name.get(original_name).map(|&i| &self.entries[i])
    }

    /// Every entry with its normalized key, in load order.
    pub fn scan(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.keys.iter().map(String::as_str).zip(self.entries.iter())
    }
}

/// Load every `*.xml` mapping document in `dir`. A missing directory
/// yields an empty catalog; a malformed document is skipped.
pub fn load_catalog(dir: &Path, normalizer: Normalizer) -> Catalog {
    match try_load_catalog(dir, normalizer.clone()) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "catalog not loaded");
            Catalog::new(normalizer)
        }
    }
}

pub fn try_load_catalog(dir: &Path, normalizer: Normalizer) -> Result<Catalog> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::io(dir, e.into()))?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(".xml") {
            files.push(entry.into_path());
        }
    }
    info!(dir = %dir.display(), files = files.len(), "loading channel mappings");

    let mut catalog = Catalog::new(normalizer);
    for path in &files {
        match load_mapping_file(path) {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "loaded mapping file");
                for entry in entries {
                    catalog.insert(entry);
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping mapping file"),
        }
    }

    info!(
        entries = catalog.len(),
        keys = catalog.key_count(),
        "loaded channel mappings"
    );
    Ok(catalog)
}

/// Parse one mapping document. The site name comes from the file name.
pub fn load_mapping_file(path: &Path) -> Result<Vec<CatalogEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let site_name = site_name(&file_name);
    parse_mapping_document(&text, &site_name).map_err(|m| Error::xml(file_name, m))
}

pub fn parse_mapping_document(
    text: &str,
    site_name: &str,
) -> std::result::Result<Vec<CatalogEntry>, String> {
    let root = xml::parse_document(text)?;
    let entries = root
        .descendants_named("channel")
        .into_iter()
        .filter_map(|channel| {
            let site_id = channel.attr("site_id").unwrap_or_default();
            let name = channel.text();
            if site_id.is_empty() || name.is_empty() {
                return None;
            }
            Some(CatalogEntry {
                site_name: site_name.to_string(),
                site_id: site_id.to_string(),
                external_id: channel.attr("xmltv_id").unwrap_or_default().to_string(),
                language: channel.attr("lang").unwrap_or("en").to_string(),
                original_name: name,
            })
        })
        .collect();
    Ok(entries)
}

fn site_name(file_name: &str) -> String {
    file_name
        .strip_suffix(CHANNELS_SUFFIX)
        .or_else(|| file_name.strip_suffix(".xml"))
        .unwrap_or(file_name)
        .to_string()
}
