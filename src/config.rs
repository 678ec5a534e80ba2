//! TOML configuration.
//!
//! Every section is optional; a missing section takes its defaults. See
//! `config/epgh.example.toml` for a complete file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::consolidate::{ConsolidationPolicy, DuplicateIdPolicy};
use crate::matcher::{DEFAULT_CATALOG_THRESHOLD, DEFAULT_THRESHOLD};
use crate::normalize::{Normalizer, DEFAULT_REGION_PREFIXES};
use crate::sources::region_code;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    /// Keyed by two-letter region code.
    #[serde(default)]
    pub regions: BTreeMap<String, RegionConfig>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_epg_dir")]
    pub epg_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_playlist_dir")]
    pub playlist_dir: PathBuf,
    #[serde(default = "default_channels_dir")]
    pub channels_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            epg_dir: default_epg_dir(),
            output_dir: default_output_dir(),
            playlist_dir: default_playlist_dir(),
            channels_dir: default_channels_dir(),
        }
    }
}

fn default_epg_dir() -> PathBuf {
    PathBuf::from("epg_data")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("export_epg")
}
fn default_playlist_dir() -> PathBuf {
    PathBuf::from("playlist_data")
}
fn default_channels_dir() -> PathBuf {
    PathBuf::from("channels")
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_catalog_threshold")]
    pub catalog_threshold: u8,
    #[serde(default)]
    pub only_perfect: bool,
    #[serde(default)]
    pub duplicate_ids: DuplicateIdPolicy,
    #[serde(default = "default_region_prefixes")]
    pub region_prefixes: Vec<String>,
    /// 0 picks `min(32, 4 × cores)`.
    #[serde(default)]
    pub workers: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            catalog_threshold: DEFAULT_CATALOG_THRESHOLD,
            only_perfect: false,
            duplicate_ids: DuplicateIdPolicy::default(),
            region_prefixes: default_region_prefixes(),
            workers: 0,
        }
    }
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}
fn default_catalog_threshold() -> u8 {
    DEFAULT_CATALOG_THRESHOLD
}
fn default_region_prefixes() -> Vec<String> {
    DEFAULT_REGION_PREFIXES.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_age_days: default_max_age_days(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_age_days() -> i64 {
    1
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PlaylistConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegionConfig {
    /// Playlist prefix; defaults to `"<CODE>:"`.
    #[serde(default)]
    pub prefix: Option<String>,
    /// URLs or local paths of guide documents.
    #[serde(default)]
    pub guides: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    /// Legacy JSON sources file.
    #[serde(default)]
    pub json: Option<PathBuf>,
}

impl Config {
    /// Defaults only, for commands that can run on flags alone.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn consolidation_policy(&self) -> ConsolidationPolicy {
        ConsolidationPolicy {
            only_perfect: self.matching.only_perfect,
            duplicate_ids: self.matching.duplicate_ids,
        }
    }

    /// Normalizer for both matching modes, using the configured prefixes.
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::catalog().with_region_prefixes(&self.matching.region_prefixes)
    }

    /// Playlist prefix for a region code.
    pub fn region_prefix(&self, code: &str) -> String {
        self.regions
            .get(code)
            .and_then(|r| r.prefix.clone())
            .unwrap_or_else(|| format!("{}:", code))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
/// A file that exists but is invalid is still an error.
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate matching
    if config.matching.threshold > 100 {
        bail!("matching.threshold must be in [0, 100]");
    }
    if config.matching.catalog_threshold > 100 {
        bail!("matching.catalog_threshold must be in [0, 100]");
    }
    if config
        .matching
        .region_prefixes
        .iter()
        .any(|p| p.trim().is_empty())
    {
        bail!("matching.region_prefixes must not contain empty prefixes");
    }

    // Validate fetch
    if config.fetch.timeout_secs == 0 {
        bail!("fetch.timeout_secs must be > 0");
    }
    if config.fetch.max_age_days < 1 {
        bail!("fetch.max_age_days must be >= 1");
    }

    // Validate regions
    for (code, region) in &config.regions {
        if region_code(code).as_deref() != Some(code.as_str()) {
            bail!(
                "Invalid region code: '{}'. Region codes are two uppercase letters (e.g. UK).",
                code
            );
        }
        if let Some(prefix) = &region.prefix {
            if prefix.trim().is_empty() {
                bail!("regions.{}.prefix must not be empty", code);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(body: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("epgh.toml");
        fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.matching.threshold, 70);
        assert_eq!(cfg.matching.catalog_threshold, 80);
        assert_eq!(cfg.matching.duplicate_ids, DuplicateIdPolicy::FirstWins);
        assert_eq!(cfg.paths.output_dir, PathBuf::from("export_epg"));
        assert_eq!(cfg.fetch.max_age_days, 1);
        assert!(cfg.regions.is_empty());
    }

    #[test]
    fn full_file_parses() {
        let (_tmp, path) = write_config(
            r#"
[paths]
epg_dir = "/data/epg"
channels_dir = "/data/channels"

[matching]
threshold = 85
only_perfect = true
duplicate_ids = "keep-all"
region_prefixes = ["uk:", "DE:"]
workers = 4

[fetch]
timeout_secs = 10

[playlist]
url = "http://host/playlist.m3u"

[regions.UK]
guides = ["https://host/epg_UK1.xml.gz", "local_UK_1.xml"]

[regions.DE]
prefix = "DE|"

[sources]
json = "epg_sources.json"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.paths.epg_dir, PathBuf::from("/data/epg"));
        assert_eq!(cfg.paths.output_dir, PathBuf::from("export_epg"));
        assert_eq!(cfg.matching.threshold, 85);
        assert_eq!(cfg.matching.duplicate_ids, DuplicateIdPolicy::KeepAll);
        assert!(cfg.consolidation_policy().only_perfect);
        assert_eq!(cfg.regions["UK"].guides.len(), 2);
        assert_eq!(cfg.region_prefix("UK"), "UK:");
        assert_eq!(cfg.region_prefix("DE"), "DE|");
        assert_eq!(cfg.normalizer().region_prefixes(), ["UK:", "DE:"]);
        assert_eq!(cfg.sources.json, Some(PathBuf::from("epg_sources.json")));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let (_tmp, path) = write_config("[matching]\nthreshold = 101\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("matching.threshold"));
    }

    #[test]
    fn rejects_unknown_duplicate_policy() {
        let (_tmp, path) = write_config("[matching]\nduplicate_ids = \"sometimes\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_bad_region_code() {
        let (_tmp, path) = write_config("[regions.UKX]\nguides = []\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid region code"));

        let (_tmp, path) = write_config("[regions.uk]\nguides = []\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error_but_can_fall_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.toml");
        assert!(load_config(&path).is_err());
        let cfg = load_or_minimal(&path).unwrap();
        assert_eq!(cfg.matching.threshold, 70);
    }
}
