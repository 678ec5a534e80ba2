//! Run orchestration.
//!
//! Ties loaders, matcher, consolidator and emitters together for each
//! command: catalog channel list, single-guide match, region run, batch of
//! regions, and raw merge. Library errors below this layer are recovered
//! into empty results; here a run that cannot produce its output fails with
//! an `anyhow` error so the binary exits non-zero.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::slice;

use crate::catalog::load_catalog;
use crate::config::Config;
use crate::consolidate::{best_per_channel, consolidate, merge_documents, DuplicateIdPolicy};
use crate::emit;
use crate::fetch::{cached_playlist, download_guide, Fetcher, FsStore, PlaylistCache};
use crate::guide::{load_guide, try_load_guide, GuideDocument};
use crate::matcher::{CatalogMatcher, GuideMatcher};
use crate::models::{ChannelRecord, MatchResult, MatchSummary};
use crate::playlist::load_playlist;
use crate::progress::{MatchProgressEvent, ProgressReporter};
use crate::sources::{known_regions, region_code, resolve_region};

pub const CHANNEL_LIST_FILE: &str = "channel_list.xml";
pub const UNMATCHED_LOG_FILE: &str = "unmatched_channels.log";

/// Where the playlist comes from. Flags win over `[playlist]` in the config.
#[derive(Debug, Clone, Default)]
pub struct PlaylistSource {
    pub file: Option<PathBuf>,
    pub url: Option<String>,
    pub force_download: bool,
}

impl PlaylistSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Resolve the playlist to a local file, downloading through the dated
/// cache when a URL is given.
pub fn resolve_playlist(
    config: &Config,
    source: &PlaylistSource,
    fetcher: &dyn Fetcher,
) -> Result<PathBuf> {
    if let Some(file) = &source.file {
        return Ok(file.clone());
    }
    let url = match (&source.url, &config.playlist.file, &config.playlist.url) {
        (Some(url), _, _) => url,
        (None, Some(file), _) => return Ok(file.clone()),
        (None, None, Some(url)) => url,
        (None, None, None) => bail!(
            "No playlist given. Use --playlist, --playlist-url, or set [playlist] in the config."
        ),
    };

    let cache = PlaylistCache::new(&config.paths.playlist_dir, config.fetch.max_age_days);
    let today = Local::now().date_naive();
    cached_playlist(fetcher, &FsStore, &cache, url, source.force_download, today)
        .ok_or_else(|| anyhow!("Failed to download playlist from {}", url))
}

fn load_channels(path: &Path, prefix: Option<&str>) -> Result<Vec<ChannelRecord>> {
    if !path.exists() {
        bail!("Playlist not found: {}", path.display());
    }
    let channels = load_playlist(path, prefix);
    if channels.is_empty() {
        match prefix {
            Some(p) => bail!("No channels with prefix '{}' in {}", p, path.display()),
            None => bail!("No channels found in {}", path.display()),
        }
    }
    println!("playlist {}", path.display());
    println!("  channels: {}", channels.len());
    Ok(channels)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn print_summary(results: &[MatchResult]) -> MatchSummary {
    let summary = MatchSummary::from_results(results);
    println!(
        "  matched: {} of {} ({:.1}%)",
        summary.matched(),
        summary.total,
        summary.match_rate()
    );
    println!("  exact: {}", summary.exact);
    println!("  fuzzy: {}", summary.fuzzy);
    println!("  unmatched: {}", summary.unmatched);
    summary
}

// ═══════════════════════════════════════════════════════════════════════
// Catalog mode
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct ChannelListOptions {
    pub playlist: PlaylistSource,
    pub prefix: Option<String>,
    pub channels_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub unmatched_log: Option<PathBuf>,
}

/// Match the playlist against the catalog and emit a channel-list document
/// plus the unmatched report.
pub fn run_channel_list(
    config: &Config,
    options: &ChannelListOptions,
    fetcher: &dyn Fetcher,
) -> Result<MatchSummary> {
    let playlist = resolve_playlist(config, &options.playlist, fetcher)?;
    let prefix = options.prefix.as_deref();
    let channels = load_channels(&playlist, prefix)?;

    let channels_dir = options
        .channels_dir
        .as_deref()
        .unwrap_or(&config.paths.channels_dir);
    let catalog = load_catalog(channels_dir, config.normalizer());
    if catalog.is_empty() {
        tracing::warn!(
            dir = %channels_dir.display(),
            "catalog is empty; every channel will be unmatched"
        );
    }
    println!("catalog {}", channels_dir.display());
    println!("  entries: {}", catalog.len());

    let results = CatalogMatcher::new(&catalog)
        .with_threshold(config.matching.catalog_threshold)
        .match_all(&channels, config.matching.workers);

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| config.paths.output_dir.join(CHANNEL_LIST_FILE));
    ensure_parent(&output)?;
    if !emit::write_channel_list(&results, prefix, &output) {
        bail!("Failed to write channel list: {}", output.display());
    }

    let unmatched_log = options
        .unmatched_log
        .clone()
        .unwrap_or_else(|| config.paths.output_dir.join(UNMATCHED_LOG_FILE));
    ensure_parent(&unmatched_log)?;
    let report_ok = emit::write_unmatched_report(&results, &unmatched_log);

    println!("channels");
    let summary = print_summary(&results);
    println!("  output: {}", output.display());
    if summary.unmatched > 0 && report_ok {
        println!("  unmatched log: {}", unmatched_log.display());
    }
    println!("ok");
    Ok(summary)
}

// ═══════════════════════════════════════════════════════════════════════
// Single guide
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    pub guide: PathBuf,
    pub playlist: PlaylistSource,
    pub prefix: Option<String>,
    pub threshold: Option<u8>,
    pub only_perfect: bool,
    pub show_all: bool,
    pub csv: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Match the playlist against one guide document: print the listing and
/// optionally write the CSV report and a pruned guide.
pub fn run_match(
    config: &Config,
    options: &MatchOptions,
    fetcher: &dyn Fetcher,
) -> Result<Vec<MatchResult>> {
    let document = try_load_guide(&options.guide)
        .with_context(|| format!("Failed to load guide: {}", options.guide.display()))?;
    println!("guide {}", document.name);
    println!("  channels: {}", document.channels.len());
    println!("  programmes: {}", document.programmes().len());

    let playlist = resolve_playlist(config, &options.playlist, fetcher)?;
    let channels = load_channels(&playlist, options.prefix.as_deref())?;

    let threshold = options.threshold.unwrap_or(config.matching.threshold);
    let results = GuideMatcher::with_normalizer(&document, config.normalizer())
        .with_threshold(threshold)
        .match_all(&channels);

    let only_perfect = options.only_perfect || config.matching.only_perfect;
    print!(
        "{}",
        emit::match_listing(&results, options.show_all, only_perfect)
    );

    if let Some(csv) = &options.csv {
        ensure_parent(csv)?;
        if !emit::write_match_csv(&results, only_perfect, csv) {
            bail!("Failed to write match report: {}", csv.display());
        }
        println!("  csv: {}", csv.display());
    }

    if let Some(output) = &options.output {
        let mut policy = config.consolidation_policy();
        policy.only_perfect = only_perfect;
        let pruned = consolidate(results.clone(), slice::from_ref(&document), policy);
        ensure_parent(output)?;
        if !emit::write_guide(&pruned.document, output) {
            bail!("Failed to write guide: {}", output.display());
        }
        println!(
            "  output: {} ({} channels, {} programmes)",
            output.display(),
            pruned.channel_count,
            pruned.programme_count
        );
    }

    println!("match");
    print_summary(&results);
    println!("ok");
    Ok(results)
}

// ═══════════════════════════════════════════════════════════════════════
// Regions
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct RegionOptions {
    pub playlist: PlaylistSource,
    pub threshold: Option<u8>,
    pub only_perfect: bool,
    pub output_dir: Option<PathBuf>,
}

/// Outcome of one region run.
#[derive(Debug, Clone)]
pub struct RegionReport {
    pub code: String,
    pub summary: MatchSummary,
    pub output: PathBuf,
    pub channels: usize,
    pub programmes: usize,
}

/// Fetch, load and match every guide for `region`, consolidate the results,
/// and write `epg_<CODE>.xml` plus `unmatched_<CODE>.log`.
pub fn run_region(
    config: &Config,
    region: &str,
    options: &RegionOptions,
    fetcher: &dyn Fetcher,
    progress: &dyn ProgressReporter,
) -> Result<RegionReport> {
    let code = region_code(region).ok_or_else(|| {
        anyhow!(
            "Invalid region: '{}'. Use a two-letter code or prefix (e.g. UK or UK:).",
            region
        )
    })?;
    let sources = resolve_region(config, &code)?;
    if sources.is_empty() {
        bail!("No guide sources for region {}", code);
    }
    println!("region {}", code);
    println!("  sources: {} remote, {} local", sources.remote.len(), sources.local.len());

    let mut paths = sources.local.clone();
    for url in &sources.remote {
        progress.report(MatchProgressEvent::Fetching { url: url.clone() });
        if let Some(path) = download_guide(fetcher, &FsStore, url, &config.paths.epg_dir) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }

    let documents = load_documents(&paths, progress);
    if documents.is_empty() {
        bail!("No guide documents could be loaded for region {}", code);
    }
    println!("  guides: {}", documents.len());

    let playlist = resolve_playlist(config, &options.playlist, fetcher)?;
    let channels = load_channels(&playlist, Some(&sources.prefix))?;

    let threshold = options.threshold.unwrap_or(config.matching.threshold);
    let normalizer = config.normalizer();
    let mut all_results = Vec::with_capacity(channels.len() * documents.len());
    for (i, document) in documents.iter().enumerate() {
        let results = GuideMatcher::with_normalizer(document, normalizer.clone())
            .with_threshold(threshold)
            .match_all(&channels);
        progress.report(MatchProgressEvent::Matching {
            document: document.name.clone(),
            n: (i + 1) as u64,
            total: documents.len() as u64,
            matched: results.iter().filter(|r| r.is_matched()).count() as u64,
        });
        all_results.extend(results);
    }

    let best = best_per_channel(all_results.iter().cloned());

    let mut policy = config.consolidation_policy();
    policy.only_perfect = options.only_perfect || policy.only_perfect;
    let guide = consolidate(all_results, &documents, policy);

    let output_dir = options
        .output_dir
        .as_deref()
        .unwrap_or(&config.paths.output_dir);
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;
    let output = output_dir.join(format!("epg_{}.xml", code));
    if !emit::write_guide(&guide.document, &output) {
        bail!("Failed to write guide: {}", output.display());
    }
    emit::write_unmatched_report(&best, &output_dir.join(format!("unmatched_{}.log", code)));

    let summary = print_summary(&best);
    println!(
        "  output: {} ({} channels, {} programmes)",
        output.display(),
        guide.channel_count,
        guide.programme_count
    );
    println!("ok");

    Ok(RegionReport {
        code,
        summary,
        output,
        channels: guide.channel_count,
        programmes: guide.programme_count,
    })
}

fn load_documents(paths: &[PathBuf], progress: &dyn ProgressReporter) -> Vec<GuideDocument> {
    paths
        .iter()
        .filter_map(|path| {
            let document = load_guide(path)?;
            progress.report(MatchProgressEvent::Loaded {
                document: document.name.clone(),
                channels: document.channels.len() as u64,
            });
            Some(document)
        })
        .collect()
}

/// Run [`run_region`] for each code (all known regions when empty),
/// print a summary, and fail if any region failed.
pub fn run_all_regions(
    config: &Config,
    codes: &[String],
    options: &RegionOptions,
    clear_data: bool,
    fetcher: &dyn Fetcher,
    progress: &dyn ProgressReporter,
) -> Result<Vec<RegionReport>> {
    if clear_data {
        clear_directory(&config.paths.epg_dir)?;
        clear_directory(&config.paths.playlist_dir)?;
    }

    let known = known_regions(config)?;
    let requested: Vec<String> = if codes.is_empty() {
        known.clone()
    } else {
        codes.to_vec()
    };
    if requested.is_empty() {
        bail!("No regions configured. Add [regions.XX] or [sources].json to the config.");
    }
    println!("regions: {}", requested.join(", "));

    // Resolve the playlist once so a URL is fetched at most once per batch.
    let playlist = resolve_playlist(config, &options.playlist, fetcher)?;
    let region_options = RegionOptions {
        playlist: PlaylistSource::file(playlist),
        ..options.clone()
    };

    let mut reports = Vec::new();
    let mut failed: Vec<String> = Vec::new();
    for requested_code in &requested {
        let known_code = region_code(requested_code).filter(|c| known.contains(c));
        let Some(code) = known_code else {
            tracing::warn!(region = %requested_code, "region not configured");
            failed.push(requested_code.clone());
            continue;
        };
        println!();
        match run_region(config, &code, &region_options, fetcher, progress) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(region = %code, error = %e, "region run failed");
                failed.push(code);
            }
        }
    }

    println!();
    println!("summary");
    for report in &reports {
        println!(
            "  {:<4} ok      {:>5} / {:<5} matched  {}",
            report.code,
            report.summary.matched(),
            report.summary.total,
            report.output.display()
        );
    }
    for code in &failed {
        println!("  {:<4} failed", code);
    }

    if !failed.is_empty() {
        bail!("{} region(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(reports)
}

/// Remove the files (not subdirectories) directly inside `dir`.
fn clear_directory(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let mut removed = 0usize;
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    tracing::info!(dir = %dir.display(), removed, "cleared directory");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Merge
// ═══════════════════════════════════════════════════════════════════════

/// Merge whole guide documents into one file. Unreadable inputs are
/// skipped; at least one must load.
pub fn run_merge(inputs: &[PathBuf], output: &Path, policy: DuplicateIdPolicy) -> Result<()> {
    let documents: Vec<GuideDocument> = inputs.iter().filter_map(|p| load_guide(p)).collect();
    if documents.is_empty() {
        bail!("None of the {} input guide(s) could be loaded", inputs.len());
    }

    let merged = merge_documents(&documents, policy);
    ensure_parent(output)?;
    if !emit::write_guide(&merged, output) {
        bail!("Failed to write guide: {}", output.display());
    }

    let channels = merged.children_named("channel").count();
    let programmes = merged.children_named("programme").count();
    println!("merge ({})", policy);
    println!("  inputs: {} of {}", documents.len(), inputs.len());
    println!("  channels: {}", channels);
    println!("  programmes: {}", programmes);
    println!("  output: {}", output.display());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionConfig;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    struct OfflineFetcher;

    impl Fetcher for OfflineFetcher {
        fn fetch(&self, url: &str) -> crate::error::Result<Vec<u8>> {
            Err(crate::error::Error::Fetch {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    const GUIDE_A: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="bbc1.uk"><display-name>BBC One</display-name></channel>
  <channel id="itv.uk"><display-name>ITV</display-name></channel>
  <programme channel="bbc1.uk" start="1"><title>News</title></programme>
  <programme channel="itv.uk" start="1"><title>Corrie</title></programme>
</tv>"#;

    const GUIDE_B: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="c4.uk"><display-name>Channel 4</display-name></channel>
  <programme channel="c4.uk" start="1"><title>Bake Off</title></programme>
</tv>"#;

    const PLAYLIST: &str = "#EXTM3U\n\
#EXTINF:-1,UK: BBC One HD\nhttp://s/1\n\
#EXTINF:-1,UK: Channel 4\nhttp://s/2\n\
#EXTINF:-1,UK: Nothing Like It\nhttp://s/3\n\
#EXTINF:-1,US: CNN\nhttp://s/4\n";

    fn setup() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let epg_dir = tmp.path().join("epg");
        fs::create_dir(&epg_dir).unwrap();
        fs::write(epg_dir.join("guide_UK1.xml"), GUIDE_A).unwrap();
        fs::write(epg_dir.join("guide_UK2.xml"), GUIDE_B).unwrap();
        fs::write(tmp.path().join("playlist.m3u"), PLAYLIST).unwrap();

        let mut config = Config::minimal();
        config.paths.epg_dir = epg_dir;
        config.paths.output_dir = tmp.path().join("out");
        config.paths.playlist_dir = tmp.path().join("playlists");
        config.playlist.file = Some(tmp.path().join("playlist.m3u"));
        config.regions.insert("UK".to_string(), RegionConfig::default());
        (tmp, config)
    }

    #[test]
    fn region_run_consolidates_local_guides() {
        let (_tmp, config) = setup();
        let report = run_region(
            &config,
            "UK:",
            &RegionOptions::default(),
            &OfflineFetcher,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.code, "UK");
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.exact, 2);
        assert_eq!(report.channels, 2);
        assert_eq!(report.programmes, 2);

        let written = fs::read_to_string(&report.output).unwrap();
        assert!(written.contains("UK: BBC One HD"));
        assert!(written.contains("Bake Off"));
        assert!(!written.contains("Corrie"));

        let log = config.paths.output_dir.join("unmatched_UK.log");
        assert!(fs::read_to_string(log).unwrap().contains("UK: Nothing Like It"));
    }

    #[test]
    fn region_without_sources_fails() {
        let (_tmp, config) = setup();
        let err = run_region(&config, "DE", &RegionOptions::default(), &OfflineFetcher, &NoProgress)
            .unwrap_err();
        assert!(err.to_string().contains("No guide sources"));
    }

    #[test]
    fn batch_reports_unknown_regions_as_failures() {
        let (_tmp, config) = setup();
        let err = run_all_regions(
            &config,
            &["UK".to_string(), "FR".to_string()],
            &RegionOptions::default(),
            false,
            &OfflineFetcher,
            &NoProgress,
        )
        .unwrap_err();
        assert!(err.to_string().contains("FR"));
        assert!(config.paths.output_dir.join("epg_UK.xml").exists());
    }

    #[test]
    fn missing_playlist_configuration_is_an_error() {
        let (_tmp, mut config) = setup();
        config.playlist.file = None;
        let err =
            resolve_playlist(&config, &PlaylistSource::default(), &OfflineFetcher).unwrap_err();
        assert!(err.to_string().contains("No playlist given"));
    }

    #[test]
    fn playlist_download_failure_is_reported() {
        let (_tmp, config) = setup();
        let source = PlaylistSource {
            url: Some("http://unreachable/playlist.m3u".to_string()),
            ..Default::default()
        };
        let err = resolve_playlist(&config, &source, &OfflineFetcher).unwrap_err();
        assert!(err.to_string().contains("Failed to download playlist"));
    }

    #[test]
    fn clear_data_keeps_subdirectories() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.xml"), "x").unwrap();
        fs::create_dir(tmp.path().join("keep")).unwrap();
        clear_directory(tmp.path()).unwrap();
        assert!(!tmp.path().join("a.xml").exists());
        assert!(tmp.path().join("keep").exists());
    }

    #[test]
    fn merge_writes_all_channels() {
        let (tmp, config) = setup();
        let output = tmp.path().join("merged.xml");
        run_merge(
            &[
                config.paths.epg_dir.join("guide_UK1.xml"),
                config.paths.epg_dir.join("guide_UK2.xml"),
                tmp.path().join("missing.xml"),
            ],
            &output,
            DuplicateIdPolicy::FirstWins,
        )
        .unwrap();
        let written = fs::read_to_string(output).unwrap();
        assert_eq!(written.matches("<channel ").count(), 3);
        assert_eq!(written.matches("<programme ").count(), 3);
    }
}
