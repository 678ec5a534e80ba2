//! Retrieval, decompression, and file storage for source documents.
//!
//! The matching core never touches the network. The pipeline uses these
//! collaborators to turn URLs into local files before loading them:
//!
//! - [`Fetcher`]: URL → bytes ([`HttpFetcher`] over blocking `reqwest`)
//! - [`Decompressor`]: compressed bytes → bytes ([`GzipDecompressor`])
//! - [`DocumentStore`]: whole-file reads and writes ([`FsStore`])
//!
//! Failures are typed [`Error`]s here. [`download_guide`] and
//! [`cached_playlist`] log them and return `None`, so one bad source never
//! aborts a multi-source run.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::playlist::{detect_format, PlaylistFormat};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const PLAYLIST_STEM: &str = "playlist_";

pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub trait Decompressor {
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

pub trait DocumentStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    /// Write the whole file. The parent directory must already exist.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch {
                url: String::new(),
                message: format!("building http client: {}", e),
            })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fail = |e: reqwest::Error| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?;
        let bytes = resp.bytes().map_err(fail)?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipDecompressor;

impl GzipDecompressor {
    pub fn is_compressed(bytes: &[u8]) -> bool {
        bytes.starts_with(&GZIP_MAGIC)
    }
}

impl Decompressor for GzipDecompressor {
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompress(e.to_string()))?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl DocumentStore for FsStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| Error::io(path, e))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(path, bytes).map_err(|e| Error::io(path, e))
    }
}

/// File name for a downloaded guide: the last URL path segment without
/// query string or `.gz`, falling back to a timestamped name.
pub fn guide_file_name(url: &str) -> String {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let base = path.rsplit('/').next().unwrap_or_default();
    let base = base.strip_suffix(".gz").unwrap_or(base);
    if base.is_empty() {
        format!("epg_{}.xml", Local::now().format("%Y%m%d_%H%M%S"))
    } else {
        base.to_string()
    }
}

/// Fetch one guide into `dir`, decompressing gzip payloads. Returns the
/// local path, or `None` after logging on any failure.
pub fn download_guide(
    fetcher: &dyn Fetcher,
    store: &dyn DocumentStore,
    url: &str,
    dir: &Path,
) -> Option<PathBuf> {
    match try_download_guide(fetcher, store, url, dir) {
        Ok(path) => Some(path),
        Err(e) => {
            error!(url, error = %e, "guide download failed");
            None
        }
    }
}

pub fn try_download_guide(
    fetcher: &dyn Fetcher,
    store: &dyn DocumentStore,
    url: &str,
    dir: &Path,
) -> Result<PathBuf> {
    info!(url, "downloading guide");
    let payload = fetcher.fetch(url)?;
    let payload = if url.ends_with(".gz") || GzipDecompressor::is_compressed(&payload) {
        debug!(url, bytes = payload.len(), "decompressing");
        GzipDecompressor.decompress(&payload)?
    } else {
        payload
    };

    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let path = dir.join(guide_file_name(url));
    store.write(&path, &payload)?;
    info!(path = %path.display(), bytes = payload.len(), "saved guide");
    Ok(path)
}

/// Dated on-disk cache for the subscriber playlist.
///
/// Downloads are stored as `playlist_YYYYMMDD.m3u` (or `.xml` when the
/// payload is a guide-shaped document). The newest cached file is reused
/// while it is younger than `max_age_days`.
#[derive(Debug, Clone)]
pub struct PlaylistCache {
    pub dir: PathBuf,
    pub max_age_days: i64,
}

impl PlaylistCache {
    pub fn new(dir: impl Into<PathBuf>, max_age_days: i64) -> Self {
        Self {
            dir: dir.into(),
            max_age_days,
        }
    }

    /// Newest cached playlist still fresh on `today`.
    pub fn fresh_entry(&self, today: NaiveDate) -> Option<PathBuf> {
        let (date, path) = self.newest_entry()?;
        let age = (today - date).num_days();
        if age < self.max_age_days.max(1) {
            debug!(path = %path.display(), age, "cached playlist is fresh");
            Some(path)
        } else {
            info!(path = %path.display(), age, "cached playlist is stale");
            None
        }
    }

    fn newest_entry(&self) -> Option<(NaiveDate, PathBuf)> {
        let entries = std::fs::read_dir(&self.dir).ok()?;
        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let date = cache_date(&path)?;
                Some((date, path))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
    }

    pub fn path_for(&self, date: NaiveDate, format: PlaylistFormat) -> PathBuf {
        let ext = match format {
            PlaylistFormat::M3u => "m3u",
            PlaylistFormat::Xml => "xml",
        };
        self.dir
            .join(format!("{}{}.{}", PLAYLIST_STEM, date.format("%Y%m%d"), ext))
    }
}

fn cache_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(PLAYLIST_STEM)?;
    let stamp = rest
        .strip_suffix(".m3u")
        .or_else(|| rest.strip_suffix(".xml"))?;
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

/// Return a local playlist for `url`, reusing the cache unless `force` is
/// set. `None` after logging if the download fails.
pub fn cached_playlist(
    fetcher: &dyn Fetcher,
    store: &dyn DocumentStore,
    cache: &PlaylistCache,
    url: &str,
    force: bool,
    today: NaiveDate,
) -> Option<PathBuf> {
    if !force {
        if let Some(path) = cache.fresh_entry(today) {
            info!(path = %path.display(), "using cached playlist");
            return Some(path);
        }
    }

    let result = (|| -> Result<PathBuf> {
        info!(url, "downloading playlist");
        let payload = fetcher.fetch(url)?;
        let payload = if GzipDecompressor::is_compressed(&payload) {
            GzipDecompressor.decompress(&payload)?
        } else {
            payload
        };
        let format = detect_format(&String::from_utf8_lossy(&payload));
        std::fs::create_dir_all(&cache.dir).map_err(|e| Error::io(&cache.dir, e))?;
        let path = cache.path_for(today, format);
        store.write(&path, &payload)?;
        Ok(path)
    })();

    match result {
        Ok(path) => {
            info!(path = %path.display(), "saved playlist");
            Some(path)
        }
        Err(e) => {
            error!(url, error = %e, "playlist download failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::TempDir;

    struct StaticFetcher {
        body: Vec<u8>,
        calls: Cell<usize>,
    }

    impl StaticFetcher {
        fn new(body: impl Into<Vec<u8>>) -> Self {
            Self {
                body: body.into(),
                calls: Cell::new(0),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.body.clone())
        }
    }

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            Err(Error::Fetch {
                url: url.to_string(),
                message: "connection refused".into(),
            })
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn gzip_round_trip_and_magic() {
        let packed = gzip(b"<tv/>");
        assert!(GzipDecompressor::is_compressed(&packed));
        assert!(!GzipDecompressor::is_compressed(b"<tv/>"));
        assert_eq!(GzipDecompressor.decompress(&packed).unwrap(), b"<tv/>");
        assert!(matches!(
            GzipDecompressor.decompress(b"not gzip"),
            Err(Error::Decompress(_))
        ));
    }

    #[test]
    fn guide_file_names() {
        assert_eq!(
            guide_file_name("https://host/epg/epg_ripper_UK1.xml.gz?token=1"),
            "epg_ripper_UK1.xml"
        );
        assert_eq!(guide_file_name("https://host/guide.xml"), "guide.xml");
        assert!(guide_file_name("https://host/").starts_with("epg_"));
    }

    #[test]
    fn download_guide_decompresses() {
        let tmp = TempDir::new().unwrap();
        let fetcher = StaticFetcher::new(gzip(b"<tv></tv>"));
        let path = download_guide(&fetcher, &FsStore, "http://h/a_UK1.xml.gz", tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("a_UK1.xml"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<tv></tv>");
    }

    #[test]
    fn download_failure_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(download_guide(&FailingFetcher, &FsStore, "http://h/a.xml", tmp.path()).is_none());
    }

    #[test]
    fn playlist_cache_reuses_fresh_file() {
        let tmp = TempDir::new().unwrap();
        let cache = PlaylistCache::new(tmp.path(), 1);
        let fetcher = StaticFetcher::new("#EXTM3U\n");

        let today = day(2024, 3, 10);
        let first =
            cached_playlist(&fetcher, &FsStore, &cache, "http://h/p", false, today).unwrap();
        assert_eq!(first, tmp.path().join("playlist_20240310.m3u"));

        let again =
            cached_playlist(&fetcher, &FsStore, &cache, "http://h/p", false, today).unwrap();
        assert_eq!(again, first);
        assert_eq!(fetcher.calls.get(), 1);

        cached_playlist(&fetcher, &FsStore, &cache, "http://h/p", true, today).unwrap();
        assert_eq!(fetcher.calls.get(), 2);
    }

    #[test]
    fn playlist_cache_expires() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("playlist_20240301.m3u"), "#EXTM3U\n").unwrap();
        let cache = PlaylistCache::new(tmp.path(), 7);
        assert!(cache.fresh_entry(day(2024, 3, 5)).is_some());
        assert!(cache.fresh_entry(day(2024, 3, 8)).is_none());
    }

    #[test]
    fn xml_playlists_are_cached_as_xml() {
        let tmp = TempDir::new().unwrap();
        let cache = PlaylistCache::new(tmp.path(), 1);
        let fetcher = StaticFetcher::new("<?xml version=\"1.0\"?><tv></tv>");
        let today = day(2024, 1, 2);
        let path =
            cached_playlist(&fetcher, &FsStore, &cache, "http://h/p", false, today).unwrap();
        assert_eq!(path, tmp.path().join("playlist_20240102.xml"));
    }
}
