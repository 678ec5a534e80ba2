//! Progress reporting for region runs.
//!
//! A region run fetches and matches against several guide documents, which
//! can take a while on large playlists. Progress is emitted on **stderr** so
//! stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event for a region run.
#[derive(Clone, Debug)]
pub enum MatchProgressEvent {
    /// A remote guide is being downloaded.
    Fetching { url: String },
    /// A guide document was parsed.
    Loaded { document: String, channels: u64 },
    /// Document `n` of `total` has been matched.
    Matching {
        document: String,
        n: u64,
        total: u64,
        matched: u64,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: MatchProgressEvent);
}

/// Human-friendly progress on stderr: "match UK  epg_UK1.xml  2 / 3 guides  1,234 matched".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: MatchProgressEvent) {
        let line = match &event {
            MatchProgressEvent::Fetching { url } => format!("fetch {}\n", url),
            MatchProgressEvent::Loaded { document, channels } => {
                format!("load {}  {} channels\n", document, format_number(*channels))
            }
            MatchProgressEvent::Matching {
                document,
                n,
                total,
                matched,
            } => format!(
                "match {}  {} / {} guides  {} matched\n",
                document,
                format_number(*n),
                format_number(*total),
                format_number(*matched)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: MatchProgressEvent) {
        let obj = match &event {
            MatchProgressEvent::Fetching { url } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "url": url
            }),
            MatchProgressEvent::Loaded { document, channels } => serde_json::json!({
                "event": "progress",
                "phase": "loaded",
                "document": document,
                "channels": channels
            }),
            MatchProgressEvent::Matching {
                document,
                n,
                total,
                matched,
            } => serde_json::json!({
                "event": "progress",
                "phase": "matching",
                "document": document,
                "n": n,
                "total": total,
                "matched": matched
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: MatchProgressEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}' (expected off, human or json)",
                other
            )),
        }
    }
}
