//! Output emitters.
//!
//! Every `write_*` function returns `true` on success. Failures are logged
//! and reported as `false`; the caller decides whether the run continues.
//! Destination directories must already exist.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::fetch::{DocumentStore, FsStore};
use crate::models::{MatchResult, MatchTarget};
use crate::xml::{self, XmlElement};

pub const CSV_HEADER: [&str; 6] = [
    "Playlist Channel",
    "EPG Channel ID",
    "EPG Display Name",
    "Match Score",
    "Match Method",
    "Icon URL",
];

const DEFAULT_LANGUAGE: &str = "en";

/// Build the `<channels>` list for every matched result.
///
/// When `prefix` is given and a raw name does not already start with it,
/// the text becomes `"{prefix} {raw_name}"`.
pub fn channel_list_document(results: &[MatchResult], prefix: Option<&str>) -> XmlElement {
    let mut root = XmlElement::new("channels");
    for result in results {
        let Some(target) = &result.target else {
            continue;
        };
        let channel = &result.channel;

        let (site, lang, site_id) = match target {
            MatchTarget::Catalog(entry) => (
                entry.site_name.as_str(),
                entry.language.as_str(),
                entry.site_id.as_str(),
            ),
            MatchTarget::Guide(guide) => (
                result.source_document.as_deref().unwrap_or_default(),
                DEFAULT_LANGUAGE,
                guide.id.as_str(),
            ),
        };
        let xmltv_id = Some(target.native_id())
            .filter(|id| !id.is_empty())
            .unwrap_or(channel.external_id.as_str());

        let text = match prefix {
            Some(p) if !channel.raw_name.starts_with(p) => format!("{} {}", p, channel.raw_name),
            _ => channel.raw_name.clone(),
        };

        root.push_element(
            XmlElement::new("channel")
                .with_attribute("site", site)
                .with_attribute("lang", lang)
                .with_attribute("xmltv_id", xmltv_id)
                .with_attribute("site_id", site_id)
                .with_text(text),
        );
    }
    root
}

pub fn write_channel_list(results: &[MatchResult], prefix: Option<&str>, path: &Path) -> bool {
    let document = channel_list_document(results, prefix);
    let count = document.child_elements().count();
    report(path, "channel list", write_xml(&document, path), || {
        info!(path = %path.display(), channels = count, "wrote channel list");
    })
}

pub fn write_guide(document: &XmlElement, path: &Path) -> bool {
    report(path, "guide", write_xml(document, path), || {
        info!(path = %path.display(), "wrote guide");
    })
}

/// Report text for unmatched channels, or `None` when everything matched.
pub fn unmatched_report(results: &[MatchResult], generated: NaiveDateTime) -> Option<String> {
    let mut names: Vec<&str> = results
        .iter()
        .filter(|r| !r.is_matched())
        .map(|r| r.channel.raw_name.as_str())
        .collect();
    if names.is_empty() {
        return None;
    }
    names.sort_unstable();

    let mut out = format!(
        "# Unmatched channels ({}) - {}\n\n",
        names.len(),
        generated.format("%Y-%m-%d %H:%M:%S")
    );
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    Some(out)
}

/// Write the unmatched report. Nothing is written when every channel
/// matched; that still counts as success.
pub fn write_unmatched_report(results: &[MatchResult], path: &Path) -> bool {
    let Some(text) = unmatched_report(results, Local::now().naive_local()) else {
        info!("all channels were matched");
        return true;
    };
    report(path, "unmatched report", FsStore.write(path, text.as_bytes()), || {
        info!(path = %path.display(), "wrote unmatched report");
    })
}

/// CSV of every result (or only score-100 matches).
pub fn match_csv(results: &[MatchResult], only_perfect: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for result in results.iter().filter(|r| !only_perfect || r.is_perfect()) {
        let row = match &result.target {
            Some(target) => {
                let icon = target
                    .as_guide()
                    .and_then(|g| g.icons.first())
                    .map(String::as_str)
                    .unwrap_or_default();
                [
                    result.channel.raw_name.clone(),
                    target.native_id().to_string(),
                    target.display_name().to_string(),
                    result.score.to_string(),
                    result.method.label().to_string(),
                    icon.to_string(),
                ]
            }
            None => [
                result.channel.raw_name.clone(),
                "No match".to_string(),
                "No match".to_string(),
                "0".to_string(),
                result.method.label().to_string(),
                String::new(),
            ],
        };
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Csv(e.into_error().into()))
}

pub fn write_match_csv(results: &[MatchResult], only_perfect: bool, path: &Path) -> bool {
    let written = match_csv(results, only_perfect).and_then(|bytes| FsStore.write(path, &bytes));
    report(path, "match csv", written, || {
        info!(path = %path.display(), "wrote match csv");
    })
}

/// Console listing sorted by score, best first.
pub fn match_listing(results: &[MatchResult], show_all: bool, only_perfect: bool) -> String {
    let mut sorted: Vec<&MatchResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let (shown, heading): (Vec<&MatchResult>, String) = if only_perfect {
        let shown: Vec<_> = sorted.into_iter().filter(|r| r.is_perfect()).collect();
        let heading = format!("Showing {} perfect matches (100% score):", shown.len());
        (shown, heading)
    } else if show_all {
        let heading = format!("Showing all {} channels:", sorted.len());
        (sorted, heading)
    } else {
        let shown: Vec<_> = sorted.into_iter().filter(|r| r.is_matched()).collect();
        let heading = format!("Showing {} channel matches:", shown.len());
        (shown, heading)
    };

    let rule = "-".repeat(80);
    let mut out = format!("{}\n{}\n", heading, rule);
    for (i, result) in shown.iter().enumerate() {
        out.push_str(&format!("{}. Playlist Channel: {}\n", i + 1, result.channel.raw_name));
        match &result.target {
            Some(target) => {
                out.push_str(&format!("   EPG Channel: {}\n", target.display_name()));
                out.push_str(&format!("   EPG ID: {}\n", target.native_id()));
                out.push_str(&format!(
                    "   Match Score: {}% ({})\n",
                    result.score, result.method
                ));
                if let Some(icon) = target.as_guide().and_then(|g| g.icons.first()) {
                    out.push_str(&format!("   Icon: {}\n", icon));
                }
            }
            None => out.push_str("   No EPG match found\n"),
        }
        out.push_str(&rule);
        out.push('\n');
    }
    out
}

fn write_xml(document: &XmlElement, path: &Path) -> Result<()> {
    let text = xml::write_document(document)
        .map_err(|m| Error::xml(path.display().to_string(), m))?;
    FsStore.write(path, text.as_bytes())
}

fn report(path: &Path, what: &str, result: Result<()>, on_success: impl FnOnce()) -> bool {
    match result {
        Ok(()) => {
            on_success();
            true
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to write {}", what);
            false
        }
    }
}
