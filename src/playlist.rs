//! Playlist loader.
//!
//! Two physical formats are accepted and told apart by sniffing the text:
//!
//! - **M3U**: `#EXTINF` metadata lines, each followed by a stream URL.
//! - **XML**: a guide-shaped document (`<tv>` or `<channels>`) with one
//!   `channel` element per entry. There are no stream URLs in this form,
//!   so a `#EXTURL:<id>` placeholder is synthesized.
//!
//! When a region prefix is supplied, only channels whose raw name starts
//! with it (case-sensitive) are kept, and the prefix is removed from
//! [`ChannelRecord::clean_name`].

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::ChannelRecord;
use crate::xml::{self, XmlElement};

const EXTINF: &str = "#EXTINF";

static TVG_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"tvg-id="([^"]*)""#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    M3u,
    Xml,
}

/// XML when the text starts with a declaration or contains a `<tv>` root.
pub fn detect_format(text: &str) -> PlaylistFormat {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") || text.contains("<tv>") || text.contains("<tv ") {
        PlaylistFormat::Xml
    } else {
        PlaylistFormat::M3u
    }
}

/// Read and parse a playlist file. A missing or unreadable file, or a
/// malformed XML playlist, yields an empty list.
pub fn load_playlist(path: &Path, prefix: Option<&str>) -> Vec<ChannelRecord> {
    match try_load_playlist(path, prefix) {
        Ok(channels) => channels,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "playlist not loaded");
            Vec::new()
        }
    }
}

pub fn try_load_playlist(path: &Path, prefix: Option<&str>) -> Result<Vec<ChannelRecord>> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let channels = parse_playlist(&text, prefix)
        .map_err(|message| Error::xml(path.display().to_string(), message))?;
    match prefix {
        Some(p) => info!(
            path = %path.display(),
            prefix = p,
            channels = channels.len(),
            "loaded playlist"
        ),
        None => info!(path = %path.display(), channels = channels.len(), "loaded playlist"),
    }
    Ok(channels)
}

/// Parse playlist text of either format. Errors only for malformed XML.
pub fn parse_playlist(
    text: &str,
    prefix: Option<&str>,
) -> std::result::Result<Vec<ChannelRecord>, String> {
    match detect_format(text) {
        PlaylistFormat::M3u => Ok(parse_m3u(text, prefix)),
        PlaylistFormat::Xml => {
            debug!("playlist looks like xml");
            parse_xml_playlist(text, prefix)
        }
    }
}

pub fn parse_m3u(text: &str, prefix: Option<&str>) -> Vec<ChannelRecord> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut channels = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with(EXTINF) {
            continue;
        }
        let Some(raw_name) = extinf_name(line) else {
            debug!(line, "metadata line without a name");
            continue;
        };
        if !passes_prefix(raw_name, prefix) {
            continue;
        }
        let Some(stream_ref) = stream_after(&lines[i + 1..]) else {
            debug!(name = raw_name, "metadata line without a stream url");
            continue;
        };

        let external_id = TVG_ID
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        channels.push(ChannelRecord {
            raw_name: raw_name.to_string(),
            clean_name: clean_name(raw_name, prefix),
            external_id,
            stream_ref: stream_ref.to_string(),
            source_line: line.to_string(),
        });
    }
    channels
}

pub fn parse_xml_playlist(
    text: &str,
    prefix: Option<&str>,
) -> std::result::Result<Vec<ChannelRecord>, String> {
    let root = xml::parse_document(text)?;
    let mut channels = Vec::new();

    for element in root.descendants_named("channel") {
        let Some(raw_name) = channel_name(element) else {
            continue;
        };
        if !passes_prefix(&raw_name, prefix) {
            continue;
        }
        let id = element
            .attr("id")
            .or_else(|| element.attr("xmltv_id"))
            .unwrap_or_default()
            .to_string();

        channels.push(ChannelRecord {
            clean_name: clean_name(&raw_name, prefix),
            stream_ref: format!("#EXTURL:{}", id),
            source_line: format!("{}:-1 tvg-id=\"{}\",{}", EXTINF, id, raw_name),
            external_id: id,
            raw_name,
        });
    }
    Ok(channels)
}

/// First non-empty `display-name`, or the element's own text for
/// channel-list documents, which carry the name directly.
fn channel_name(element: &XmlElement) -> Option<String> {
    element
        .descendants_named("display-name")
        .into_iter()
        .map(XmlElement::text)
        .find(|name| !name.is_empty())
        .or_else(|| Some(element.text()).filter(|name| !name.is_empty()))
}

fn extinf_name(line: &str) -> Option<&str> {
    let (_, name) = line.rsplit_once(',')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// The stream URL belonging to a metadata line: the next line that is not
/// blank and not a directive. Another `#EXTINF` ends the search.
fn stream_after<'a>(rest: &[&'a str]) -> Option<&'a str> {
    for line in rest {
        if line.starts_with(EXTINF) {
            return None;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        return Some(line);
    }
    None
}

fn passes_prefix(raw_name: &str, prefix: Option<&str>) -> bool {
    prefix.map_or(true, |p| raw_name.starts_with(p))
}

fn clean_name(raw_name: &str, prefix: Option<&str>) -> String {
    match prefix.and_then(|p| raw_name.strip_prefix(p)) {
        Some(rest) => rest.trim().to_string(),
        None => raw_name.to_string(),
    }
}
