//! Guide (XMLTV) document loader.
//!
//! A [`GuideDocument`] holds the channels of one guide file plus its
//! programme elements. Programmes are kept as opaque element trees and are
//! indexed by channel id the first time someone asks for them.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fetch::{Decompressor, DocumentStore, FsStore, GzipDecompressor};
use crate::models::{GuideChannel, ProgrammeEntry};
use crate::xml::{self, XmlElement};

#[derive(Debug)]
pub struct GuideDocument {
    /// File name the document was loaded from; used as the source tag.
    pub name: String,
    /// Attributes of the root `<tv>` element.
    pub attributes: Vec<(String, String)>,
    pub channels: Vec<GuideChannel>,
    programmes: Vec<ProgrammeEntry>,
    by_channel: OnceCell<HashMap<String, Vec<usize>>>,
}

impl GuideDocument {
    pub fn new(
        name: impl Into<String>,
        attributes: Vec<(String, String)>,
        channels: Vec<GuideChannel>,
        programmes: Vec<ProgrammeEntry>,
    ) -> Self {
        Self {
            name: name.into(),
            attributes,
            channels,
            programmes,
            by_channel: OnceCell::new(),
        }
    }

    pub fn channel(&self, id: &str) -> Option<&GuideChannel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// All programmes in document order.
    pub fn programmes(&self) -> &[ProgrammeEntry] {
        &self.programmes
    }

    /// Programmes of one channel, in document order.
    pub fn programmes_for<'a>(
        &'a self,
        channel_id: &str,
    ) -> impl Iterator<Item = &'a ProgrammeEntry> {
        let index = self.by_channel.get_or_init(|| {
            let mut index: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, p) in self.programmes.iter().enumerate() {
                index.entry(p.channel_id.clone()).or_default().push(i);
            }
            index
        });
        index
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.programmes[i])
    }
}

impl Clone for GuideDocument {
    fn clone(&self) -> Self {
        Self::new(
            self.name.clone(),
            self.attributes.clone(),
            self.channels.clone(),
            self.programmes.clone(),
        )
    }
}

/// Load one guide file. Missing, unreadable, or malformed files yield
/// `None` after logging, so sibling documents can still be processed.
pub fn load_guide(path: &Path) -> Option<GuideDocument> {
    match try_load_guide(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "guide not loaded");
            None
        }
    }
}

pub fn try_load_guide(path: &Path) -> Result<GuideDocument> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let bytes = FsStore.read(path)?;
    let bytes = if GzipDecompressor::is_compressed(&bytes) {
        GzipDecompressor.decompress(&bytes)?
    } else {
        bytes
    };
    let text = String::from_utf8_lossy(&bytes);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let doc = parse_guide(&text, &name).map_err(|m| Error::xml(name.clone(), m))?;
    info!(
        path = %path.display(),
        channels = doc.channels.len(),
        programmes = doc.programmes.len(),
        "loaded guide"
    );
    Ok(doc)
}

pub fn parse_guide(text: &str, name: &str) -> std::result::Result<GuideDocument, String> {
    let root = xml::parse_document(text)?;

    let channels: Vec<GuideChannel> = root
        .descendants_named("channel")
        .into_iter()
        .filter_map(guide_channel)
        .collect();

    let mut programmes = Vec::new();
    for element in root.descendants_named("programme") {
        match element.attr("channel") {
            Some(channel_id) if !channel_id.is_empty() => programmes.push(ProgrammeEntry {
                channel_id: channel_id.to_string(),
                element: element.clone(),
            }),
            _ => debug!(document = name, "programme without channel attribute"),
        }
    }

    Ok(GuideDocument::new(name, root.attributes, channels, programmes))
}

fn guide_channel(element: &XmlElement) -> Option<GuideChannel> {
    let id = element.attr("id").filter(|id| !id.is_empty())?;

    let display_names: Vec<String> = element
        .descendants_named("display-name")
        .into_iter()
        .map(XmlElement::text)
        .filter(|name| !name.is_empty())
        .collect();
    if display_names.is_empty() {
        debug!(id, "guide channel without a display name");
        return None;
    }

    let icons = element
        .descendants_named("icon")
        .into_iter()
        .filter_map(|icon| icon.attr("src"))
        .filter(|src| !src.is_empty())
        .map(str::to_string)
        .collect();

    let extra_children = element
        .child_elements()
        .filter(|child| child.name != "display-name")
        .cloned()
        .collect();

    Some(GuideChannel {
        id: id.to_string(),
        display_names,
        icons,
        extra_children,
    })
}
