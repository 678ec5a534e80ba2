//! Consolidation of match results from several guide documents.
//!
//! Results for one region are computed independently per guide document.
//! [`consolidate`] reduces them to one result per playlist channel and
//! builds a single pruned guide:
//!
//! 1. With `only_perfect`, drop every result that is not a score-100 match.
//! 2. Group by the playlist channel's raw name. In each group a matched
//!    result beats an unmatched one, a higher score beats a lower one, and
//!    the first-seen result wins a tie.
//! 3. For every surviving match, emit the guide channel under its own id,
//!    renamed to the playlist's raw name, with its icons and other
//!    non-name children.
//! 4. Copy every programme, from every document, whose channel id made it
//!    into the output.
//!
//! Two playlist channels can resolve to the same guide channel id. Which
//! copy is written is chosen by [`DuplicateIdPolicy`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::guide::GuideDocument;
use crate::models::{GuideChannel, MatchResult};
use crate::xml::XmlElement;

pub const GENERATOR_NAME: &str = "Consolidated EPG Generator";

/// What to do when a channel id is emitted more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateIdPolicy {
    /// Keep the first channel element for an id.
    #[default]
    FirstWins,
    /// Keep the position of the first, with the content of the last.
    LastWins,
    /// Write every copy.
    KeepAll,
}

impl fmt::Display for DuplicateIdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DuplicateIdPolicy::FirstWins => "first-wins",
            DuplicateIdPolicy::LastWins => "last-wins",
            DuplicateIdPolicy::KeepAll => "keep-all",
        })
    }
}

impl FromStr for DuplicateIdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-wins" => Ok(DuplicateIdPolicy::FirstWins),
            "last-wins" => Ok(DuplicateIdPolicy::LastWins),
            "keep-all" => Ok(DuplicateIdPolicy::KeepAll),
            other => Err(format!(
                "unknown duplicate id policy '{}'. Must be first-wins, last-wins, or keep-all",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationPolicy {
    pub only_perfect: bool,
    pub duplicate_ids: DuplicateIdPolicy,
}

/// Output of [`consolidate`].
#[derive(Debug, Clone)]
pub struct ConsolidatedGuide {
    /// One result per playlist channel that survived, in first-seen order.
    pub results: Vec<MatchResult>,
    /// The `<tv>` root of the pruned guide.
    pub document: XmlElement,
    pub channel_count: usize,
    pub programme_count: usize,
}

impl ConsolidatedGuide {
    pub fn is_empty(&self) -> bool {
        self.channel_count == 0
    }
}

/// Reduce results to one per playlist raw name.
pub fn best_per_channel(results: impl IntoIterator<Item = MatchResult>) -> Vec<MatchResult> {
    let mut out: Vec<MatchResult> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        match index.get(&result.channel.raw_name) {
            None => {
                index.insert(result.channel.raw_name.clone(), out.len());
                out.push(result);
            }
            Some(&i) => {
                let current = &out[i];
                let better = match (current.is_matched(), result.is_matched()) {
                    (false, true) => true,
                    (true, true) => result.score > current.score,
                    _ => false,
                };
                if better {
                    debug!(
                        channel = %result.channel.raw_name,
                        from = current.score,
                        to = result.score,
                        source = result.source_document.as_deref().unwrap_or(""),
                        "replacing consolidated match"
                    );
                    out[i] = result;
                }
            }
        }
    }
    out
}

/// Consolidate `results` computed against `documents` into one guide.
pub fn consolidate(
    results: Vec<MatchResult>,
    documents: &[GuideDocument],
    policy: ConsolidationPolicy,
) -> ConsolidatedGuide {
    let considered = results
        .into_iter()
        .filter(|r| !policy.only_perfect || r.is_perfect());
    let selected = best_per_channel(considered);

    let mut root = XmlElement::new("tv");
    match documents {
        [single] => root.attributes = single.attributes.clone(),
        _ => root.set_attribute("generator-info-name", GENERATOR_NAME),
    }

    let mut channels = ChannelSet::new(policy.duplicate_ids);
    for result in &selected {
        let Some(channel) = result.target.as_ref().and_then(|t| t.as_guide()) else {
            continue;
        };
        channels.push(
            &channel.id,
            renamed_channel(channel, &result.channel.raw_name),
        );
    }

    let (channel_count, programme_count) = channels.finish(&mut root, documents);
    info!(
        channels = channel_count,
        programmes = programme_count,
        documents = documents.len(),
        "consolidated guide"
    );

    ConsolidatedGuide {
        results: selected,
        document: root,
        channel_count,
        programme_count,
    }
}

/// Merge whole guide documents without any playlist involved. Channels keep
/// their own display names; duplicate ids follow `policy`.
pub fn merge_documents(documents: &[GuideDocument], policy: DuplicateIdPolicy) -> XmlElement {
    let mut root = XmlElement::new("tv").with_attribute("generator-info-name", GENERATOR_NAME);
    let mut channels = ChannelSet::new(policy);
    for doc in documents {
        for channel in &doc.channels {
            channels.push(&channel.id, channel_element(channel, &channel.display_names));
        }
    }
    let (channel_count, programme_count) = channels.finish(&mut root, documents);
    info!(
        channels = channel_count,
        programmes = programme_count,
        documents = documents.len(),
        "merged guides"
    );
    root
}

/// Channel elements in output order, deduplicated per policy.
struct ChannelSet {
    policy: DuplicateIdPolicy,
    elements: Vec<XmlElement>,
    positions: HashMap<String, usize>,
}

impl ChannelSet {
    fn new(policy: DuplicateIdPolicy) -> Self {
        Self {
            policy,
            elements: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn push(&mut self, id: &str, element: XmlElement) {
        let existing = self.positions.get(id).copied();
        match (existing, self.policy) {
            (Some(_), DuplicateIdPolicy::FirstWins) => {
                debug!(id, "dropping duplicate channel id");
            }
            (Some(i), DuplicateIdPolicy::LastWins) => self.elements[i] = element,
            (Some(_), DuplicateIdPolicy::KeepAll) | (None, _) => {
                self.positions
                    .entry(id.to_string())
                    .or_insert(self.elements.len());
                self.elements.push(element);
            }
        }
    }

    /// Append channels, then the programmes of retained ids, to `root`.
    fn finish(self, root: &mut XmlElement, documents: &[GuideDocument]) -> (usize, usize) {
        let retained: HashSet<&String> = self.positions.keys().collect();
        let channel_count = self.elements.len();
        for element in self.elements.iter().cloned() {
            root.push_element(element);
        }

        let mut programme_count = 0;
        for doc in documents {
            for programme in doc.programmes() {
                if retained.contains(&programme.channel_id) {
                    root.push_element(programme.element.clone());
                    programme_count += 1;
                }
            }
        }
        (channel_count, programme_count)
    }
}

fn renamed_channel(channel: &GuideChannel, display_name: &str) -> XmlElement {
    channel_element(channel, std::slice::from_ref(&display_name.to_string()))
}

fn channel_element(channel: &GuideChannel, display_names: &[String]) -> XmlElement {
    let mut element = XmlElement::new("channel").with_attribute("id", channel.id.as_str());
    for name in display_names {
        element.push_element(XmlElement::new("display-name").with_text(name.as_str()));
    }
    for src in &channel.icons {
        element.push_element(XmlElement::new("icon").with_attribute("src", src.as_str()));
    }
    for child in channel.extra_children.iter().filter(|c| c.name != "icon") {
        element.push_element(child.clone());
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::parse_guide;
    use crate::models::{ChannelRecord, MatchMethod, MatchTarget};

    const DOC_A: &str = r#"<tv source="a">
  <channel id="espn.us"><display-name>ESPN US</display-name><icon src="http://a/espn.png"/><url>http://espn</url></channel>
  <channel id="cnn.us"><display-name>CNN</display-name></channel>
  <programme channel="espn.us" start="1"><title>A1</title></programme>
  <programme channel="cnn.us" start="1"><title>A2</title></programme>
</tv>"#;

    const DOC_B: &str = r#"<tv source="b">
  <channel id="espn.b"><display-name>ESPN</display-name></channel>
  <channel id="fox.us"><display-name>FOX</display-name></channel>
  <programme channel="espn.b" start="1"><title>B1</title></programme>
  <programme channel="fox.us" start="1"><title>B2</title></programme>
</tv>"#;

    fn docs() -> Vec<GuideDocument> {
        vec![
            parse_guide(DOC_A, "a.xml").unwrap(),
            parse_guide(DOC_B, "b.xml").unwrap(),
        ]
    }

    fn record(raw: &str) -> ChannelRecord {
        ChannelRecord {
            raw_name: raw.into(),
            clean_name: raw.into(),
            external_id: String::new(),
            stream_ref: "http://example/a".into(),
            source_line: String::new(),
        }
    }

    fn matched(raw: &str, doc: &GuideDocument, id: &str, score: u8) -> MatchResult {
        MatchResult {
            channel: record(raw),
            target: Some(MatchTarget::Guide(doc.channel(id).unwrap().clone())),
            score,
            method: if score == 100 {
                MatchMethod::Exact
            } else {
                MatchMethod::TokenSet
            },
            source_document: Some(doc.name.clone()),
        }
    }

    fn channel_ids(root: &XmlElement) -> Vec<String> {
        root.children_named("channel")
            .filter_map(|c| c.attr("id").map(str::to_string))
            .collect()
    }

    #[test]
    fn higher_score_wins_across_documents() {
        let docs = docs();
        let results = vec![
            matched("ESPN", &docs[0], "espn.us", 82),
            matched("ESPN", &docs[1], "espn.b", 95),
        ];
        let out = consolidate(results, &docs, ConsolidationPolicy::default());
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].score, 95);
        assert_eq!(out.results[0].source_document.as_deref(), Some("b.xml"));
        assert_eq!(channel_ids(&out.document), vec!["espn.b"]);
    }

    #[test]
    fn matched_beats_unmatched_and_ties_keep_first() {
        let docs = docs();
        let results = vec![
            MatchResult::unmatched(record("CNN")).with_source("b.xml"),
            matched("CNN", &docs[0], "cnn.us", 90),
            matched("ESPN", &docs[0], "espn.us", 90),
            matched("ESPN", &docs[1], "espn.b", 90),
        ];
        let selected = best_per_channel(results);
        let names: Vec<&str> = selected.iter().map(|r| r.channel.raw_name.as_str()).collect();
        assert_eq!(names, vec!["CNN", "ESPN"]);
        assert!(selected[0].is_matched());
        assert_eq!(selected[1].source_document.as_deref(), Some("a.xml"));
    }

    #[test]
    fn renames_and_copies_children() {
        let docs = docs();
        let out = consolidate(
            vec![matched("US: ESPN HD", &docs[0], "espn.us", 100)],
            &docs[..1],
            ConsolidationPolicy::default(),
        );
        let channel = out.document.children_named("channel").next().unwrap();
        let names: Vec<String> = channel.children_named("display-name").map(|d| d.text()).collect();
        assert_eq!(names, vec!["US: ESPN HD"]);
        let children: Vec<&str> = channel.child_elements().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["display-name", "icon", "url"]);
        assert_eq!(out.document.attr("source"), Some("a"));
    }

    #[test]
    fn programmes_follow_retained_channels_only() {
        let docs = docs();
        let out = consolidate(
            vec![matched("ESPN", &docs[1], "espn.b", 100)],
            &docs,
            ConsolidationPolicy::default(),
        );
        let ids: HashSet<String> = channel_ids(&out.document).into_iter().collect();
        let programmes: Vec<&XmlElement> = out.document.children_named("programme").collect();
        assert_eq!(programmes.len(), 1);
        assert_eq!(out.programme_count, 1);
        for p in programmes {
            assert!(ids.contains(p.attr("channel").unwrap()));
        }
        assert_eq!(out.document.attr("generator-info-name"), Some(GENERATOR_NAME));
    }

    #[test]
    fn only_perfect_filters_first() {
        let docs = docs();
        let results = vec![
            matched("CNN", &docs[0], "cnn.us", 100),
            matched("FOX", &docs[1], "fox.us", 88),
        ];
        let policy = ConsolidationPolicy {
            only_perfect: true,
            ..Default::default()
        };
        let out = consolidate(results, &docs, policy);
        assert_eq!(channel_ids(&out.document), vec!["cnn.us"]);
        assert_eq!(out.results.len(), 1);
    }

    #[test]
    fn duplicate_id_policies() {
        let docs = docs();
        let results = || {
            vec![
                matched("ESPN", &docs[0], "espn.us", 100),
                matched("ESPN 2", &docs[0], "espn.us", 90),
            ]
        };
        let run = |dup| {
            consolidate(
                results(),
                &docs,
                ConsolidationPolicy {
                    only_perfect: false,
                    duplicate_ids: dup,
                },
            )
        };

        let first = run(DuplicateIdPolicy::FirstWins);
        assert_eq!(first.channel_count, 1);
        let name = first.document.descendants_named("display-name")[0].text();
        assert_eq!(name, "ESPN");

        let last = run(DuplicateIdPolicy::LastWins);
        assert_eq!(last.channel_count, 1);
        assert_eq!(last.document.descendants_named("display-name")[0].text(), "ESPN 2");

        let all = run(DuplicateIdPolicy::KeepAll);
        assert_eq!(all.channel_count, 2);
        assert_eq!(all.programme_count, 1);
    }

    #[test]
    fn merge_keeps_every_channel_once() {
        let docs = docs();
        let doubled = vec![docs[0].clone(), docs[0].clone(), docs[1].clone()];
        let root = merge_documents(&doubled, DuplicateIdPolicy::FirstWins);
        assert_eq!(channel_ids(&root), vec!["espn.us", "cnn.us", "espn.b", "fox.us"]);
        assert_eq!(root.children_named("programme").count(), 6);
    }

    #[test]
    fn policy_parses_from_kebab_case() {
        assert_eq!("last-wins".parse::<DuplicateIdPolicy>(), Ok(DuplicateIdPolicy::LastWins));
        assert!("sometimes".parse::<DuplicateIdPolicy>().is_err());
        assert_eq!(DuplicateIdPolicy::KeepAll.to_string(), "keep-all");
    }
}
