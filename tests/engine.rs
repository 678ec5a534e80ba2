use std::collections::BTreeSet;

use epg_harness::catalog::Catalog;
use epg_harness::consolidate::{consolidate, ConsolidationPolicy, DuplicateIdPolicy};
use epg_harness::emit::channel_list_document;
use epg_harness::guide::{parse_guide, GuideDocument};
use epg_harness::matcher::{match_catalog, match_guide, CatalogMatcher, GuideMatcher};
use epg_harness::models::{CatalogEntry, MatchMethod, MatchResult, MatchTarget};
use epg_harness::normalize::{normalize, Normalizer};
use epg_harness::playlist::parse_playlist;
use epg_harness::xml::{parse_document, write_document};

const NAMES: &[&str] = &[
    "ESPN HD",
    "espn-hd",
    "UK: BBC One HD",
    "Sky Sports Main Event 4K",
    "Star Plus India",
    "AT&T SportsNet + More",
    "Discovery Channel TV",
    "  H.265 CNN  International  ",
    "TV",
    "Channel",
    "Food Network HEVC",
    "CA: CTV Toronto",
    "ESPNSD",
    "!!!",
    "",
];

const GUIDE_A: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv source-info-name="A">
  <channel id="espn.us">
    <display-name>ESPN US</display-name>
    <icon src="http://a/espn.png"/>
  </channel>
  <channel id="cnn.us"><display-name>CNN</display-name></channel>
  <programme channel="espn.us" start="1"><title>SportsCenter A</title></programme>
  <programme channel="cnn.us" start="1"><title>Newsroom</title></programme>
  <programme channel="ghost.us" start="1"><title>Orphan</title></programme>
</tv>"#;

const GUIDE_B: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv source-info-name="B">
  <channel id="espn.us">
    <display-name>ESPN</display-name>
    <icon src="http://b/espn.png"/>
  </channel>
  <channel id="hbo.us"><display-name>HBO</display-name></channel>
  <programme channel="espn.us" start="2"><title>SportsCenter B</title></programme>
  <programme channel="hbo.us" start="2"><title>Movie</title></programme>
</tv>"#;

fn guides() -> (GuideDocument, GuideDocument) {
    (
        parse_guide(GUIDE_A, "a.xml").unwrap(),
        parse_guide(GUIDE_B, "b.xml").unwrap(),
    )
}

fn channels(m3u: &str, prefix: Option<&str>) -> Vec<epg_harness::models::ChannelRecord> {
    parse_playlist(m3u, prefix).unwrap()
}

#[test]
fn normalize_is_idempotent() {
    let profiles = [Normalizer::standard(), Normalizer::catalog()];
    for name in NAMES {
        let once = normalize(name);
        assert_eq!(normalize(&once), once, "free normalize: {:?}", name);
        for profile in &profiles {
            let once = profile.normalize(name);
            assert_eq!(profile.normalize(&once), once, "{:?}: {:?}", profile, name);
        }
    }
}

#[test]
fn quality_and_punctuation_variants_agree() {
    assert_eq!(normalize("ESPN HD"), normalize("ESPN"));
    assert_eq!(normalize("espn-hd"), normalize("ESPN"));
    assert_eq!(normalize("ESPN"), "ESPN");
    assert_eq!(normalize("ESPNSD"), "ESPNSD");
}

#[test]
fn exact_is_the_only_method_scoring_100() {
    let (a, b) = guides();
    let playlist = channels(
        "#EXTM3U\n\
#EXTINF:-1,ESPN\nhttp://s/1\n\
#EXTINF:-1,ESPN US HD\nhttp://s/2\n\
#EXTINF:-1,CNN International\nhttp://s/3\n\
#EXTINF:-1,HBO 2\nhttp://s/4\n\
#EXTINF:-1,Nothing Similar At All\nhttp://s/5\n",
        None,
    );

    for document in [&a, &b] {
        for result in GuideMatcher::new(document).with_threshold(0).match_all(&playlist) {
            if result.score == 100 {
                assert_eq!(result.method, MatchMethod::Exact, "{:?}", result);
            }
            if result.method == MatchMethod::Exact {
                assert_eq!(result.score, 100);
            }
        }
    }
}

#[test]
fn raising_threshold_only_removes_matches() {
    let (a, _) = guides();
    let playlist = channels(
        "#EXTM3U\n\
#EXTINF:-1,ESPN USA\nhttp://s/1\n\
#EXTINF:-1,C N N\nhttp://s/2\n\
#EXTINF:-1,Random Words\nhttp://s/3\n",
        None,
    );

    for channel in &playlist {
        let best = match_guide(channel, &a, 0);
        for threshold in 0..=100u8 {
            let result = match_guide(channel, &a, threshold);
            if threshold <= best.score && best.is_matched() {
                assert!(result.is_matched(), "{} at {}", channel.raw_name, threshold);
                assert_eq!(result.score, best.score);
            } else {
                assert_eq!(result.method, MatchMethod::None);
                assert!(result.target.is_none());
            }
        }
    }
}

#[test]
fn consolidation_keeps_the_higher_score_and_its_source() {
    let (a, b) = guides();
    let channel = channels("#EXTM3U\n#EXTINF:-1,ESPN\nhttp://s/1\n", None).remove(0);

    let espn_a = a.channel("espn.us").unwrap().clone();
    let espn_b = b.channel("espn.us").unwrap().clone();
    let from_a = MatchResult {
        channel: channel.clone(),
        target: Some(MatchTarget::Guide(espn_a)),
        score: 82,
        method: MatchMethod::TokenSort,
        source_document: Some(a.name.clone()),
    };
    let from_b = MatchResult {
        channel: channel.clone(),
        target: Some(MatchTarget::Guide(espn_b)),
        score: 95,
        method: MatchMethod::Partial,
        source_document: Some(b.name.clone()),
    };

    for results in [vec![from_a.clone(), from_b.clone()], vec![from_b, from_a]] {
        let guide = consolidate(results, &[a.clone(), b.clone()], ConsolidationPolicy::default());
        assert_eq!(guide.results.len(), 1);
        assert_eq!(guide.results[0].score, 95);
        assert_eq!(guide.results[0].source_document.as_deref(), Some("b.xml"));

        let written = write_document(&guide.document).unwrap();
        assert!(written.contains("http://b/espn.png"));
        assert!(!written.contains("http://a/espn.png"));
        assert!(written.contains("<display-name>ESPN</display-name>"));
    }
}

#[test]
fn emitted_guide_has_no_orphan_programmes() {
    let (a, b) = guides();
    let playlist = channels(
        "#EXTM3U\n#EXTINF:-1,ESPN\nhttp://s/1\n#EXTINF:-1,CNN\nhttp://s/2\n",
        None,
    );
    let documents = vec![a, b];
    let mut results = Vec::new();
    for document in &documents {
        results.extend(GuideMatcher::new(document).match_all(&playlist));
    }

    for duplicate_ids in [
        DuplicateIdPolicy::FirstWins,
        DuplicateIdPolicy::LastWins,
        DuplicateIdPolicy::KeepAll,
    ] {
        let policy = ConsolidationPolicy {
            only_perfect: false,
            duplicate_ids,
        };
        let guide = consolidate(results.clone(), &documents, policy);
        let root = parse_document(&write_document(&guide.document).unwrap()).unwrap();

        let ids: BTreeSet<&str> = root
            .children_named("channel")
            .filter_map(|c| c.attr("id"))
            .collect();
        assert_eq!(ids, BTreeSet::from(["cnn.us", "espn.us"]));

        let programmes: Vec<_> = root.children_named("programme").collect();
        assert_eq!(programmes.len(), 3, "{}", duplicate_ids);
        for programme in programmes {
            let channel = programme.attr("channel").unwrap();
            assert!(ids.contains(channel), "orphan programme for {}", channel);
        }
    }
}

#[test]
fn only_perfect_drops_fuzzy_matches_before_consolidating() {
    let (a, _) = guides();
    let playlist = channels(
        "#EXTM3U\n#EXTINF:-1,CNN\nhttp://s/1\n#EXTINF:-1,ESPN\nhttp://s/2\n",
        None,
    );
    let results = GuideMatcher::new(&a).match_all(&playlist);
    assert_eq!(results[0].method, MatchMethod::Exact);
    assert!(results[1].is_matched() && !results[1].is_perfect());

    let policy = ConsolidationPolicy {
        only_perfect: true,
        duplicate_ids: DuplicateIdPolicy::FirstWins,
    };
    let guide = consolidate(results, std::slice::from_ref(&a), policy);
    assert_eq!(guide.channel_count, 1);
    assert_eq!(guide.programme_count, 1);
}

#[test]
fn channel_list_round_trip_is_lossy_only_on_ids_and_urls() {
    let entries = vec![
        CatalogEntry {
            site_name: "bbc.co.uk".to_string(),
            site_id: "bbc1".to_string(),
            external_id: "BBCOne.uk".to_string(),
            language: "en".to_string(),
            original_name: "BBC One".to_string(),
        },
        CatalogEntry {
            site_name: "itv.com".to_string(),
            site_id: "itv1".to_string(),
            external_id: String::new(),
            language: "en".to_string(),
            original_name: "ITV".to_string(),
        },
    ];
    let catalog = Catalog::from_entries(Normalizer::catalog(), entries);
    let playlist = channels(
        "#EXTM3U\n\
#EXTINF:-1 tvg-id=\"bbc1\",UK: BBC One HD\nhttp://s/bbc1\n\
#EXTINF:-1 tvg-id=\"itv-own\",UK: ITV\nhttp://s/itv\n",
        Some("UK:"),
    );
    let results = CatalogMatcher::new(&catalog).match_all(&playlist, 2);
    assert!(results.iter().all(|r| r.is_perfect()));

    let text = write_document(&channel_list_document(&results, Some("UK:"))).unwrap();
    let reloaded = parse_playlist(&text, None).unwrap();

    let original: BTreeSet<&str> = playlist.iter().map(|c| c.raw_name.as_str()).collect();
    let round_tripped: BTreeSet<&str> = reloaded.iter().map(|c| c.raw_name.as_str()).collect();
    assert_eq!(original, round_tripped);

    // Ids are the resolved catalog ids (or the playlist id as fallback), and
    // stream references are placeholders, not the original URLs.
    assert_eq!(reloaded[0].external_id, "BBCOne.uk");
    assert_ne!(reloaded[0].external_id, playlist[0].external_id);
    assert_eq!(reloaded[1].external_id, "itv-own");
    for (before, after) in playlist.iter().zip(&reloaded) {
        assert_ne!(before.stream_ref, after.stream_ref);
        assert!(after.stream_ref.starts_with("#EXTURL:"));
    }
}

#[test]
fn end_to_end_prefixed_quality_name_matches_exactly() {
    let playlist = channels(
        "#EXTINF:-1 tvg-id=\"x\",UK: BBC One HD\nhttp://example/a\n",
        Some("UK:"),
    );
    assert_eq!(playlist.len(), 1);
    assert_eq!(playlist[0].clean_name, "BBC One HD");
    assert_eq!(playlist[0].external_id, "x");
    assert_eq!(playlist[0].stream_ref, "http://example/a");

    let catalog = Catalog::from_entries(
        Normalizer::catalog(),
        vec![CatalogEntry {
            site_name: "bbc.co.uk".to_string(),
            site_id: "bbc1".to_string(),
            external_id: "BBCOne.uk".to_string(),
            language: "en".to_string(),
            original_name: "BBC One".to_string(),
        }],
    );
    let result = match_catalog(&playlist[0], &catalog);
    assert_eq!(result.method, MatchMethod::Exact);
    assert_eq!(result.score, 100);
    assert_eq!(result.target.unwrap().native_id(), "BBCOne.uk");
}
