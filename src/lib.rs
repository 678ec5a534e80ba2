//! # EPG Harness
//!
//! Channel identity matching and program-guide consolidation.
//!
//! A subscriber playlist names its channels one way ("UK: BBC One HD"), the
//! guide providers another ("BBC One", "bbc1.uk"). EPG Harness normalizes
//! both sides, matches every playlist channel to a static catalog or to
//! live guide documents, folds results from several guides into one, and
//! writes a pruned guide restricted to the channels the playlist carries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │  Playlist   │──▶│  Normalizer │──▶│   Matcher   │
//! │ M3U / XML   │   │             │   │ catalog /   │
//! └─────────────┘   └─────────────┘   │ guide mode  │
//! ┌─────────────┐                     └──────┬──────┘
//! │ Catalog or  │─────────────────────────────┤
//! │ Guide docs  │                            ▼
//! └─────────────┘                     ┌─────────────┐   ┌─────────────┐
//!                                     │ Consolidator│──▶│   Emitter   │
//!                                     └─────────────┘   │ XML/CSV/log │
//!                                                       └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! epgh channels --playlist playlist.m3u --prefix "UK:"   # catalog mode
//! epgh match epg_UK1.xml --playlist playlist.m3u --prefix "UK:" --show-all
//! epgh region UK                                         # fetch, match, consolidate
//! epgh regions                                           # every configured region
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`normalize`] | Channel name canonicalization |
//! | [`playlist`] | Playlist loader (M3U and XML) |
//! | [`catalog`] | Static catalog loader and index |
//! | [`guide`] | Guide document loader |
//! | [`fuzzy`] | Similarity ratios |
//! | [`matcher`] | Catalog and guide matching |
//! | [`consolidate`] | Multi-guide consolidation and merge |
//! | [`emit`] | Channel list, guide, unmatched report, CSV |
//! | [`fetch`] | Download, decompression, playlist cache |
//! | [`sources`] | Region guide source resolution |
//! | [`pipeline`] | Command orchestration |
//! | [`progress`] | Progress reporting on stderr |
//! | [`config`] | TOML configuration |
//! | [`models`] | Core data types |

pub mod catalog;
pub mod config;
pub mod consolidate;
pub mod emit;
pub mod error;
pub mod fetch;
pub mod fuzzy;
pub mod guide;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod playlist;
pub mod progress;
pub mod sources;
pub mod xml;
