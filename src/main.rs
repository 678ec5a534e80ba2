//! # EPG Harness CLI (`epgh`)
//!
//! Matches a subscriber playlist against channel catalogs and program
//! guides, and writes channel lists and consolidated guides.
//!
//! ## Usage
//!
//! ```bash
//! epgh --config ./config/epgh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `epgh channels` | Match against the static catalog, write a channel list |
//! | `epgh match <GUIDE>` | Match against one guide document |
//! | `epgh region <CODE>` | Fetch, match and consolidate every guide for a region |
//! | `epgh regions [CODES...]` | Region run for many regions, with a summary |
//! | `epgh merge <GUIDE>...` | Merge guide documents without a playlist |
//! | `epgh sources` | List regions and their guide sources |
//!
//! ## Examples
//!
//! ```bash
//! # Catalog channel list for UK channels
//! epgh channels --playlist playlist.m3u --prefix "UK:" --channels-dir ./channels
//!
//! # Inspect matches against one guide, with a CSV report
//! epgh match epg_data/epg_ripper_UK1.xml --playlist playlist.m3u --prefix "UK:" \
//!     --show-all --csv matches.csv
//!
//! # Perfect matches only, for every configured region
//! epgh regions --only-perfect --playlist-url http://host/playlist.m3u
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use epg_harness::config;
use epg_harness::consolidate::DuplicateIdPolicy;
use epg_harness::fetch::HttpFetcher;
use epg_harness::pipeline::{self, ChannelListOptions, MatchOptions, PlaylistSource, RegionOptions};
use epg_harness::progress::ProgressMode;
use epg_harness::sources;

/// EPG Harness CLI: channel identity matching and program-guide
/// consolidation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/epgh.example.toml` for a full example. A missing file
/// means built-in defaults.
#[derive(Parser)]
#[command(
    name = "epgh",
    about = "EPG Harness: match playlist channels to program guides and consolidate them",
    version,
    long_about = "EPG Harness normalizes channel names from a subscriber playlist, matches them \
    against a static channel catalog or live guide documents, consolidates matches drawn from \
    several guides, and writes a pruned guide restricted to the playlist's channels."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/epgh.toml")]
    config: PathBuf,

    /// Debug logging (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress on stderr: off, human or json. Defaults to human on a TTY.
    #[arg(long, global = true)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Playlist selection shared by the matching commands.
#[derive(Args, Clone, Default)]
struct PlaylistArgs {
    /// Local playlist file (M3U or XML).
    #[arg(long)]
    playlist: Option<PathBuf>,

    /// Playlist URL, cached by date under `paths.playlist_dir`.
    #[arg(long, conflicts_with = "playlist")]
    playlist_url: Option<String>,

    /// Download the playlist even if today's copy is cached.
    #[arg(long)]
    force_download: bool,
}

impl From<PlaylistArgs> for PlaylistSource {
    fn from(args: PlaylistArgs) -> Self {
        PlaylistSource {
            file: args.playlist,
            url: args.playlist_url,
            force_download: args.force_download,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Match the playlist against the static catalog.
    ///
    /// Writes a channel-list document and a log of unmatched channels.
    Channels {
        #[command(flatten)]
        playlist: PlaylistArgs,

        /// Keep only channels whose name starts with this prefix (e.g. "UK:").
        #[arg(long)]
        prefix: Option<String>,

        /// Directory of catalog mapping documents.
        #[arg(long)]
        channels_dir: Option<PathBuf>,

        /// Channel-list output file.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Unmatched channel log.
        #[arg(long)]
        unmatched_log: Option<PathBuf>,
    },

    /// Match the playlist against a single guide document.
    Match {
        /// Guide document (XMLTV, optionally gzipped).
        guide: PathBuf,

        #[command(flatten)]
        playlist: PlaylistArgs,

        #[arg(long)]
        prefix: Option<String>,

        /// Minimum fuzzy score to accept (0-100).
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        /// Only exact (score 100) matches.
        #[arg(long)]
        only_perfect: bool,

        /// Include unmatched channels in the listing.
        #[arg(long)]
        show_all: bool,

        /// Write the match report as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a guide pruned to the matched channels.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Fetch, match and consolidate every guide for one region.
    ///
    /// Writes `epg_<CODE>.xml` and `unmatched_<CODE>.log` to the output
    /// directory.
    Region {
        /// Region code or playlist prefix (e.g. `UK` or `UK:`).
        region: String,

        #[command(flatten)]
        playlist: PlaylistArgs,

        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        #[arg(long)]
        only_perfect: bool,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Run the region command for several regions.
    ///
    /// Defaults to every region in the config and sources file. Exits
    /// non-zero if any region fails.
    Regions {
        /// Region codes (default: all known regions).
        codes: Vec<String>,

        #[command(flatten)]
        playlist: PlaylistArgs,

        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        #[arg(long)]
        only_perfect: bool,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Delete downloaded guides and cached playlists first.
        #[arg(long)]
        clear_data: bool,
    },

    /// Merge guide documents into one.
    Merge {
        /// Guide documents to merge.
        #[arg(required = true)]
        guides: Vec<PathBuf>,

        #[arg(long, short)]
        output: PathBuf,

        /// first-wins, last-wins or keep-all. Defaults to the config value.
        #[arg(long)]
        duplicate_ids: Option<DuplicateIdPolicy>,
    },

    /// List regions and their resolved guide sources.
    Sources,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_or_minimal(&cli.config)?;
    let fetcher = HttpFetcher::new(Duration::from_secs(cfg.fetch.timeout_secs))?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Channels {
            playlist,
            prefix,
            channels_dir,
            output,
            unmatched_log,
        } => {
            let options = ChannelListOptions {
                playlist: playlist.into(),
                prefix,
                channels_dir,
                output,
                unmatched_log,
            };
            pipeline::run_channel_list(&cfg, &options, &fetcher)?;
        }
        Commands::Match {
            guide,
            playlist,
            prefix,
            threshold,
            only_perfect,
            show_all,
            csv,
            output,
        } => {
            let options = MatchOptions {
                guide,
                playlist: playlist.into(),
                prefix,
                threshold,
                only_perfect,
                show_all,
                csv,
                output,
            };
            pipeline::run_match(&cfg, &options, &fetcher)?;
        }
        Commands::Region {
            region,
            playlist,
            threshold,
            only_perfect,
            output_dir,
        } => {
            let options = RegionOptions {
                playlist: playlist.into(),
                threshold,
                only_perfect,
                output_dir,
            };
            pipeline::run_region(&cfg, &region, &options, &fetcher, progress.as_ref())?;
        }
        Commands::Regions {
            codes,
            playlist,
            threshold,
            only_perfect,
            output_dir,
            clear_data,
        } => {
            let options = RegionOptions {
                playlist: playlist.into(),
                threshold,
                only_perfect,
                output_dir,
            };
            pipeline::run_all_regions(
                &cfg,
                &codes,
                &options,
                clear_data,
                &fetcher,
                progress.as_ref(),
            )?;
        }
        Commands::Merge {
            guides,
            output,
            duplicate_ids,
        } => {
            let policy = duplicate_ids.unwrap_or(cfg.matching.duplicate_ids);
            pipeline::run_merge(&guides, &output, policy)?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
    }

    Ok(())
}
