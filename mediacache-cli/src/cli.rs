use clap::{Parser, Subcommand};
use mediacache_engine::MediaKind;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    name = "mediacache",
    about = "Disk-backed media cache for chat clients - fetch, warm, inspect and clean",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Cache root directory
    #[arg(long, global = true, default_value = "./media-cache")]
    pub cache_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Overall timeout in seconds for one download request
    #[arg(long, global = true, default_value = "60")]
    pub timeout: u64,

    /// Ceiling on total cached bytes, with optional unit (B, KB, MB, GB).
    /// Examples: "500M", "2GB"
    #[arg(long, global = true, default_value = "500MB")]
    pub max_size: String,

    /// Known-bad host correction in FROM=TO form, repeatable
    #[arg(long = "rewrite-host", global = true, value_name = "FROM=TO")]
    pub rewrite_hosts: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve one URL to a local file, downloading it on a miss
    Fetch {
        /// URL of the media to resolve
        url: String,

        /// Media kind of the resource
        #[arg(short, long, default_value = "image")]
        kind: MediaKind,
    },

    /// Warm the cache for many URLs and wait for the downloads
    Prefetch {
        /// URLs to warm
        urls: Vec<String>,

        /// Media kind of the resources
        #[arg(short, long, default_value = "image")]
        kind: MediaKind,

        /// File with one URL per line; lines starting with '#' are skipped
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show totals and a per-kind breakdown
    Stats {
        /// Emit JSON instead of the human-readable listing
        #[arg(long)]
        json: bool,
    },

    /// Run the housekeeping passes: age sweep, then size eviction
    Sweep {
        /// Also drop index entries whose files are gone
        #[arg(long)]
        prune: bool,

        /// Run only the age sweep
        #[arg(long, conflicts_with = "size_only")]
        max_age_only: bool,

        /// Run only the size eviction
        #[arg(long)]
        size_only: bool,
    },

    /// Delete every cached file and reset the index
    Clear {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}
