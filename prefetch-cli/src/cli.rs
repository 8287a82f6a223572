use std::path::PathBuf;

use clap::Parser;
use hls_prefetch_engine::{DEFAULT_PREFETCH_MAX_COUNT, NetworkClass};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// HLS playlist URLs to prefetch (non-playlist URLs are ignored)
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Maximum number of playlists taken from the URL list
    #[arg(short = 'n', long, default_value_t = DEFAULT_PREFETCH_MAX_COUNT)]
    pub max_count: usize,

    /// Network class to schedule for (overrides the config file)
    #[arg(long, value_enum)]
    pub network_class: Option<NetworkClass>,

    /// Pretend the device is in low power mode
    #[arg(long)]
    pub low_power: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Give up waiting for prefetches after this many seconds
    #[arg(long, default_value_t = 30)]
    pub wait_secs: u64,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}
