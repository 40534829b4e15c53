use std::num::NonZeroUsize;
use std::path::PathBuf;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Catch podcast feeds, episodes and cover images into a local tree")]
pub struct CatcherArgs {
    #[arg(short, long, default_value = ".", env = "CAST_CATCHER_ROOT")]
    pub root: PathBuf,

    /// Persisted catalog, relative to the root unless absolute.
    #[arg(short, long, default_value = "podcasts.json", env = "CAST_CATCHER_CATALOG")]
    pub catalog: PathBuf,

    /// Rebuild the catalog from a `name, feed_url, image_url` file before running.
    #[arg(long, env = "CAST_CATCHER_CSV")]
    pub csv: Option<PathBuf>,

    #[arg(long, default_value = "5")]
    pub max_downloads: NonZeroUsize,

    #[arg(long, default_value = "4")]
    pub max_parallel_requests: NonZeroUsize,

    /// Connect and idle-read timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Extra attempts for a failed request.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    #[arg(long, default_value_t = false)]
    pub no_feed_download: bool,

    #[arg(long, default_value_t = false)]
    pub no_episodes: bool,

    #[arg(long, default_value_t = false)]
    pub no_render: bool,

    /// Fetch existing episodes again when their length differs from the advertised size.
    #[arg(long, default_value_t = false)]
    pub verify_size: bool,
}
