use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Args;

use super::sensors::timestamp::Timestamp;
use super::MuxOptions;

pub fn parse_base_time(s: &str) -> Result<Timestamp, String> {
    Timestamp::from_decimal_secs(s.trim()).ok_or_else(|| {
        format!(
            "Invalid base time: {}. Expected seconds since the epoch, at most nanosecond precision",
            s
        )
    })
}

#[derive(Args, Debug)]
pub struct MuxArgs {
    /// Bags to merge, as .mcap files or rosbag2 folders. Pass at least two.
    #[arg(short, long = "input", required = true)]
    pub inputs: Vec<Utf8PathBuf>,

    /// Output bag, written as <dir>/<name>/<name>.mcap. Defaults to <base time>.mcap
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Time the merged bag starts at, in seconds since the epoch. Defaults to now
    #[arg(short = 't', long, value_parser = parse_base_time)]
    pub base_time: Option<Timestamp>,

    /// Upper bound of the random shift added to each input, in milliseconds
    #[arg(short, long, default_value_t = 100)]
    pub jitter_ms: u64,

    /// Seed for the jitter, for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Compress chunks with zstd
    #[arg(short, long)]
    pub compress: bool,

    #[arg(long)]
    pub no_progress: bool,
}

impl MuxArgs {
    pub fn into_options(self) -> MuxOptions {
        MuxOptions {
            inputs: self.inputs,
            output: self.output,
            base_time: self.base_time,
            max_jitter: Duration::from_millis(self.jitter_ms),
            seed: self.seed,
            compression: self.compress.then_some(mcap::Compression::Zstd),
            progress: !self.no_progress,
        }
    }
}
