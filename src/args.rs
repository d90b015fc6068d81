use clap::Parser;
use std::path::PathBuf;

use rusty_gaze::EstimatorConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Recorded session: JSON array of click/move events with eye patch images
    #[arg(short, long)]
    pub session: PathBuf,

    /// Estimator configuration (missing file means defaults)
    #[arg(short, long, default_value = EstimatorConfig::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Samples from an earlier session to load before replaying
    #[arg(long)]
    pub samples: Option<PathBuf>,

    /// Write the stored samples as JSON after the replay
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Train synchronously instead of on the background worker
    #[arg(long, default_value_t = false)]
    pub inline: bool,
}
