// Commandline argument parser using clap for the SiNet host tools

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::stats::Channel;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct SinetArgs {
    #[command(subcommand, long_about)]
    /// Which stage to run
    pub command: CommandTask,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Run the fusion center: ingest test statistics over serial
    #[command(about)]
    Run(RunCommand),

    /// Write the epoch/absolute-time correspondence CSV
    #[command(about)]
    Timetable(TimetableCommand),

    /// Learn null EDFs and compute p-values for an event
    #[command(about)]
    Pvals(PvalsCommand),

    /// Estimate lfdrs, decide at an FDR level, and render maps
    #[command(about)]
    Detect(DetectCommand),
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    /// Path to the experiment profile (RON)
    #[arg(short = 'c', long = "profile")]
    pub profile: PathBuf,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct TimetableCommand {
    /// Path to the experiment profile (RON)
    #[arg(short = 'c', long = "profile")]
    pub profile: PathBuf,

    /// Write correspondences for epochs 0 up to this index
    #[arg(short = 'u', long = "until")]
    pub until_epoch: i64,
}

/// Which sensor channel to evaluate.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ChannelArg {
    Temp,
    Humid,
}

impl From<ChannelArg> for Channel {
    fn from(value: ChannelArg) -> Self {
        match value {
            ChannelArg::Temp => Channel::Temp,
            ChannelArg::Humid => Channel::Humid,
        }
    }
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct PvalsCommand {
    /// Path to the experiment profile (RON)
    #[arg(short = 'c', long = "profile")]
    pub profile: PathBuf,

    /// Name of the event to evaluate, as labeled in the profile
    #[arg(short = 'e', long = "event")]
    pub event: String,

    /// Sensor channel to evaluate
    #[arg(long = "channel", value_enum, default_value_t = ChannelArg::Humid)]
    pub channel: ChannelArg,

    /// Filename for the p-value set to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct DetectCommand {
    /// Path to the experiment profile (RON)
    #[arg(short = 'c', long = "profile")]
    pub profile: PathBuf,

    /// Path to a previously computed p-value set
    #[arg(short = 'p', long = "pvals")]
    pub pvals: PathBuf,

    /// Target false discovery rate level
    #[arg(short = 'a', long = "alpha", default_value_t = 0.1)]
    pub alpha: f64,

    /// Moving-average length over epochs, 1 disables smoothing
    #[arg(long = "ma", default_value_t = 3)]
    pub ma_len: usize,

    /// Directory the rendered maps are written into
    #[arg(short = 'o', long = "out")]
    pub outdir: PathBuf,

    /// Additionally render lfdr and decision maps for every Nth epoch
    #[arg(long = "render-every")]
    pub render_every: Option<usize>,
}
