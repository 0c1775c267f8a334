//! Live terminal monitor for a running experiment. Points at the same
//! profile as `sinet run` and shows which nodes are still delivering data.

mod gui;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use sinet::config::ExperimentProfile;

#[derive(Debug, Parser)]
#[clap(version, about)]
struct MonitorArgs {
    /// Path to the experiment profile (RON)
    #[arg(short = 'c', long = "profile")]
    profile: PathBuf,

    /// How often the data directory is rescanned, in milliseconds
    #[arg(long = "refresh", default_value_t = 1000)]
    refresh_ms: u64,
}

fn main() {
    env_logger::init();
    let args = MonitorArgs::parse();
    let profile = match ExperimentProfile::from_path(&args.profile) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = gui::engage_monitor(&profile, Duration::from_millis(args.refresh_ms)) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
