//! The SiNet host CLI: run the fusion center, or run one of the offline
//! stages against previously recorded data.
//!
//! Examples:
//!
//! ```text
//! sinet run       --profile profiles/experiment_f.ron
//! sinet timetable --profile profiles/experiment_f.ron --until 250000
//! sinet pvals     --profile profiles/experiment_f.ron \
//!                 --event first_walk --out first_walk.ron
//! sinet detect    --profile profiles/experiment_f.ron \
//!                 --pvals first_walk.ron --alpha 0.1 --out maps \
//!                 --render-every 10
//! ```

use std::error::Error;

use clap::Parser;
use log::info;

use sinet::args::{CommandTask, SinetArgs};
use sinet::config::ExperimentProfile;
use sinet::lfdr::LfdrParams;
use sinet::stats::PvalSet;
use sinet::{data_log, fusion_center, process};

fn main() {
    env_logger::init();
    let args = SinetArgs::parse();
    if let Err(e) = dispatch(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn dispatch(args: SinetArgs) -> Result<(), Box<dyn Error>> {
    match args.command {
        CommandTask::Run(cmd) => {
            let profile = ExperimentProfile::from_path(&cmd.profile)?;
            info!("running fusion center for experiment {}", profile.name);
            fusion_center::run(&profile)?;
        }
        CommandTask::Timetable(cmd) => {
            let profile = ExperimentProfile::from_path(&cmd.profile)?;
            let clock = profile.epoch_clock();
            info!("one epoch lasts {} seconds", clock.epoch_ms() as f64 / 1000.0);
            let path = data_log::write_timetable(
                &profile.experiment_data_dir(),
                &clock,
                cmd.until_epoch,
            )?;
            println!("wrote {}", path.display());
        }
        CommandTask::Pvals(cmd) => {
            let profile = ExperimentProfile::from_path(&cmd.profile)?;
            let mut rng = rand::thread_rng();
            let set = process::compute_pvals(&profile, &cmd.event, cmd.channel.into(), &mut rng)?;
            set.to_path(&cmd.outfile)?;
            println!(
                "wrote {} ({} epochs x {} nodes)",
                cmd.outfile.display(),
                set.epochs.len(),
                set.sen_cds.len()
            );
        }
        CommandTask::Detect(cmd) => {
            let profile = ExperimentProfile::from_path(&cmd.profile)?;
            let set = PvalSet::from_path(&cmd.pvals)?;
            let params = LfdrParams {
                ma_len: cmd.ma_len,
                ..LfdrParams::default()
            };
            let det = process::run_detection(
                &profile,
                &set,
                cmd.alpha,
                &params,
                &cmd.outdir,
                cmd.render_every,
            )?;
            let rejections: usize = det
                .r_det
                .iter()
                .map(|row| row.iter().filter(|r| **r).count())
                .sum();
            println!(
                "{} rejections across {} epochs, maps in {}",
                rejections,
                det.r_det.len(),
                cmd.outdir.display()
            );
        }
    }
    Ok(())
}
