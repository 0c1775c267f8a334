//! The offline stages: turning logged test statistics into p-values for a
//! named event, and p-values into lfdr fields, decisions, and rendered
//! maps.

use std::fmt::Display;
use std::fs;
use std::path::Path;

use log::info;
use rand::Rng;

use crate::config::ExperimentProfile;
use crate::data_log::{self, LogError};
use crate::epoch::EpochError;
use crate::field::RoomGrid;
use crate::lfdr::{
    adaptive_threshold, interpolate_to_grid, smooth_over_epochs, DetectionResult, LfdrEstimator,
    LfdrParams,
};
use crate::render::{self, RenderError};
use crate::stats::{dither, Channel, Edf, PvalSet};

/// Errors of the offline stages.
#[derive(Debug)]
pub enum ProcessError {
    /// The profile does not define the requested event.
    UnknownEvent(String),
    /// The profile has no labeled null periods to calibrate on.
    NoNullPeriods,
    /// The event period contains no complete epoch.
    EmptyEvent(String),
    Epoch(EpochError),
    Log(LogError),
    Render(RenderError),
    Io(std::io::Error),
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::UnknownEvent(name) => {
                write!(f, "an event with the name {name:?} does not exist")
            }
            ProcessError::NoNullPeriods => {
                write!(f, "the profile labels no null periods to learn from")
            }
            ProcessError::EmptyEvent(name) => {
                write!(f, "event {name:?} covers no complete epoch")
            }
            ProcessError::Epoch(e) => write!(f, "{e}"),
            ProcessError::Log(e) => write!(f, "{e}"),
            ProcessError::Render(e) => write!(f, "{e}"),
            ProcessError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<EpochError> for ProcessError {
    fn from(value: EpochError) -> Self {
        Self::Epoch(value)
    }
}

impl From<LogError> for ProcessError {
    fn from(value: LogError) -> Self {
        Self::Log(value)
    }
}

impl From<RenderError> for ProcessError {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Learn per-node null EDFs from the profile's labeled null periods and
/// convert the event's statistics to p-values. Missing epochs stay NaN, a
/// node without null data gets a NaN column and a zero null size.
pub fn compute_pvals(
    profile: &ExperimentProfile,
    event_name: &str,
    channel: Channel,
    rng: &mut impl Rng,
) -> Result<PvalSet, ProcessError> {
    let clock = profile.epoch_clock();
    let window = profile
        .event(event_name)
        .ok_or_else(|| ProcessError::UnknownEvent(event_name.to_owned()))?;
    if profile.null_periods.is_empty() {
        return Err(ProcessError::NoNullPeriods);
    }

    let mut null_epochs: Vec<i64> = Vec::new();
    for period in &profile.null_periods {
        null_epochs.extend(clock.epochs_between(period.start, period.end)?);
    }
    let event_epochs: Vec<i64> = clock
        .epochs_between(window.period.start, window.period.end)?
        .collect();
    if event_epochs.is_empty() {
        return Err(ProcessError::EmptyEvent(event_name.to_owned()));
    }

    let series = data_log::load_all_nodes(&profile.experiment_data_dir(), profile.nodes)?;
    let window_len = profile.ts_window_length;
    let pick = |record: &crate::epoch_buffer::EpochRecord| match channel {
        Channel::Temp => record.temp,
        Channel::Humid => record.humid,
    };

    let mut null_sizes = Vec::with_capacity(series.len());
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(series.len());
    for (node_idx, node_series) in series.iter().enumerate() {
        let null_stats = null_epochs
            .iter()
            .filter_map(|e| node_series.get(e))
            .map(|r| dither(pick(r), channel, window_len, rng));
        let edf = Edf::learn(null_stats);
        null_sizes.push(edf.as_ref().map_or(0, Edf::len));

        let column: Vec<f64> = event_epochs
            .iter()
            .map(|e| match (&edf, node_series.get(e)) {
                (Some(edf), Some(record)) => {
                    edf.pval(dither(pick(record), channel, window_len, rng))
                }
                _ => f64::NAN,
            })
            .collect();
        columns.push(column);
        if let Some(edf) = &edf {
            info!(
                "learned EDF of {} ({} null samples)",
                RoomGrid::node_name(node_idx),
                edf.len()
            );
        }
    }

    // transpose the per-node columns into per-epoch rows
    let pvals: Vec<Vec<f64>> = (0..event_epochs.len())
        .map(|row| columns.iter().map(|col| col[row]).collect())
        .collect();

    Ok(PvalSet {
        event: event_name.to_owned(),
        channel,
        dim: profile.room.dim,
        epochs: event_epochs,
        sen_cds: profile.room.sensors[..profile.nodes as usize].to_vec(),
        null_sizes,
        pvals,
    })
}

/// Estimate lfdrs from a p-value set, decide at the target FDR level, and
/// render the maps into `out_dir`: the averaged detection rate always,
/// plus per-epoch lfdr and decision maps for every `render_every`-th epoch
/// when requested.
pub fn run_detection(
    profile: &ExperimentProfile,
    set: &PvalSet,
    alpha: f64,
    params: &LfdrParams,
    out_dir: &Path,
    render_every: Option<usize>,
) -> Result<DetectionResult, ProcessError> {
    let room = &profile.room;
    let clock = profile.epoch_clock();

    let estimator = LfdrEstimator::fit(set.pvals.iter().flatten().copied(), params);
    let mut sensor_lfdrs: Vec<Vec<f64>> = match &estimator {
        Some(est) => set.pvals.iter().map(|row| est.lfdrs(row)).collect(),
        // no data at all: every sensor stays NaN, only anchors pin the field
        None => vec![vec![f64::NAN; set.sen_cds.len()]; set.pvals.len()],
    };
    if let Some(est) = &estimator {
        info!("estimated null proportion: {:.3}", est.pi0());
    }
    smooth_over_epochs(&mut sensor_lfdrs, params.ma_len);

    let grids: Vec<Vec<f64>> = sensor_lfdrs
        .iter()
        .map(|row| interpolate_to_grid(room, row, params))
        .collect();
    let r_det: Vec<Vec<bool>> = grids
        .iter()
        .map(|grid| adaptive_threshold(grid, alpha))
        .collect();

    let r_tru = profile
        .event(&set.event)
        .and_then(|e| e.truth.as_ref())
        .map(|rect| DetectionResult::truth_mask(room, rect));
    let det = DetectionResult {
        dim: room.dim,
        r_det,
        r_tru,
    };

    fs::create_dir_all(out_dir)?;
    render::render_rate_map(&out_dir.join("detection_rate.png"), room, &det.detection_rate())?;

    if let Some(every) = render_every {
        for (row, epoch) in set.epochs.iter().enumerate().step_by(every.max(1)) {
            info!("rendering epoch {epoch} ({})", clock.time_of(*epoch));
            // sensor p-values on the floor plan, NaN-gray elsewhere
            let mut pval_grid = vec![f64::NAN; room.len()];
            for (sensor, p) in set.sen_cds.iter().zip(&set.pvals[row]) {
                pval_grid[room.flat_index(sensor)] = *p;
            }
            render::render_scalar_map(
                &out_dir.join(format!("pvals_{epoch}.png")),
                room,
                &pval_grid,
                render::pval_color,
            )?;
            render::render_scalar_map(
                &out_dir.join(format!("lfdr_{epoch}.png")),
                room,
                &grids[row],
                render::lfdr_color,
            )?;
            render::render_detection_map(
                &out_dir.join(format!("decisions_{epoch}.png")),
                room,
                &det,
                row,
            )?;
        }
    }

    let total: usize = det.r_det.iter().map(|row| row.iter().filter(|r| **r).count()).sum();
    info!(
        "{} rejections across {} epochs",
        total,
        det.r_det.len()
    );
    Ok(det)
}
