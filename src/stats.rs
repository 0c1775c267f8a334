//! From raw test statistics to p-values. The nodes report the average
//! absolute deviation of their sensor readings per epoch; those statistics
//! are discrete (limited sensor precision), so they get dithered with a
//! little uniform noise before an empirical null distribution is learned
//! and evaluated.

use std::fmt::Display;
use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::field::GridPoint;

/// Which measurement a statistic came from. The two sensors have different
/// precisions, so the dither width differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Channel {
    Temp,
    Humid,
}

impl Channel {
    /// Half-width of the dither noise before the window-length scaling.
    fn dither_half_width(self) -> f64 {
        match self {
            Channel::Humid => 0.01,
            Channel::Temp => 0.015,
        }
    }
}

/// Dither one discrete statistic: add uniform noise narrow enough to leave
/// no holes between neighboring representable values, scaled down by the
/// window length because the statistic is an average over the window. The
/// statistic is a deviation and can never be negative, so negative results
/// are mirrored.
pub fn dither(value: f64, channel: Channel, window_len: u32, rng: &mut impl Rng) -> f64 {
    if value.is_nan() {
        return f64::NAN;
    }
    let half = channel.dither_half_width();
    let noisy = value + rng.gen_range(-half..half) / window_len as f64;
    noisy.abs()
}

/// An empirical distribution function over a learned null sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Edf {
    sorted: Vec<f64>,
}

impl Edf {
    /// Learn an EDF from a sample, dropping NaNs. Returns `None` when
    /// nothing remains, there is no null to calibrate against then.
    pub fn learn(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Edf { sorted })
    }

    /// Size of the null sample.
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Fraction of the null sample at or below `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let below = self.sorted.partition_point(|v| *v <= x);
        below as f64 / self.sorted.len() as f64
    }

    /// The right-tail p-value of `x` with the finite-sample correction
    /// `p = ((1 - F(x)) n + 1) / (n + 1)`, which keeps p away from zero so
    /// downstream density estimates stay finite.
    pub fn pval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let n = self.sorted.len() as f64;
        ((1.0 - self.evaluate(x)) * n + 1.0) / (n + 1.0)
    }
}

/// The per-event result of the p-value stage: one row per evaluated epoch,
/// one column per node, NaN where a node has no data. Serialized as RON so
/// the detection stage can pick it up later.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PvalSet {
    pub event: String,
    pub channel: Channel,
    /// Grid extent of the room.
    pub dim: (usize, usize),
    /// The evaluated epoch indexes, in row order.
    pub epochs: Vec<i64>,
    /// Sensor coordinates, in column order.
    pub sen_cds: Vec<GridPoint>,
    /// Size of each node's learned null sample (0 = no null data).
    pub null_sizes: Vec<usize>,
    /// `pvals[row][col]` is the p-value of node `col` at epoch
    /// `epochs[row]`.
    pub pvals: Vec<Vec<f64>>,
}

/// Errors from persisting or loading a [`PvalSet`].
#[derive(Debug)]
pub enum PvalSetError {
    Io(std::io::Error),
    Ser(ron::Error),
    De(ron::de::SpannedError),
}

impl Display for PvalSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PvalSetError::Io(e) => write!(f, "io error: {e}"),
            PvalSetError::Ser(e) => write!(f, "ron error: {e}"),
            PvalSetError::De(e) => write!(f, "ron error: {e}"),
        }
    }
}

impl std::error::Error for PvalSetError {}

impl PvalSet {
    /// Write the set to `path` as RON.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), PvalSetError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(PvalSetError::Ser)?;
        fs::write(path, text).map_err(PvalSetError::Io)
    }

    /// Read a set back from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PvalSetError> {
        let text = fs::read_to_string(path).map_err(PvalSetError::Io)?;
        ron::from_str(&text).map_err(PvalSetError::De)
    }
}
