//! Local false-discovery rates and the decisions made from them. The
//! p-values of an event (all epochs, all sensors) feed one histogram
//! density estimate and Storey's null-proportion estimator; the resulting
//! lfdrs are smoothed over neighboring epochs, interpolated across the room
//! grid with the anchors pinned to 1, and thresholded with the adaptive
//! rule that keeps the average lfdr of the rejected set below the target
//! FDR level.

use serde::{Deserialize, Serialize};

use crate::config::TruthRect;
use crate::field::{GridPoint, RoomGrid};

/// Tuning knobs of the lfdr stage.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct LfdrParams {
    /// Number of histogram bins for the p-value density.
    pub bins: usize,
    /// Storey's lambda: p-values above it are assumed null.
    pub storey_lambda: f64,
    /// Length of the moving-average filter across epochs (1 = off). A
    /// person cannot spawn or vanish between epochs, so smoothing matches
    /// the phenomenon.
    pub ma_len: usize,
    /// Inverse-distance weighting exponent for grid interpolation.
    pub idw_power: f64,
}

impl Default for LfdrParams {
    fn default() -> Self {
        LfdrParams {
            bins: 25,
            storey_lambda: 0.5,
            ma_len: 3,
            idw_power: 2.0,
        }
    }
}

/// Storey's estimator of the null proportion: the share of p-values above
/// `lambda`, inflated by the width of that tail. Clamped to `(0, 1]`.
pub fn estimate_pi0(pvals: impl IntoIterator<Item = f64>, lambda: f64) -> f64 {
    let mut total = 0usize;
    let mut above = 0usize;
    for p in pvals.into_iter().filter(|p| !p.is_nan()) {
        total += 1;
        if p > lambda {
            above += 1;
        }
    }
    if total == 0 {
        return 1.0;
    }
    let pi0 = above as f64 / ((1.0 - lambda) * total as f64);
    pi0.clamp(f64::MIN_POSITIVE, 1.0)
}

/// The two-component mixture view of an event's p-values, fitted once over
/// every epoch and sensor: a histogram estimate of the marginal density
/// `f(p)` plus Storey's `pi0`. The lfdr of a p-value is then
/// `min(1, pi0 / f(p))`, i.e. the posterior probability that the null
/// generated it.
#[derive(Debug, Clone)]
pub struct LfdrEstimator {
    pi0: f64,
    bin_density: Vec<f64>,
}

impl LfdrEstimator {
    /// Fit from all p-values of an event. Returns `None` when there is not
    /// a single valid p-value to fit on.
    pub fn fit<I>(pvals: I, params: &LfdrParams) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let valid: Vec<f64> = pvals.into_iter().filter(|p| !p.is_nan()).collect();
        if valid.is_empty() {
            return None;
        }
        let bins = params.bins;
        let mut counts = vec![0usize; bins];
        for p in &valid {
            counts[Self::bin_of(*p, bins)] += 1;
        }
        let n = valid.len() as f64;
        let bin_density = counts
            .into_iter()
            .map(|c| c as f64 * bins as f64 / n)
            .collect();
        Some(LfdrEstimator {
            pi0: estimate_pi0(valid.iter().copied(), params.storey_lambda),
            bin_density,
        })
    }

    fn bin_of(p: f64, bins: usize) -> usize {
        ((p * bins as f64) as usize).min(bins - 1)
    }

    /// The estimated null proportion.
    pub fn pi0(&self) -> f64 {
        self.pi0
    }

    /// The lfdr of one p-value. NaN in, NaN out; a p-value in an empty bin
    /// gets lfdr 1 (no evidence of signal there).
    pub fn lfdr(&self, p: f64) -> f64 {
        if p.is_nan() {
            return f64::NAN;
        }
        let f = self.bin_density[Self::bin_of(p, self.bin_density.len())];
        if f <= 0.0 {
            1.0
        } else {
            (self.pi0 / f).min(1.0)
        }
    }

    /// lfdrs for one epoch row of p-values.
    pub fn lfdrs(&self, pvals: &[f64]) -> Vec<f64> {
        pvals.iter().map(|p| self.lfdr(*p)).collect()
    }
}

/// Centered moving average over epochs, applied per sensor column. NaNs
/// are skipped rather than poisoning their whole window; an all-NaN window
/// stays NaN.
pub fn smooth_over_epochs(lfdrs: &mut Vec<Vec<f64>>, ma_len: usize) {
    if ma_len <= 1 || lfdrs.is_empty() {
        return;
    }
    let epochs = lfdrs.len();
    let cols = lfdrs[0].len();
    let half = ma_len / 2;
    let mut smoothed = vec![vec![f64::NAN; cols]; epochs];
    for col in 0..cols {
        for row in 0..epochs {
            let from = row.saturating_sub(half);
            let to = (row + half + 1).min(epochs);
            let window: Vec<f64> = (from..to)
                .map(|r| lfdrs[r][col])
                .filter(|v| !v.is_nan())
                .collect();
            if !window.is_empty() {
                smoothed[row][col] = window.iter().sum::<f64>() / window.len() as f64;
            }
        }
    }
    *lfdrs = smoothed;
}

/// Interpolate sensor lfdrs onto the full grid by inverse-distance
/// weighting. Anchors pin the field to 1 wherever the null is known to
/// hold; a grid point on top of a sensor takes that sensor's value
/// directly. Sensors without a value this epoch are left out.
pub fn interpolate_to_grid(room: &RoomGrid, sensor_lfdrs: &[f64], params: &LfdrParams) -> Vec<f64> {
    let mut sources: Vec<(GridPoint, f64)> = room
        .sensors
        .iter()
        .zip(sensor_lfdrs)
        .filter(|(_, v)| !v.is_nan())
        .map(|(p, v)| (*p, *v))
        .collect();
    sources.extend(room.anchors.iter().map(|p| (*p, 1.0)));

    (0..room.len())
        .map(|idx| {
            let here = room.point_at(idx);
            let mut num = 0.0;
            let mut den = 0.0;
            for (src, value) in &sources {
                let dist = here.distance(src);
                if dist == 0.0 {
                    return *value;
                }
                let w = dist.powf(-params.idw_power);
                num += w * value;
                den += w;
            }
            if den == 0.0 {
                f64::NAN
            } else {
                num / den
            }
        })
        .collect()
}

/// The adaptive lfdr thresholding rule: walk the lfdrs in ascending order
/// and reject while the running mean stays at or below `alpha`. Returns a
/// rejection mask aligned with the input; NaNs are never rejected.
pub fn adaptive_threshold(lfdrs: &[f64], alpha: f64) -> Vec<bool> {
    let mut order: Vec<usize> = (0..lfdrs.len()).filter(|i| !lfdrs[*i].is_nan()).collect();
    order.sort_by(|a, b| lfdrs[*a].total_cmp(&lfdrs[*b]));

    let mut rejected = vec![false; lfdrs.len()];
    let mut running_sum = 0.0;
    for (k, idx) in order.iter().enumerate() {
        running_sum += lfdrs[*idx];
        if running_sum / (k + 1) as f64 > alpha {
            break;
        }
        rejected[*idx] = true;
    }
    rejected
}

/// Per-epoch detection outcome over the grid, with the four-way confusion
/// split when ground truth is available.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub dim: (usize, usize),
    /// One rejection mask per epoch, over the flat grid.
    pub r_det: Vec<Vec<bool>>,
    /// Ground-truth activity mask, when the event has one.
    pub r_tru: Option<Vec<bool>>,
}

/// The four classes of a scored grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    CorrectNonDiscovery,
    CorrectDiscovery,
    FalseDiscovery,
    MissedDiscovery,
}

impl DetectionResult {
    /// The ground-truth mask of a truth rectangle over the room grid.
    pub fn truth_mask(room: &RoomGrid, rect: &TruthRect) -> Vec<bool> {
        (0..room.len())
            .map(|idx| rect.contains(&room.point_at(idx)))
            .collect()
    }

    /// Score one epoch against the ground truth, if any.
    pub fn outcomes(&self, epoch_row: usize) -> Option<Vec<Outcome>> {
        let truth = self.r_tru.as_ref()?;
        Some(
            self.r_det[epoch_row]
                .iter()
                .zip(truth)
                .map(|(det, tru)| match (det, tru) {
                    (false, false) => Outcome::CorrectNonDiscovery,
                    (true, true) => Outcome::CorrectDiscovery,
                    (true, false) => Outcome::FalseDiscovery,
                    (false, true) => Outcome::MissedDiscovery,
                })
                .collect(),
        )
    }

    /// Share of epochs in which each grid point was rejected.
    pub fn detection_rate(&self) -> Vec<f64> {
        let epochs = self.r_det.len().max(1) as f64;
        let cells = self.r_det.first().map_or(0, Vec::len);
        (0..cells)
            .map(|c| self.r_det.iter().filter(|row| row[c]).count() as f64 / epochs)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pi0_is_one_under_a_uniform_sample() {
        // evenly spread p-values, as under H0
        let pvals = (0..100).map(|i| (i as f64 + 0.5) / 100.0);
        let pi0 = estimate_pi0(pvals, 0.5);
        assert!((pi0 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn concentrated_small_pvals_get_small_lfdrs() {
        let params = LfdrParams::default();
        // 400 null p-values spread out, 200 signal p-values near zero
        let mut pvals: Vec<f64> = (0..400).map(|i| (i as f64 + 0.5) / 400.0).collect();
        pvals.extend((0..200).map(|i| 0.001 + i as f64 * 1e-5));
        let est = LfdrEstimator::fit(pvals.iter().copied(), &params).unwrap();

        assert!(est.lfdr(0.002) < 0.1);
        assert!(est.lfdr(0.6) > 0.9);
        assert!(est.pi0() < 1.0);
    }

    #[test]
    fn lfdrs_stay_in_unit_interval_and_keep_nan() {
        let params = LfdrParams::default();
        let pvals: Vec<f64> = (0..50).map(|i| (i as f64 + 0.5) / 50.0).collect();
        let est = LfdrEstimator::fit(pvals.iter().copied(), &params).unwrap();
        let row = est.lfdrs(&[0.1, f64::NAN, 0.99]);
        assert!((0.0..=1.0).contains(&row[0]));
        assert!(row[1].is_nan());
        assert!((0.0..=1.0).contains(&row[2]));
    }

    #[test]
    fn fit_needs_at_least_one_pval() {
        let params = LfdrParams::default();
        assert!(LfdrEstimator::fit([f64::NAN], &params).is_none());
        assert!(LfdrEstimator::fit([], &params).is_none());
    }

    #[test]
    fn smoothing_averages_neighbors() {
        let mut lfdrs = vec![vec![0.0], vec![0.9], vec![0.0]];
        smooth_over_epochs(&mut lfdrs, 3);
        assert!((lfdrs[1][0] - 0.3).abs() < 1e-12);
        // edges use the shorter window
        assert!((lfdrs[0][0] - 0.45).abs() < 1e-12);
    }

    #[test]
    fn smoothing_skips_nan() {
        let mut lfdrs = vec![vec![0.4], vec![f64::NAN], vec![0.8]];
        smooth_over_epochs(&mut lfdrs, 3);
        assert!((lfdrs[1][0] - 0.6).abs() < 1e-12);
    }

    fn room() -> RoomGrid {
        RoomGrid {
            dim: (3, 3),
            sensors: vec![GridPoint { x: 0, y: 1 }, GridPoint { x: 2, y: 1 }],
            anchors: vec![GridPoint { x: 1, y: 2 }],
        }
    }

    #[test]
    fn interpolation_hits_sensors_exactly_and_pins_anchors() {
        let params = LfdrParams::default();
        let grid = interpolate_to_grid(&room(), &[0.1, 0.7], &params);
        let r = room();
        assert!((grid[r.flat_index(&GridPoint { x: 0, y: 1 })] - 0.1).abs() < 1e-12);
        assert!((grid[r.flat_index(&GridPoint { x: 2, y: 1 })] - 0.7).abs() < 1e-12);
        assert!((grid[r.flat_index(&GridPoint { x: 1, y: 2 })] - 1.0).abs() < 1e-12);
        // in-between values stay inside the hull of the sources
        for v in &grid {
            assert!((0.1..=1.0).contains(v));
        }
    }

    #[test]
    fn interpolation_without_any_source_is_nan() {
        let params = LfdrParams::default();
        let empty = RoomGrid {
            dim: (2, 2),
            sensors: vec![GridPoint { x: 0, y: 0 }],
            anchors: vec![],
        };
        let grid = interpolate_to_grid(&empty, &[f64::NAN], &params);
        assert!(grid.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn adaptive_rule_respects_the_level() {
        let lfdrs = [0.01, 0.02, 0.5, 0.9, f64::NAN];
        let rejected = adaptive_threshold(&lfdrs, 0.1);
        // the first two average to 0.015; adding 0.5 would blow the level
        assert_eq!(rejected, vec![true, true, false, false, false]);
    }

    #[test]
    fn adaptive_rule_rejects_nothing_when_everything_is_null() {
        let lfdrs = [0.8, 0.9, 1.0];
        assert!(!adaptive_threshold(&lfdrs, 0.1).iter().any(|r| *r));
    }

    #[test]
    fn outcomes_split_four_ways() {
        let det = DetectionResult {
            dim: (2, 2),
            r_det: vec![vec![true, false, true, false]],
            r_tru: Some(vec![true, true, false, false]),
        };
        let outcomes = det.outcomes(0).unwrap();
        assert_eq!(
            outcomes,
            vec![
                Outcome::CorrectDiscovery,
                Outcome::MissedDiscovery,
                Outcome::FalseDiscovery,
                Outcome::CorrectNonDiscovery,
            ]
        );
    }

    #[test]
    fn detection_rate_counts_per_cell() {
        let det = DetectionResult {
            dim: (2, 1),
            r_det: vec![vec![true, false], vec![true, true]],
            r_tru: None,
        };
        let rate = det.detection_rate();
        assert_eq!(rate, vec![1.0, 0.5]);
    }
}
