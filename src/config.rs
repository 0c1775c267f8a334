//! Experiment profiles. Everything that used to be scattered through the
//! deployment as hardcoded constants lives in one RON file per experiment:
//! port candidates, directories, epoch parameters, the room geometry, and
//! the labeled time periods used by the offline stages.

use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::epoch::EpochClock;
use crate::field::{GridPoint, RoomGrid};

/// A closed-open time period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// An axis-aligned rectangle of grid points where the alternative was truly
/// in place during an event, used to score detections.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TruthRect {
    pub lower_left: GridPoint,
    pub upper_right: GridPoint,
}

impl TruthRect {
    /// True when the rectangle covers `p`.
    pub fn contains(&self, p: &GridPoint) -> bool {
        p.x >= self.lower_left.x
            && p.x <= self.upper_right.x
            && p.y >= self.lower_left.y
            && p.y <= self.upper_right.y
    }
}

/// A named stretch of the recording that the offline stages evaluate,
/// optionally with a ground-truth region.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventWindow {
    pub name: String,
    pub period: Period,
    pub truth: Option<TruthRect>,
}

/// One experiment's complete deployment description.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentProfile {
    pub name: String,
    /// The instant at which epoch 0 began.
    pub start_time: NaiveDateTime,
    /// Total number of nodes in the network.
    pub nodes: u32,
    /// Measurements taken from the sensor during one epoch.
    pub ts_window_length: u32,
    /// Pause after the samples of an epoch are recorded, in ms.
    pub ts_epoch_buffer_ms: u32,
    /// Interval between two sensor samples, in ms.
    pub sensor_sampling_interval_ms: u32,
    /// Fixed-point precision of transmitted statistics. Must match the
    /// precision the node firmware sends with.
    pub precision_ts: u32,
    /// Nodes start recording after the epoch with this index.
    pub start_recording_epoch: u32,
    /// Wait before the firmware reconnects to the same node, in ms.
    pub waiting_time_before_reconnect_ms: u32,
    /// Wait before the firmware skips to the next node, in ms.
    pub wait_before_skipping_node_ms: u32,
    /// One connection transfers the statistics recorded during this window,
    /// in ms.
    pub transmit_window_ms: u32,
    /// Host-side watchdog: reboot the receiver after this long without a
    /// connection or transmission, in seconds.
    pub reboot_after_secs: i64,
    /// Give up on the clock handshake after this long, in seconds.
    pub wait_for_serial_secs: u64,
    /// Candidate device paths for the receiver microcontroller. Several are
    /// needed because the path can change when the receiver reboots.
    pub receiver_ports: Vec<PathBuf>,
    /// Candidate device paths for the rebooter microcontroller.
    pub rebooter_ports: Vec<PathBuf>,
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Optional command invoked with alert messages as its argument.
    pub alert_command: Option<String>,
    pub room: RoomGrid,
    /// Periods during which the null hypothesis held everywhere.
    pub null_periods: Vec<Period>,
    pub events: Vec<EventWindow>,
}

/// Errors produced while loading or validating a profile.
#[derive(Debug)]
pub enum ProfileError {
    Io(std::io::Error),
    Ron(ron::de::SpannedError),
    Invalid(String),
}

impl Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::Io(e) => write!(f, "io error: {e}"),
            ProfileError::Ron(e) => write!(f, "profile syntax error: {e}"),
            ProfileError::Invalid(why) => write!(f, "invalid profile: {why}"),
        }
    }
}

impl Error for ProfileError {}

impl From<std::io::Error> for ProfileError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ron::de::SpannedError> for ProfileError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::Ron(value)
    }
}

impl ExperimentProfile {
    /// Load and validate a profile from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path)?;
        let profile: ExperimentProfile = ron::from_str(&text)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Checks the profile for configurations that cannot work.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.nodes == 0 {
            return Err(ProfileError::Invalid("node count is zero".into()));
        }
        if self.ts_window_length == 0 || self.sensor_sampling_interval_ms == 0 {
            return Err(ProfileError::Invalid(
                "epoch parameters must be positive".into(),
            ));
        }
        if self.room.sensors.len() < self.nodes as usize {
            return Err(ProfileError::Invalid(format!(
                "{} nodes but only {} sensor coordinates",
                self.nodes,
                self.room.sensors.len()
            )));
        }
        if let Some(p) = self.room.out_of_bounds() {
            return Err(ProfileError::Invalid(format!(
                "coordinate ({}, {}) lies outside the {}x{} grid",
                p.x, p.y, self.room.dim.0, self.room.dim.1
            )));
        }
        Ok(())
    }

    /// Duration of one epoch in milliseconds: the sampling window plus the
    /// inter-epoch pause.
    pub fn epoch_ms(&self) -> i64 {
        (self.ts_window_length * self.sensor_sampling_interval_ms + self.ts_epoch_buffer_ms) as i64
    }

    /// An epoch clock anchored at this experiment's global start.
    pub fn epoch_clock(&self) -> EpochClock {
        EpochClock::new(self.start_time, self.epoch_ms())
    }

    /// Capacity of the ingestion buffer. Sized to the transmit window with
    /// 20% headroom, since one connection never transfers more than one
    /// window's worth of epochs.
    pub fn buffer_capacity(&self) -> usize {
        (self.transmit_window_ms as f64 / self.epoch_ms() as f64 * 1.2) as usize
    }

    /// After this many ms without a connection, a node reports on the serial
    /// bus that it may have died.
    pub fn death_warning_ms(&self) -> u64 {
        180 * self.wait_before_skipping_node_ms as u64
    }

    /// The directory this experiment's data logs live in.
    pub fn experiment_data_dir(&self) -> PathBuf {
        self.data_dir.join(&self.name)
    }

    /// The directory this experiment's backup logs live in.
    pub fn experiment_backup_dir(&self) -> PathBuf {
        self.backup_dir.join(&self.name)
    }

    /// Look up an event window by name.
    pub fn event(&self, name: &str) -> Option<&EventWindow> {
        self.events.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// A small two-node profile used across the crate's tests.
    pub(crate) fn test_profile() -> ExperimentProfile {
        let start = NaiveDate::from_ymd_opt(2024, 5, 8)
            .unwrap()
            .and_hms_opt(15, 55, 0)
            .unwrap();
        ExperimentProfile {
            name: "testbench".into(),
            start_time: start,
            nodes: 2,
            ts_window_length: 10,
            ts_epoch_buffer_ms: 1000,
            sensor_sampling_interval_ms: 500,
            precision_ts: 9,
            start_recording_epoch: 5,
            waiting_time_before_reconnect_ms: 10_000,
            wait_before_skipping_node_ms: 10_000,
            transmit_window_ms: 3_600_000,
            reboot_after_secs: 300,
            wait_for_serial_secs: 30,
            receiver_ports: vec!["/dev/ttyACM1".into()],
            rebooter_ports: vec!["/dev/ttyACM0".into()],
            data_dir: "data/csv".into(),
            backup_dir: "data/backup".into(),
            alert_command: None,
            room: RoomGrid {
                dim: (6, 6),
                sensors: vec![GridPoint { x: 1, y: 1 }, GridPoint { x: 4, y: 4 }],
                anchors: vec![GridPoint { x: 0, y: 0 }, GridPoint { x: 5, y: 5 }],
            },
            null_periods: vec![],
            events: vec![],
        }
    }

    #[test]
    fn derived_quantities() {
        let p = test_profile();
        assert_eq!(p.epoch_ms(), 6000);
        // 600 epochs per transmit window with 20% headroom (the 1.2 factor
        // lands just below 720 in binary floating point, as it always has)
        assert_eq!(p.buffer_capacity(), 719);
        assert_eq!(p.death_warning_ms(), 1_800_000);
    }

    #[test]
    fn ron_round_trip() {
        let p = test_profile();
        let text = ron::ser::to_string(&p).unwrap();
        let back: ExperimentProfile = ron::from_str(&text).unwrap();
        assert_eq!(back.name, p.name);
        assert_eq!(back.start_time, p.start_time);
        assert_eq!(back.epoch_ms(), p.epoch_ms());
    }

    #[test]
    fn validation_rejects_zero_nodes() {
        let mut p = test_profile();
        p.nodes = 0;
        assert!(matches!(p.validate(), Err(ProfileError::Invalid(_))));
    }

    #[test]
    fn validation_rejects_more_nodes_than_coordinates() {
        let mut p = test_profile();
        p.nodes = 3;
        assert!(matches!(p.validate(), Err(ProfileError::Invalid(_))));
    }

    #[test]
    fn shipped_profile_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/profiles/experiment_f.ron");
        let profile = ExperimentProfile::from_path(path).unwrap();
        assert_eq!(profile.nodes, 54);
        assert_eq!(profile.room.sensors.len(), 54);
        assert_eq!(profile.epoch_ms(), 6000);
        assert!(profile.event("first_walk").is_some());
        assert!(profile.event("first_walk").unwrap().truth.is_some());
    }

    #[test]
    fn truth_rect_containment() {
        let rect = TruthRect {
            lower_left: GridPoint { x: 1, y: 1 },
            upper_right: GridPoint { x: 3, y: 2 },
        };
        assert!(rect.contains(&GridPoint { x: 2, y: 2 }));
        assert!(!rect.contains(&GridPoint { x: 0, y: 1 }));
        assert!(!rect.contains(&GridPoint { x: 2, y: 3 }));
    }
}
