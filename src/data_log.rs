//! CSV persistence for received test statistics. Every node gets one
//! primary log and one backup log per run; the backup carries a per-run key
//! in its filename, so a bad run can never clobber a good one.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use log::info;
use serde::{Deserialize, Serialize};

use crate::epoch::EpochClock;
use crate::epoch_buffer::EpochRecord;

/// Errors from reading or writing the data logs.
#[derive(Debug)]
pub enum LogError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogError::Io(e) => write!(f, "log io error: {e}"),
            LogError::Csv(e) => write!(f, "log csv error: {e}"),
        }
    }
}

impl Error for LogError {}

impl From<std::io::Error> for LogError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for LogError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Append `records` to the CSV at `path`, creating the file (and its
/// header row) on first use.
fn append_rows(path: &Path, records: &[EpochRecord]) -> Result<(), LogError> {
    let fresh = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new().has_headers(fresh).from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// The paired primary/backup log writer of one fusion-center run.
pub struct DataLog {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    backup_key: String,
}

impl DataLog {
    /// A log rooted at the experiment's data and backup directories.
    /// `backup_key` should be unique per run.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        backup_key: impl Into<String>,
    ) -> Self {
        DataLog {
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
            backup_key: backup_key.into(),
        }
    }

    /// The primary log path for a node.
    pub fn node_path(&self, node: u32) -> PathBuf {
        self.data_dir.join(format!("Node{node}_data.csv"))
    }

    fn backup_path(&self, node: u32) -> PathBuf {
        self.backup_dir
            .join(format!("Node{node}_data_{}.csv", self.backup_key))
    }

    /// Append the drained buffer of `node` to both its logs.
    pub fn append(&self, node: u32, records: &[EpochRecord]) -> Result<(), LogError> {
        if records.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.backup_dir)?;
        append_rows(&self.node_path(node), records)?;
        append_rows(&self.backup_path(node), records)?;
        info!("wrote {} epochs for Node{node}", records.len());
        Ok(())
    }
}

/// Load one node's log into an epoch-indexed map. Epochs logged twice (a
/// window resent after a reboot) keep the last row.
pub fn load_node(path: &Path) -> Result<BTreeMap<i64, EpochRecord>, LogError> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let mut series = BTreeMap::new();
    for row in reader.deserialize() {
        let record: EpochRecord = row?;
        series.insert(record.epoch, record);
    }
    Ok(series)
}

/// Load every node's log, in node order. Nodes without a log yield an
/// empty series.
pub fn load_all_nodes(
    data_dir: &Path,
    nodes: u32,
) -> Result<Vec<BTreeMap<i64, EpochRecord>>, LogError> {
    (1..=nodes)
        .map(|node| {
            let path = data_dir.join(format!("Node{node}_data.csv"));
            if path.exists() {
                load_node(&path)
            } else {
                info!("no data for Node{node} found");
                Ok(BTreeMap::new())
            }
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct TimetableRow {
    epoch: i64,
    time: String,
}

/// Write the epoch/absolute-time correspondence table for the operator,
/// `time_correspondences.csv` with one row per epoch in `0..until_epoch`.
pub fn write_timetable(
    data_dir: &Path,
    clock: &EpochClock,
    until_epoch: i64,
) -> Result<PathBuf, LogError> {
    fs::create_dir_all(data_dir)?;
    let path = data_dir.join("time_correspondences.csv");
    let mut writer = WriterBuilder::new().from_path(&path)?;
    for epoch in 0..until_epoch {
        writer.serialize(TimetableRow {
            epoch,
            time: clock.time_of(epoch).format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        })?;
    }
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(epoch: i64, humid: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            temp: 20.0,
            humid,
        }
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = DataLog::new(
            dir.path().join("csv"),
            dir.path().join("backup"),
            "1715000000",
        );

        log.append(3, &[record(10, 45.0), record(11, 45.5)]).unwrap();
        log.append(3, &[record(12, 46.0)]).unwrap();

        let series = load_node(&log.node_path(3)).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[&11].humid, 45.5);

        // the backup file received the same rows
        let backup = dir.path().join("backup").join("Node3_data_1715000000.csv");
        let backup_series = load_node(&backup).unwrap();
        assert_eq!(backup_series.len(), 3);
    }

    #[test]
    fn duplicate_epochs_keep_the_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = DataLog::new(dir.path().join("csv"), dir.path().join("backup"), "k");
        log.append(1, &[record(5, 40.0)]).unwrap();
        log.append(1, &[record(5, 41.0)]).unwrap();

        let series = load_node(&log.node_path(1)).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[&5].humid, 41.0);
    }

    #[test]
    fn empty_append_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = DataLog::new(dir.path().join("csv"), dir.path().join("backup"), "k");
        log.append(1, &[]).unwrap();
        assert!(!log.node_path(1).exists());
    }

    #[test]
    fn timetable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 5, 8)
            .unwrap()
            .and_hms_opt(15, 55, 0)
            .unwrap();
        let clock = EpochClock::new(start, 6000);
        let path = write_timetable(dir.path(), &clock, 3).unwrap();

        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "epoch,time");
        assert!(lines[1].starts_with("0,2024-05-08 15:55:00"));
        assert!(lines[2].starts_with("1,2024-05-08 15:55:06"));
    }
}
