//! The bounded buffer the fusion center fills between flushes. The firmware
//! addresses it by slot: slot `k` holds the statistic recorded `k` epochs
//! into the current transmit window.

use std::error::Error;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// One decoded test statistic for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct EpochRecord {
    pub epoch: i64,
    pub temp: f64,
    pub humid: f64,
}

/// Raised when the firmware names a slot beyond the buffer. That means the
/// node mis-counted the samples of its transmit window and the transfer
/// cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOutOfRange {
    pub slot: usize,
    pub capacity: usize,
}

impl Display for SlotOutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "slot {} outside buffer of capacity {}",
            self.slot, self.capacity
        )
    }
}

impl Error for SlotOutOfRange {}

/// Fixed-capacity, slot-addressed record buffer.
#[derive(Debug)]
pub struct EpochBuffer {
    slots: Vec<Option<EpochRecord>>,
}

impl EpochBuffer {
    /// A buffer with room for `capacity` epochs.
    pub fn with_capacity(capacity: usize) -> Self {
        EpochBuffer {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Store `record` at `slot`. A repeated slot overwrites, which is what
    /// we want when a node resends a window after a reboot.
    pub fn insert(&mut self, slot: usize, record: EpochRecord) -> Result<(), SlotOutOfRange> {
        let capacity = self.capacity();
        match self.slots.get_mut(slot) {
            Some(entry) => {
                *entry = Some(record);
                Ok(())
            }
            None => Err(SlotOutOfRange { slot, capacity }),
        }
    }

    /// Take all occupied records in slot order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<EpochRecord> {
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }
}
