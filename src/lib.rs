//! Host-side software for SiNet, a wireless sensor network for spatial
//! multiple-hypothesis testing: humidity/temperature nodes record one test
//! statistic per epoch, a fusion-center microcontroller collects them over
//! BLE, and this crate ingests the fusion center's serial stream, persists
//! the statistics, and runs the offline inference.
//!
//! The moving parts, in the order data flows through them:
//!
//! - [`fusion_center`] speaks the firmware's line protocol over a
//!   [`serial_link`], buffers per-epoch statistics and persists them via
//!   [`data_log`], recovering from USB trouble with port rediscovery and
//!   hardware reset pulses;
//! - [`process`] turns the logged statistics into p-values under learned
//!   empirical nulls ([`stats`]), estimates local false-discovery rates and
//!   makes FDR-controlled decisions ([`lfdr`]), and renders the resulting
//!   maps ([`render`]);
//! - the `monitor` binary gives a live terminal view of data freshness
//!   while an experiment runs.
//!
//! Deployments are described by RON experiment profiles ([`config`]); the
//! node firmware lives in a separate repository.

#![warn(missing_docs)]

pub mod alerts;
pub mod args;
pub mod config;
pub mod data_log;
pub mod epoch;
pub mod epoch_buffer;
pub mod field;
pub mod firmware_event;
pub mod fusion_center;
pub mod lfdr;
pub mod link;
pub mod process;
pub mod render;
pub mod scripted_link;
pub mod serial_link;
pub mod stats;
