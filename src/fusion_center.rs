//! The fusion-center state machine. It owns one [`Link`] to the receiver
//! microcontroller and reacts to whatever the firmware prints: parameter
//! prompts are answered from the experiment profile, data records land in
//! the bounded epoch buffer, disconnects flush the buffer to the logs, and
//! two watchdogs ask for a hard reset when the network goes quiet.
//!
//! The machine itself never touches the rebooter; it reports that a reboot
//! is needed and [`run`] (which owns both serial devices) pulls the pin.

use std::time::{Duration, Instant};

use chrono::{Duration as TimeDelta, Local, NaiveDateTime};
use log::{debug, info, warn};

use crate::alerts::AlertSink;
use crate::config::ExperimentProfile;
use crate::data_log::{DataLog, LogError};
use crate::epoch::{EpochClock, EpochError};
use crate::epoch_buffer::{EpochBuffer, EpochRecord};
use crate::firmware_event::{FirmwareEvent, ParamPrompt};
use crate::link::{Link, LinkError};
use crate::serial_link::{self, Rebooter, SerialLink};

/// Granularity of blocking polls inside handshakes.
const POLL_SLICE: Duration = Duration::from_millis(200);
/// How long a prompt may stay unacknowledged before the exchange is
/// declared dead.
const ACK_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between rediscovery sweeps over the candidate port list.
const REDISCOVERY_PAUSE: Duration = Duration::from_millis(500);

/// Errors of the ingestion loop.
#[derive(Debug)]
pub enum FcError {
    Link(LinkError),
    Log(LogError),
    Epoch(EpochError),
    /// The clock handshake saw no `globTimeInput` prompt in time.
    HandshakeTimeout,
    /// A parameter prompt was answered but never acknowledged.
    AckTimeout(ParamPrompt),
    /// No candidate path for the receiver answered.
    NoReceiver,
    /// No candidate path for the rebooter answered.
    NoRebooter,
}

impl std::fmt::Display for FcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FcError::Link(e) => write!(f, "{e}"),
            FcError::Log(e) => write!(f, "{e}"),
            FcError::Epoch(e) => write!(f, "{e}"),
            FcError::HandshakeTimeout => write!(f, "no globTimeInput prompt before the deadline"),
            FcError::AckTimeout(p) => write!(f, "no acknowledgement for {p:?}"),
            FcError::NoReceiver => write!(f, "no receiver found on any candidate port"),
            FcError::NoRebooter => write!(f, "no rebooter found on any candidate port"),
        }
    }
}

impl std::error::Error for FcError {}

impl From<LinkError> for FcError {
    fn from(value: LinkError) -> Self {
        Self::Link(value)
    }
}

impl From<LogError> for FcError {
    fn from(value: LogError) -> Self {
        Self::Log(value)
    }
}

impl From<EpochError> for FcError {
    fn from(value: EpochError) -> Self {
        Self::Epoch(value)
    }
}

/// The parameter set communicated to the firmware, one prompt at a time.
#[derive(Debug, Clone)]
pub struct NodeParams {
    /// Whether reconnecting nodes should resend buffered history.
    pub recover_data: bool,
    pub ts_window_length: u32,
    pub ts_epoch_buffer_ms: u32,
    pub precision_ts: u32,
    pub start_recording_epoch: u32,
    pub sensor_sampling_interval_ms: u32,
    pub waiting_time_before_reconnect_ms: u32,
    pub wait_before_skipping_node_ms: u32,
    pub death_warning_ms: u64,
    pub transmit_window_ms: u32,
}

impl NodeParams {
    pub fn from_profile(profile: &ExperimentProfile) -> Self {
        NodeParams {
            recover_data: true,
            ts_window_length: profile.ts_window_length,
            ts_epoch_buffer_ms: profile.ts_epoch_buffer_ms,
            precision_ts: profile.precision_ts,
            start_recording_epoch: profile.start_recording_epoch,
            sensor_sampling_interval_ms: profile.sensor_sampling_interval_ms,
            waiting_time_before_reconnect_ms: profile.waiting_time_before_reconnect_ms,
            wait_before_skipping_node_ms: profile.wait_before_skipping_node_ms,
            death_warning_ms: profile.death_warning_ms(),
            transmit_window_ms: profile.transmit_window_ms,
        }
    }
}

/// Why the state machine wants the receiver hard-reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootReason {
    /// A data record named a slot outside the buffer.
    SlotOverflow,
    /// The connection watchdog fired.
    NoConnection,
    /// The transmission watchdog fired.
    NoTransmission,
}

/// What one dispatched line amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing arrived within the poll timeout.
    Idle,
    /// A data record went into the buffer.
    Recorded,
    /// The buffer was flushed; carries the number of epochs written.
    Flushed(usize),
    /// A parameter prompt was answered and acknowledged.
    ParamSet(ParamPrompt),
    /// A status line was handled.
    Noted,
    /// The receiver must be hard-reset before continuing.
    NeedsReboot(RebootReason),
    /// The line matched nothing we know; it was logged and skipped.
    Unrecognized,
}

/// The fusion-center state machine over any [`Link`].
pub struct FusionCenter<L: Link> {
    link: L,
    params: NodeParams,
    clock: EpochClock,
    buffer: EpochBuffer,
    log: DataLog,
    alerts: Box<dyn AlertSink + Send>,
    node_count: u32,
    /// The node the FC last heard from, 1-based. Used to resume after
    /// restarts and to attribute flushed buffers.
    this_node: u32,
    triggered: u32,
    last_connection: NaiveDateTime,
    last_transmission: NaiveDateTime,
    reboot_after: TimeDelta,
    wait_for_serial: Duration,
}

impl<L: Link> FusionCenter<L> {
    pub fn new(
        link: L,
        profile: &ExperimentProfile,
        log: DataLog,
        alerts: Box<dyn AlertSink + Send>,
    ) -> Self {
        let now = Local::now().naive_local();
        FusionCenter {
            link,
            params: NodeParams::from_profile(profile),
            clock: profile.epoch_clock(),
            buffer: EpochBuffer::with_capacity(profile.buffer_capacity()),
            log,
            alerts,
            node_count: profile.nodes,
            this_node: profile.nodes,
            triggered: 0,
            last_connection: now,
            last_transmission: now,
            reboot_after: TimeDelta::seconds(profile.reboot_after_secs),
            wait_for_serial: Duration::from_secs(profile.wait_for_serial_secs),
        }
    }

    /// Swap in a fresh link after rediscovery.
    pub fn set_link(&mut self, link: L) {
        self.link = link;
    }

    /// The node the FC currently attributes data to.
    pub fn current_node(&self) -> u32 {
        self.this_node
    }

    fn alert(&self, message: &str) {
        self.alerts.alert(message);
    }

    /// Mark `now` as the moment of the last connection and transmission.
    pub fn reset_watchdogs(&mut self, now: NaiveDateTime) {
        self.last_connection = now;
        self.last_transmission = now;
    }

    /// Synchronize the receiver clock. Blocks until global time has begun,
    /// then waits for the start of the next epoch so the answer lands
    /// exactly on an epoch boundary, then serves the `globTimeInput` prompt
    /// with the elapsed milliseconds. Gives up once the prompt stays away
    /// longer than the profile allows.
    pub fn sync_clock(&mut self) -> Result<(), FcError> {
        loop {
            match self.clock.epoch_at(Local::now().naive_local()) {
                Ok(_) => break,
                Err(_) => {
                    info!("global time starts only at {}", self.clock.start());
                    spin_sleep::sleep(Duration::from_millis(500));
                }
            }
        }
        let entry = self.clock.epoch_at(Local::now().naive_local())?;
        while self.clock.epoch_at(Local::now().naive_local())? <= entry {
            spin_sleep::sleep(Duration::from_millis(5));
        }
        let now = Local::now().naive_local();
        info!(
            "seconds passed since start of global time: {}",
            self.clock.ms_since_start(now)? / 1000
        );

        let deadline = Instant::now() + self.wait_for_serial;
        loop {
            if Instant::now() >= deadline {
                return Err(FcError::HandshakeTimeout);
            }
            let Some(line) = self.link.poll_line(POLL_SLICE)? else {
                continue;
            };
            debug!("{line}");
            if line.parse() == Ok(FirmwareEvent::Prompt(ParamPrompt::GlobTime)) {
                self.answer_glob_time()?;
                self.reset_watchdogs(Local::now().naive_local());
                return Ok(());
            }
        }
    }

    fn answer_glob_time(&mut self) -> Result<(), FcError> {
        let ms = self.clock.ms_since_start(Local::now().naive_local())?;
        self.link.send(&ms.to_string())?;
        // the firmware echoes the received value on the next line
        if let Some(echo) = self.link.poll_line(Duration::from_secs(1))? {
            info!("{echo}");
        }
        Ok(())
    }

    /// Fire due watchdogs. Both flush first so nothing received is lost to
    /// the reset; the transmission watchdog additionally advances the node
    /// cursor in case the firmware is stuck on the current node.
    pub fn check_watchdogs(&mut self, now: NaiveDateTime) -> Result<Option<RebootReason>, FcError> {
        if now - self.last_connection > self.reboot_after {
            self.alert("maximum time without connection has passed, rebooting receiver");
            self.flush()?;
            self.reset_watchdogs(now);
            return Ok(Some(RebootReason::NoConnection));
        }
        if now - self.last_transmission > self.reboot_after {
            self.alert("maximum time without transmission has passed, rebooting receiver");
            self.flush()?;
            self.this_node = self.this_node % self.node_count + 1;
            self.reset_watchdogs(now);
            return Ok(Some(RebootReason::NoTransmission));
        }
        Ok(None)
    }

    /// Persist and clear the buffer. Returns the number of epochs written.
    pub fn flush(&mut self) -> Result<usize, FcError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let records = self.buffer.drain();
        self.log.append(self.this_node, &records)?;
        Ok(records.len())
    }

    /// Wait up to `timeout` for a line and dispatch it.
    pub fn poll(&mut self, timeout: Duration) -> Result<Step, FcError> {
        match self.link.poll_line(timeout)? {
            None => Ok(Step::Idle),
            Some(line) => self.handle_line(&line, Local::now().naive_local()),
        }
    }

    /// Dispatch one line from the firmware.
    pub fn handle_line(&mut self, line: &str, now: NaiveDateTime) -> Result<Step, FcError> {
        let event = match line.parse::<FirmwareEvent>() {
            Ok(event) => event,
            Err(unknown) => {
                // plenty of benign chatter comes through here
                info!("{}", unknown.0);
                return Ok(Step::Unrecognized);
            }
        };
        match event {
            FirmwareEvent::Data(record) => {
                self.last_transmission = now;
                self.this_node = record.node;
                let (temp, humid) = record.statistics(self.params.precision_ts);
                let entry = EpochRecord {
                    epoch: record.epoch,
                    temp,
                    humid,
                };
                match self.buffer.insert(record.slot, entry) {
                    Ok(()) => Ok(Step::Recorded),
                    Err(e) => {
                        // the node mis-counted its window; reconnect to it
                        // after the reset
                        self.this_node = if self.this_node > 1 {
                            self.this_node - 1
                        } else {
                            self.node_count
                        };
                        self.alert(&format!("{e}, rebooting receiver"));
                        Ok(Step::NeedsReboot(RebootReason::SlotOverflow))
                    }
                }
            }
            FirmwareEvent::Disconnected => {
                if self.buffer.is_empty() {
                    Ok(Step::Noted)
                } else {
                    let written = self.flush()?;
                    Ok(Step::Flushed(written))
                }
            }
            FirmwareEvent::Connected => {
                self.last_connection = now;
                Ok(Step::Noted)
            }
            FirmwareEvent::Prompt(ParamPrompt::GlobTime) => {
                self.answer_glob_time()?;
                Ok(Step::ParamSet(ParamPrompt::GlobTime))
            }
            FirmwareEvent::Prompt(prompt) => {
                let value = self.value_for(prompt);
                self.link.send(&value)?;
                self.await_ack(prompt)?;
                Ok(Step::ParamSet(prompt))
            }
            FirmwareEvent::AllTriggered => {
                self.triggered += 1;
                info!("number of triggered nodes: {}", self.triggered);
                if self.triggered == self.node_count {
                    // from here on, reconnecting nodes resend history
                    self.params.recover_data = true;
                    info!("all nodes triggered, switching to recover-data mode");
                }
                Ok(Step::Noted)
            }
            FirmwareEvent::SoftRestart => {
                self.alert("receiver restarted softly");
                Ok(Step::Noted)
            }
            FirmwareEvent::Ack => {
                debug!("stray acknowledgement: {line}");
                Ok(Step::Noted)
            }
        }
    }

    /// The value a prompt is answered with.
    fn value_for(&self, prompt: ParamPrompt) -> String {
        match prompt {
            ParamPrompt::GlobTime => unreachable!("handled by answer_glob_time"),
            ParamPrompt::RecoverDataMode => u8::from(self.params.recover_data).to_string(),
            ParamPrompt::TsWindowLength => self.params.ts_window_length.to_string(),
            ParamPrompt::TsEpochBufferDuration => self.params.ts_epoch_buffer_ms.to_string(),
            ParamPrompt::PrecisionTs => self.params.precision_ts.to_string(),
            ParamPrompt::StartRecordingEpoch => self.params.start_recording_epoch.to_string(),
            ParamPrompt::SensorSamplingTimeInterval => {
                self.params.sensor_sampling_interval_ms.to_string()
            }
            ParamPrompt::WaitingTimeBeforeReconnect => {
                self.params.waiting_time_before_reconnect_ms.to_string()
            }
            ParamPrompt::WaitBeforeSkippingNode => {
                self.params.wait_before_skipping_node_ms.to_string()
            }
            ParamPrompt::DeathWarningAfterThisTime => self.params.death_warning_ms.to_string(),
            ParamPrompt::TransmitWindow => self.params.transmit_window_ms.to_string(),
            // resume where we left off before being turned off
            ParamPrompt::ConnectToNodeWithIndex => (self.this_node - 1).to_string(),
        }
    }

    /// Block until the firmware confirms the value it was just sent.
    /// Unrelated chatter in between is skipped.
    fn await_ack(&mut self, prompt: ParamPrompt) -> Result<(), FcError> {
        let deadline = Instant::now() + ACK_TIMEOUT;
        loop {
            if Instant::now() >= deadline {
                return Err(FcError::AckTimeout(prompt));
            }
            let Some(line) = self.link.poll_line(POLL_SLICE)? else {
                continue;
            };
            if matches!(line.parse(), Ok(FirmwareEvent::Ack)) {
                info!("{line}");
                return Ok(());
            }
            debug!("awaiting ack for {prompt:?}, skipping: {line}");
        }
    }
}

/// Run the fusion center against real hardware until interrupted: probe
/// both microcontrollers, perform the clock handshake, then serve the
/// firmware forever, recovering from port loss by rediscovery and reset
/// pulses.
pub fn run(profile: &ExperimentProfile) -> Result<(), FcError> {
    let mut rebooter = Rebooter::probe(&profile.rebooter_ports).ok_or(FcError::NoRebooter)?;
    // start from a known firmware state
    rebooter.pulse()?;

    let link = serial_link::probe(&profile.receiver_ports).ok_or(FcError::NoReceiver)?;
    info!("receiver port name is {}", link.path().display());

    let backup_key = Local::now().timestamp().to_string();
    let log = DataLog::new(
        profile.experiment_data_dir(),
        profile.experiment_backup_dir(),
        backup_key,
    );
    let alerts = crate::alerts::from_command(&profile.alert_command);
    let mut fc = FusionCenter::new(link, profile, log, alerts);

    info!("global time starts at {}", profile.start_time);
    while let Err(e) = fc.sync_clock() {
        match e {
            FcError::HandshakeTimeout | FcError::Link(_) => {
                warn!("clock handshake failed: {e}");
                rebooter.pulse()?;
                if let Some(link) = serial_link::probe(&profile.receiver_ports) {
                    fc.set_link(link);
                }
            }
            other => return Err(other),
        }
    }

    loop {
        let now = Local::now().naive_local();
        if fc.check_watchdogs(now)?.is_some() {
            rebooter.pulse()?;
            continue;
        }
        match fc.poll(POLL_SLICE) {
            Ok(Step::NeedsReboot(reason)) => {
                debug!("reboot requested: {reason:?}");
                rebooter.pulse()?;
            }
            Ok(_) => {}
            Err(FcError::Link(e)) => {
                warn!("connection to serial was lost ({e}), waiting for serial");
                recover(&mut fc, profile, &mut rebooter)?;
            }
            Err(e @ FcError::AckTimeout(_)) => {
                warn!("{e}");
                fc.flush()?;
                rebooter.pulse()?;
                recover(&mut fc, profile, &mut rebooter)?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sweep the candidate ports until the receiver answers and the clock
/// handshake succeeds again.
fn recover(
    fc: &mut FusionCenter<SerialLink>,
    profile: &ExperimentProfile,
    rebooter: &mut Rebooter,
) -> Result<(), FcError> {
    loop {
        for candidate in &profile.receiver_ports {
            let Ok(link) = SerialLink::open(candidate) else {
                continue;
            };
            info!("serial found at {}", candidate.display());
            fc.set_link(link);
            match fc.sync_clock() {
                Ok(()) => {
                    info!("time successfully passed to receiver");
                    return Ok(());
                }
                Err(FcError::HandshakeTimeout) | Err(FcError::Link(_)) => {
                    fc.alert("rebooted receiver, serial failed to init");
                    rebooter.pulse()?;
                }
                Err(e) => return Err(e),
            }
        }
        spin_sleep::sleep(REDISCOVERY_PAUSE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::RecordingAlert;
    use crate::config::tests::test_profile;
    use crate::data_log::load_node;
    use crate::scripted_link::ScriptedLink;
    use chrono::Duration as TimeDelta;
    use tempfile::TempDir;

    /// A profile with 20 ms epochs and a 5-slot buffer, rooted in `dir`.
    fn bench_profile(dir: &TempDir) -> ExperimentProfile {
        let mut p = test_profile();
        p.ts_window_length = 1;
        p.sensor_sampling_interval_ms = 10;
        p.ts_epoch_buffer_ms = 10;
        p.transmit_window_ms = 100;
        p.data_dir = dir.path().join("csv");
        p.backup_dir = dir.path().join("backup");
        p
    }

    fn bench_fc(
        profile: &ExperimentProfile,
        link: ScriptedLink,
    ) -> (FusionCenter<ScriptedLink>, RecordingAlert) {
        let alerts = RecordingAlert::default();
        let log = DataLog::new(
            profile.experiment_data_dir(),
            profile.experiment_backup_dir(),
            "testkey",
        );
        let fc = FusionCenter::new(link, profile, log, Box::new(alerts.clone()));
        (fc, alerts)
    }

    fn t0() -> NaiveDateTime {
        Local::now().naive_local()
    }

    #[test]
    fn prompts_are_answered_and_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let mut link = ScriptedLink::new();
        link.push_lines([
            "tsWindowLength set to 1",
            "startRecordingEpoch set to 5",
            "connectToNodeWithIndex set to 1",
        ]);
        let (mut fc, _) = bench_fc(&profile, link);

        let step = fc.handle_line("Enter tsWindowLength", t0()).unwrap();
        assert_eq!(step, Step::ParamSet(ParamPrompt::TsWindowLength));
        let step = fc.handle_line("Enter startRecordingEpoch", t0()).unwrap();
        assert_eq!(step, Step::ParamSet(ParamPrompt::StartRecordingEpoch));
        let step = fc
            .handle_line("Enter connectToNodeWithIndex", t0())
            .unwrap();
        assert_eq!(step, Step::ParamSet(ParamPrompt::ConnectToNodeWithIndex));

        // window length, start epoch, then the resume index (nodes - 1)
        assert_eq!(fc.link.sent, vec!["1", "5", "1"]);
    }

    #[test]
    fn data_is_buffered_and_flushed_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, _) = bench_fc(&profile, ScriptedLink::new());

        let step = fc
            .handle_line("Node1,23123456789,45123456789,100,0", t0())
            .unwrap();
        assert_eq!(step, Step::Recorded);
        let step = fc
            .handle_line("Node1,23223456789,45223456789,101,1", t0())
            .unwrap();
        assert_eq!(step, Step::Recorded);
        assert_eq!(fc.current_node(), 1);

        let step = fc.handle_line("Peripheral disconnected", t0()).unwrap();
        assert_eq!(step, Step::Flushed(2));
        assert!(fc.buffer.is_empty());

        let series = load_node(&fc.log.node_path(1)).unwrap();
        assert_eq!(series.len(), 2);
        assert!((series[&100].temp - 23.1234567).abs() < 1e-9);
        assert!((series[&101].humid - 45.2234567).abs() < 1e-9);
    }

    #[test]
    fn disconnect_with_empty_buffer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, _) = bench_fc(&profile, ScriptedLink::new());

        let step = fc.handle_line("Peripheral disconnected", t0()).unwrap();
        assert_eq!(step, Step::Noted);
        assert!(!fc.log.node_path(1).exists());
    }

    #[test]
    fn slot_overflow_steps_back_and_requests_reboot() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        assert_eq!(profile.buffer_capacity(), 5);
        let (mut fc, alerts) = bench_fc(&profile, ScriptedLink::new());

        let step = fc
            .handle_line("Node2,23123456789,45123456789,100,17", t0())
            .unwrap();
        assert_eq!(step, Step::NeedsReboot(RebootReason::SlotOverflow));
        // heard from node 2, stepped back to node 1 for the reconnect
        assert_eq!(fc.current_node(), 1);
        assert_eq!(alerts.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn connection_watchdog_fires_first() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, alerts) = bench_fc(&profile, ScriptedLink::new());

        let base = t0();
        fc.reset_watchdogs(base);
        assert_eq!(
            fc.check_watchdogs(base + TimeDelta::seconds(299)).unwrap(),
            None
        );
        assert_eq!(
            fc.check_watchdogs(base + TimeDelta::seconds(301)).unwrap(),
            Some(RebootReason::NoConnection)
        );
        assert_eq!(alerts.0.lock().unwrap().len(), 1);
        // the watchdog rearmed itself
        assert_eq!(
            fc.check_watchdogs(base + TimeDelta::seconds(302)).unwrap(),
            None
        );
    }

    #[test]
    fn transmission_watchdog_advances_the_node_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, _) = bench_fc(&profile, ScriptedLink::new());

        let base = t0();
        fc.reset_watchdogs(base);
        // a connection keeps the connection watchdog quiet...
        fc.handle_line(
            "de:ad - found all characteristics",
            base + TimeDelta::seconds(200),
        )
        .unwrap();
        // ...but nothing was transmitted for too long
        assert_eq!(
            fc.check_watchdogs(base + TimeDelta::seconds(301)).unwrap(),
            Some(RebootReason::NoTransmission)
        );
        // started at node 2 (= node count), advanced to 1
        assert_eq!(fc.current_node(), 1);
    }

    #[test]
    fn watchdog_flushes_before_the_reset() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, _) = bench_fc(&profile, ScriptedLink::new());

        let base = t0();
        fc.reset_watchdogs(base);
        fc.handle_line("Node1,23123456789,45123456789,100,0", base)
            .unwrap();
        fc.check_watchdogs(base + TimeDelta::seconds(301)).unwrap();

        let series = load_node(&fc.log.node_path(1)).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn trigger_count_switches_to_recover_mode() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, _) = bench_fc(&profile, ScriptedLink::new());
        fc.params.recover_data = false;

        fc.handle_line("All have been triggered", t0()).unwrap();
        assert!(!fc.params.recover_data);
        fc.handle_line("All have been triggered", t0()).unwrap();
        assert!(fc.params.recover_data);
    }

    #[test]
    fn unknown_chatter_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let (mut fc, _) = bench_fc(&profile, ScriptedLink::new());
        let step = fc.handle_line("Scanning for peripherals...", t0()).unwrap();
        assert_eq!(step, Step::Unrecognized);
    }

    #[test]
    fn clock_handshake_sends_elapsed_milliseconds() {
        let dir = tempfile::tempdir().unwrap();
        let profile = bench_profile(&dir);
        let mut link = ScriptedLink::new();
        link.push_lines(["Enter globTimeInput", "globTimeInput set to 1234"]);
        let (mut fc, _) = bench_fc(&profile, link);

        fc.sync_clock().unwrap();
        assert_eq!(fc.link.sent.len(), 1);
        let ms: i64 = fc.link.sent[0].parse().unwrap();
        assert!(ms > 0);
    }
}
