//! Parser for the lines the fusion-center firmware writes on the serial
//! bus. The firmware drives the exchange: it prints a prompt whenever it
//! wants a parameter, an acknowledgement once the parameter is set, a data
//! record for every received test statistic, and a handful of status lines
//! around BLE connections. The host only ever reacts.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{i64, u32, u64},
    combinator::{map, value},
    sequence::{preceded, tuple},
    Finish, IResult,
};

use std::fmt::Display;
use std::str::FromStr;

/// One raw test-statistic record,
/// `Node<idx>,<raw_temp>,<raw_humid>,<epoch>,<slot>`.
///
/// The two statistics arrive as fixed-point integers. The last two decimal
/// digits of the raw temperature are a transmission suffix that the firmware
/// appends to both values; [`DataRecord::statistics`] strips it before
/// scaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub node: u32,
    pub raw_temp: i64,
    pub raw_humid: i64,
    pub epoch: i64,
    pub slot: usize,
}

impl DataRecord {
    /// The decoded `(temp, humid)` statistics at the given fixed-point
    /// precision.
    pub fn statistics(&self, precision: u32) -> (f64, f64) {
        let suffix = self.raw_temp.rem_euclid(100);
        let scale = 10f64.powi(precision as i32);
        (
            (self.raw_temp - suffix) as f64 / scale,
            (self.raw_humid - suffix) as f64 / scale,
        )
    }
}

/// The parameter prompts the firmware can raise. Every prompt is answered
/// with one value and acknowledged with a line containing `set to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPrompt {
    GlobTime,
    RecoverDataMode,
    TsWindowLength,
    TsEpochBufferDuration,
    PrecisionTs,
    StartRecordingEpoch,
    SensorSamplingTimeInterval,
    WaitingTimeBeforeReconnect,
    WaitBeforeSkippingNode,
    DeathWarningAfterThisTime,
    TransmitWindow,
    ConnectToNodeWithIndex,
}

/// Any line from the firmware the host reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareEvent {
    /// A test-statistic record. By far the most frequent line, so it is
    /// tried first.
    Data(DataRecord),
    /// A parameter prompt awaiting a value.
    Prompt(ParamPrompt),
    /// An acknowledgement that a parameter was set.
    Ack,
    /// The receiver found all BLE characteristics of a node.
    Connected,
    /// The peripheral disconnected; the transfer for this node is over.
    Disconnected,
    /// The receiver performed a soft reset on its own.
    SoftRestart,
    /// A node reported that its whole cohort has been triggered.
    AllTriggered,
}

/// Returned when a line matches none of the known firmware outputs. Most
/// such lines are informational chatter and are simply logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLine(pub String);

impl Display for UnknownLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized firmware line: {:?}", self.0)
    }
}

impl std::error::Error for UnknownLine {}

fn parse_data_record(s: &str) -> IResult<&str, DataRecord> {
    map(
        tuple((
            preceded(tag("Node"), u32),
            preceded(tag(","), i64),
            preceded(tag(","), i64),
            preceded(tag(","), i64),
            preceded(tag(","), u64),
        )),
        |(node, raw_temp, raw_humid, epoch, slot)| DataRecord {
            node,
            raw_temp,
            raw_humid,
            epoch,
            slot: slot as usize,
        },
    )(s)
}

fn parse_prompt(s: &str) -> IResult<&str, ParamPrompt> {
    preceded(
        tag("Enter "),
        alt((
            value(ParamPrompt::GlobTime, tag("globTimeInput")),
            value(ParamPrompt::RecoverDataMode, tag("recoverDataMode")),
            value(ParamPrompt::TsWindowLength, tag("tsWindowLength")),
            value(
                ParamPrompt::TsEpochBufferDuration,
                tag("tsEpochBufferDuration"),
            ),
            value(ParamPrompt::PrecisionTs, tag("precisionTS")),
            value(ParamPrompt::StartRecordingEpoch, tag("startRecordingEpoch")),
            value(
                ParamPrompt::SensorSamplingTimeInterval,
                tag("sensorSamplingTimeInterval"),
            ),
            // longer prefix first, otherwise waitingTimeBeforeReconnect
            // would shadow it
            value(
                ParamPrompt::WaitBeforeSkippingNode,
                tag("waitThisTimeBeforeSkippingNodeConnection"),
            ),
            value(
                ParamPrompt::WaitingTimeBeforeReconnect,
                tag("waitingTimeBeforeReconnect"),
            ),
            value(
                ParamPrompt::DeathWarningAfterThisTime,
                tag("deathWarningAfterThisTime"),
            ),
            value(
                ParamPrompt::TransmitWindow,
                tag("transmitDataRecordedDuringThisTimeWindow"),
            ),
            value(
                ParamPrompt::ConnectToNodeWithIndex,
                tag("connectToNodeWithIndex"),
            ),
        )),
    )(s)
}

impl FromStr for FirmwareEvent {
    type Err = UnknownLine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Data records must consume the whole line; a trailing fragment
        // means a corrupted transmission, which we refuse to ingest.
        if let Ok((rest, record)) = parse_data_record(s).finish() {
            if rest.is_empty() {
                return Ok(FirmwareEvent::Data(record));
            }
        }
        if let Ok((_, prompt)) = parse_prompt(s).finish() {
            return Ok(FirmwareEvent::Prompt(prompt));
        }
        if s.starts_with("Peripheral disconnected") {
            return Ok(FirmwareEvent::Disconnected);
        }
        if s.starts_with("Restarted softly!") {
            return Ok(FirmwareEvent::SoftRestart);
        }
        if s.starts_with("All have been triggered") {
            return Ok(FirmwareEvent::AllTriggered);
        }
        // These two may be prefixed with BLE addresses, so match anywhere.
        if s.contains("found all characteristics") {
            return Ok(FirmwareEvent::Connected);
        }
        if s.contains("set to") {
            return Ok(FirmwareEvent::Ack);
        }
        Err(UnknownLine(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_record() {
        let event = "Node12,23123456789,45123456789,4711,17"
            .parse::<FirmwareEvent>()
            .unwrap();
        assert_eq!(
            event,
            FirmwareEvent::Data(DataRecord {
                node: 12,
                raw_temp: 23_123_456_789,
                raw_humid: 45_123_456_789,
                epoch: 4711,
                slot: 17,
            })
        );
    }

    #[test]
    fn data_record_with_trailing_garbage_is_rejected() {
        assert!("Node12,23,45,4711,17,99".parse::<FirmwareEvent>().is_err());
        assert!("Node12,23,45,4711".parse::<FirmwareEvent>().is_err());
    }

    #[test]
    fn statistics_strip_the_shared_suffix() {
        let record = DataRecord {
            node: 1,
            raw_temp: 23_123_456_789,
            raw_humid: 45_123_456_789,
            epoch: 0,
            slot: 0,
        };
        let (temp, humid) = record.statistics(9);
        assert!((temp - 23.1234567).abs() < 1e-12);
        assert!((humid - 45.1234567).abs() < 1e-12);
    }

    #[test]
    fn prompts() {
        let cases = [
            ("Enter globTimeInput", ParamPrompt::GlobTime),
            ("Enter recoverDataMode", ParamPrompt::RecoverDataMode),
            ("Enter tsWindowLength", ParamPrompt::TsWindowLength),
            (
                "Enter tsEpochBufferDuration",
                ParamPrompt::TsEpochBufferDuration,
            ),
            ("Enter precisionTS", ParamPrompt::PrecisionTs),
            ("Enter startRecordingEpoch", ParamPrompt::StartRecordingEpoch),
            (
                "Enter sensorSamplingTimeInterval",
                ParamPrompt::SensorSamplingTimeInterval,
            ),
            (
                "Enter waitingTimeBeforeReconnect",
                ParamPrompt::WaitingTimeBeforeReconnect,
            ),
            (
                "Enter waitThisTimeBeforeSkippingNodeConnection",
                ParamPrompt::WaitBeforeSkippingNode,
            ),
            (
                "Enter deathWarningAfterThisTime",
                ParamPrompt::DeathWarningAfterThisTime,
            ),
            (
                "Enter transmitDataRecordedDuringThisTimeWindow",
                ParamPrompt::TransmitWindow,
            ),
            (
                "Enter connectToNodeWithIndex",
                ParamPrompt::ConnectToNodeWithIndex,
            ),
        ];
        for (line, prompt) in cases {
            assert_eq!(
                line.parse::<FirmwareEvent>().unwrap(),
                FirmwareEvent::Prompt(prompt),
                "line {line:?}"
            );
        }
    }

    #[test]
    fn status_lines() {
        assert_eq!(
            "Peripheral disconnected".parse::<FirmwareEvent>().unwrap(),
            FirmwareEvent::Disconnected
        );
        assert_eq!(
            "Restarted softly!".parse::<FirmwareEvent>().unwrap(),
            FirmwareEvent::SoftRestart
        );
        assert_eq!(
            "All have been triggered".parse::<FirmwareEvent>().unwrap(),
            FirmwareEvent::AllTriggered
        );
        assert_eq!(
            "de:ad:be:ef - found all characteristics"
                .parse::<FirmwareEvent>()
                .unwrap(),
            FirmwareEvent::Connected
        );
        assert_eq!(
            "tsWindowLength set to 10".parse::<FirmwareEvent>().unwrap(),
            FirmwareEvent::Ack
        );
    }

    #[test]
    fn chatter_is_unknown() {
        let err = "Scanning for peripherals...".parse::<FirmwareEvent>();
        assert_eq!(
            err,
            Err(UnknownLine("Scanning for peripherals...".to_owned()))
        );
    }
}
