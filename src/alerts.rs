//! Operator alerts for the unattended fusion center. Reboots and index
//! errors in the middle of the night should reach somebody; what "reach"
//! means is deployment-specific, so the profile may name an external
//! command and everything else goes through the log.

use std::process::Command;

use log::{error, warn};

/// Where watchdog and recovery messages go.
pub trait AlertSink {
    fn alert(&self, message: &str);
}

/// Fallback sink: the message only lands in the log.
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn alert(&self, message: &str) {
        warn!("ALERT: {message}");
    }
}

/// Runs the profile's alert command with the message as its single
/// argument. A failing command must never take down the ingestion loop, so
/// failures are logged and swallowed.
pub struct CommandAlert {
    command: String,
}

impl CommandAlert {
    pub fn new(command: impl Into<String>) -> Self {
        CommandAlert {
            command: command.into(),
        }
    }
}

impl AlertSink for CommandAlert {
    fn alert(&self, message: &str) {
        warn!("ALERT: {message}");
        if let Err(e) = Command::new(&self.command).arg(message).spawn() {
            error!("alert command {:?} failed to start: {e}", self.command);
        }
    }
}

/// The sink configured by a profile's `alert_command`.
pub fn from_command(command: &Option<String>) -> Box<dyn AlertSink + Send> {
    match command {
        Some(cmd) => Box::new(CommandAlert::new(cmd.clone())),
        None => Box::new(LogAlert),
    }
}

/// Sink that records messages, for asserting on alert paths in tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingAlert(pub std::sync::Arc<std::sync::Mutex<Vec<String>>>);

#[cfg(test)]
impl AlertSink for RecordingAlert {
    fn alert(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_owned());
    }
}
