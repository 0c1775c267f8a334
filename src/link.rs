//! The seam between the fusion-center state machine and whatever carries
//! its bytes. The real implementation sits on a serial port; tests drive
//! the state machine through a scripted in-memory link.

use std::error::Error;
use std::fmt::Display;
use std::time::Duration;

/// Errors a link can produce.
#[derive(Debug)]
pub enum LinkError {
    /// The underlying transport failed; the port is gone until rediscovered.
    Io(std::io::Error),
    /// The transport reported end-of-stream, which for a serial device means
    /// the USB connection died.
    Closed,
}

impl Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Io(e) => write!(f, "link io error: {e}"),
            LinkError::Closed => write!(f, "link closed"),
        }
    }
}

impl Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// A line-oriented, pollable connection to the receiver microcontroller.
pub trait Link {
    /// Wait up to `timeout` for one complete line. `Ok(None)` means nothing
    /// arrived in time; an `Err` means the link is dead and must be
    /// rediscovered.
    fn poll_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError>;

    /// Send raw text to the device.
    fn send(&mut self, payload: &str) -> Result<(), LinkError>;
}
