//! Serial transport for the two fusion-center microcontrollers: the
//! receiver that talks to the nodes, and the rebooter whose only job is to
//! pulse the receiver's reset pin when the host asks it to.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serial2::SerialPort;

use crate::link::{Link, LinkError};

/// Baud rate both microcontrollers are flashed with.
pub const BAUD_RATE: u32 = 9600;

/// Upper bound on one blocking read while assembling a line, so a
/// `poll_line` deadline is honored with some granularity.
const READ_SLICE: Duration = Duration::from_millis(100);

/// A line-assembling wrapper around one serial port.
pub struct SerialLink {
    port: SerialPort,
    path: PathBuf,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Open the device at `path` with the network's fixed baud rate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let port = SerialPort::open(path.as_ref(), BAUD_RATE)?;
        Ok(SerialLink {
            port,
            path: path.as_ref().to_owned(),
            pending: Vec::new(),
        })
    }

    /// The device path this link was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pop the next complete line off the pending buffer, if any. Lines
    /// that do not decode as UTF-8 are dropped with a warning; that happens
    /// routinely right after a reset while the device buffer still holds
    /// garbage.
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            match std::str::from_utf8(&raw) {
                Ok(s) => return Some(s.trim().to_owned()),
                Err(e) => warn!("dropping undecodable serial line: {e}"),
            }
        }
        None
    }
}

impl Link for SerialLink {
    fn poll_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.port.set_read_timeout(remaining.min(READ_SLICE))?;
            let mut chunk = [0u8; 256];
            match self.port.read(&mut chunk) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
    }

    fn send(&mut self, payload: &str) -> Result<(), LinkError> {
        debug!("serial send: {payload}");
        self.port.write_all(payload.as_bytes())?;
        Ok(())
    }
}

/// Walk a candidate list of device paths and open the first one that
/// answers. Port names drift after a microcontroller reboot (the appended
/// number changes, notably on Linux), hence the list.
pub fn probe(candidates: &[PathBuf]) -> Option<SerialLink> {
    for path in candidates {
        match SerialLink::open(path) {
            Ok(link) => {
                info!("serial port found at {}", path.display());
                return Some(link);
            }
            Err(e) => debug!("no device at {}: {e}", path.display()),
        }
    }
    None
}

/// The secondary microcontroller wired to the receiver's reset pin.
pub struct Rebooter {
    port: SerialPort,
}

/// Settle time before asking for a reset pulse.
const PRE_PULSE: Duration = Duration::from_secs(2);
/// Wait after the trigger byte. The pin takes a moment to fire; returning
/// earlier loses the pulse.
const POST_PULSE: Duration = Duration::from_secs(5);

impl Rebooter {
    /// Open the rebooter on the first answering candidate path.
    pub fn probe(candidates: &[PathBuf]) -> Option<Self> {
        for path in candidates {
            match SerialPort::open(path, BAUD_RATE) {
                Ok(port) => {
                    info!("rebooter found at {}", path.display());
                    return Some(Rebooter { port });
                }
                Err(e) => debug!("no rebooter at {}: {e}", path.display()),
            }
        }
        None
    }

    /// Hard-reset the receiver by triggering its reset pin.
    pub fn pulse(&mut self) -> Result<(), LinkError> {
        info!("pulsing receiver reset pin");
        spin_sleep::sleep(PRE_PULSE);
        self.port.write_all(b"1")?;
        spin_sleep::sleep(POST_PULSE);
        Ok(())
    }
}
