//! An in-memory [`Link`] that replays a scripted conversation, so the
//! fusion-center state machine can be exercised without hardware.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::Duration;

use crate::link::{Link, LinkError};

/// A link that pops scripted lines and records everything sent to it.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    incoming: VecDeque<String>,
    /// Everything the state machine wrote, in order.
    pub sent: Vec<String>,
    /// When set, the link dies after this many more polls.
    fail_after: Option<usize>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line for the state machine to read.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.incoming.push_back(line.into());
    }

    /// Queue several lines at once.
    pub fn push_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push_line(line);
        }
    }

    /// Make the link fail with an io error after `polls` further polls,
    /// simulating a USB disconnect.
    pub fn fail_after(&mut self, polls: usize) {
        self.fail_after = Some(polls);
    }
}

impl Link for ScriptedLink {
    fn poll_line(&mut self, _timeout: Duration) -> Result<Option<String>, LinkError> {
        if let Some(left) = self.fail_after.as_mut() {
            if *left == 0 {
                return Err(LinkError::Io(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "scripted disconnect",
                )));
            }
            *left -= 1;
        }
        Ok(self.incoming.pop_front())
    }

    fn send(&mut self, payload: &str) -> Result<(), LinkError> {
        self.sent.push(payload.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_in_order_and_records_sends() {
        let mut link = ScriptedLink::new();
        link.push_lines(["one", "two"]);
        link.send("hello").unwrap();
        assert_eq!(
            link.poll_line(Duration::ZERO).unwrap(),
            Some("one".to_owned())
        );
        assert_eq!(
            link.poll_line(Duration::ZERO).unwrap(),
            Some("two".to_owned())
        );
        assert_eq!(link.poll_line(Duration::ZERO).unwrap(), None);
        assert_eq!(link.sent, vec!["hello".to_owned()]);
    }

    #[test]
    fn scripted_disconnect() {
        let mut link = ScriptedLink::new();
        link.push_line("one");
        link.fail_after(1);
        assert!(link.poll_line(Duration::ZERO).is_ok());
        assert!(link.poll_line(Duration::ZERO).is_err());
    }
}
