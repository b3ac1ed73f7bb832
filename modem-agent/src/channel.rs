//! Byte-channel seams between the protocol engine and its transport.
//!
//! The engine never touches a serial port directly. The binary wraps a
//! `serialport` handle in these traits; tests drive the engine with the
//! in-memory implementations below.

use std::collections::VecDeque;
use std::io;

/// Source of modem output bytes.
///
/// Non-blocking: `read` returns `Ok(0)` when no data is currently
/// available, and is called repeatedly until it does.
pub trait ResponseChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Sink for AT commands.
///
/// Fire-and-forget: there is no acknowledgment other than the subsequent
/// line stream on the response channel.
pub trait CommandChannel {
    fn send(&mut self, command: &str) -> io::Result<()>;
}

/// In-memory response channel, handy for tests and simulation.
impl ResponseChannel for VecDeque<u8> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

/// In-memory command channel recording everything sent.
impl CommandChannel for Vec<String> {
    fn send(&mut self, command: &str) -> io::Result<()> {
        self.push(command.to_owned());
        Ok(())
    }
}
