//! Splits the raw modem byte stream into discrete lines.
//!
//! The modem interleaves command responses and unsolicited result codes on
//! one serial channel, terminated by CR, LF or CRLF, and delivers them in
//! arbitrarily sized chunks. The reader accumulates chunks in a bounded
//! buffer and hands complete lines to the caller, keeping any trailing
//! partial line for the next round.

use std::io;
use std::str;

use tracing::warn;

use crate::channel::ResponseChannel;

/// Outcome of a [`LineReader::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// The source reported no more data for now.
    Drained,
    /// The buffer filled up before the source ran dry; consume lines and
    /// fill again.
    MoreToRead,
}

pub struct LineReader {
    buf: Vec<u8>,
    capacity: usize,
    /// Set after an over-long line was discarded; the rest of the current
    /// input burst belongs to that line and is dropped as well.
    dropping: bool,
}

impl LineReader {
    /// The capacity is fixed for the lifetime of the reader; no further
    /// allocation happens after construction.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            dropping: false,
        }
    }

    /// Pulls as many bytes as are currently available from `channel`,
    /// stopping when the source runs dry or the buffer is full.
    pub fn fill(&mut self, channel: &mut dyn ResponseChannel) -> io::Result<Fill> {
        if self.dropping {
            // Discard the tail of the over-long line until the burst ends.
            let mut scratch = [0u8; 64];
            loop {
                if channel.read(&mut scratch)? == 0 {
                    self.dropping = false;
                    return Ok(Fill::Drained);
                }
            }
        }
        while self.buf.len() < self.capacity {
            let old = self.buf.len();
            self.buf.resize(self.capacity, 0);
            let n = channel.read(&mut self.buf[old..]);
            match n {
                Ok(n) => {
                    self.buf.truncate(old + n);
                    if n == 0 {
                        return Ok(Fill::Drained);
                    }
                }
                Err(e) => {
                    self.buf.truncate(old);
                    return Err(e);
                }
            }
        }
        Ok(Fill::MoreToRead)
    }

    /// Invokes `f` once per complete line accumulated so far, excluding the
    /// terminator. Empty lines (and the LF half of a CRLF) are skipped. If
    /// the buffer is full without containing a terminator, its content is
    /// discarded and the reader resynchronizes on later input.
    pub fn consume_lines(&mut self, mut f: impl FnMut(&str)) {
        let mut start = 0;
        while let Some(pos) = self.buf[start..]
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
        {
            let line = &self.buf[start..start + pos];
            if !line.is_empty() {
                match str::from_utf8(line) {
                    Ok(s) => f(s),
                    Err(_) => warn!(?line, "discarding non-UTF-8 modem line"),
                }
            }
            start += pos + 1;
        }
        self.buf.drain(..start);
        if self.buf.len() == self.capacity {
            warn!(len = self.buf.len(), "modem line too long, discarding");
            self.buf.clear();
            self.dropping = true;
        }
    }
}
