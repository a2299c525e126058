//! Output buffer with literal and pattern search.
//!
//! Accumulates raw bytes read from a transport. `read_until` style callers
//! search for a literal token (memchr) or a regex pattern, then drain the
//! buffer through the end of the match. Bytes after the match stay buffered,
//! so a logical response fragmented across several reads survives until a
//! later search picks it up.

use memchr::memmem;
use regex::bytes::Regex;

/// Buffer for accumulating session output.
///
/// Owned exclusively by one session at a time; there are no concurrent
/// writers, so no locking.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buffer: Vec<u8>,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Append raw bytes from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Find a literal token, returning the byte offset just past it.
    pub fn find_literal(&self, token: &[u8]) -> Option<usize> {
        memmem::find(&self.buffer, token).map(|start| start + token.len())
    }

    /// Find a regex pattern, returning the byte offset just past the match.
    pub fn find_pattern(&self, pattern: &Regex) -> Option<usize> {
        pattern.find(&self.buffer).map(|m| m.end())
    }

    /// Remove and return everything up to `end`, leaving the rest buffered.
    ///
    /// `end` must come from a prior `find_*` call on the same buffer state.
    pub fn drain_through(&mut self, end: usize) -> String {
        let rest = self.buffer.split_off(end);
        let consumed = std::mem::replace(&mut self.buffer, rest);
        String::from_utf8_lossy(&consumed).into_owned()
    }

    /// Take the whole buffer contents and reset.
    pub fn take(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }

    /// Current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
