//! Buffer management for device output

mod ansi;

pub use ansi::AnsiStripper;

use bytes::BytesMut;

/// When the buffer is full, discard the oldest 1/3 of capacity.
const DISCARD_RATIO: usize = 3;

/// Accumulates device output between command exchanges.
///
/// Everything before `consumed` has already been returned to a caller; each
/// new command result is built from the unconsumed tail only.
pub struct BufferManager {
    buffer: BytesMut,
    consumed: usize,
    max_size: usize,
    stripper: Option<AnsiStripper>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(max_size: usize, strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_size),
            consumed: 0,
            max_size,
            stripper: strip_ansi.then(AnsiStripper::default),
        }
    }

    /// Append data read from the channel
    pub fn append(&mut self, data: &[u8]) {
        let data = match self.stripper.as_mut() {
            Some(stripper) => stripper.feed(data),
            None => data.to_vec(),
        };

        if self.buffer.len() + data.len() > self.max_size {
            self.compact();
        }

        self.buffer.extend_from_slice(&data);
    }

    /// Bytes not yet returned to a caller
    pub fn unconsumed(&self) -> &[u8] {
        &self.buffer[self.consumed..]
    }

    /// Position where the unconsumed tail starts
    pub fn consumed_position(&self) -> usize {
        self.consumed
    }

    /// Unconsumed text up to `end` (absolute), then mark through `mark_to` consumed
    pub fn take_until(&mut self, end: usize, mark_to: usize) -> String {
        let end = end.clamp(self.consumed, self.buffer.len());
        let text = String::from_utf8_lossy(&self.buffer[self.consumed..end]).into_owned();
        self.consumed = mark_to.clamp(self.consumed, self.buffer.len());
        text
    }

    /// Take the entire unconsumed tail
    pub fn take_all(&mut self) -> String {
        let len = self.buffer.len();
        self.take_until(len, len)
    }

    /// Text slice `[start, end)` (absolute positions)
    pub fn slice_text(&self, start: usize, end: usize) -> String {
        let end = end.min(self.buffer.len());
        String::from_utf8_lossy(&self.buffer[start.min(end)..end]).into_owned()
    }

    /// Current buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop already-consumed output first, then the oldest third if that is
    /// still not enough room.
    fn compact(&mut self) {
        let discard = if self.consumed > 0 {
            self.consumed
        } else {
            self.max_size / DISCARD_RATIO
        };

        if discard >= self.buffer.len() {
            self.buffer.clear();
            self.consumed = 0;
            return;
        }

        let _ = self.buffer.split_to(discard);
        self.consumed = self.consumed.saturating_sub(discard);
    }
}
