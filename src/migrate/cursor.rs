//! Forward-only cursor over an owned byte buffer

/// An immutable backing buffer plus a read offset
///
/// All advances are clamped to the buffer length, so the remaining slice
/// can never have a negative length.
#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    data: Vec<u8>,
    offset: usize,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Consume `n` bytes, or everything left if fewer remain
    pub fn advance(&mut self, n: usize) {
        self.offset = self.offset.saturating_add(n).min(self.data.len());
    }

    /// Skip past the first `\r` or `\n` in the remaining bytes
    ///
    /// Returns `false` and leaves the cursor untouched when there is no
    /// line boundary left.
    pub fn skip_line(&mut self) -> bool {
        match self
            .remaining()
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
        {
            Some(pos) => {
                self.advance(pos + 1);
                true
            }
            None => false,
        }
    }

    /// Lossy preview of up to `max` remaining bytes, for log output
    pub fn preview(&self, max: usize) -> String {
        let rest = self.remaining();
        String::from_utf8_lossy(&rest[..rest.len().min(max)]).into_owned()
    }
}
