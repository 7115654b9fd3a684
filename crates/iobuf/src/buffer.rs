//! A growable byte buffer carrying data in a single direction, plus the
//! eof/error latches every transport layer consults.

use std::fmt;

/// Terminal state of a [`DirectedBuffer`]: either still flowing, cleanly
/// ended, or broken.
#[derive(Clone, Debug)]
pub enum BufferError {
    /// The peer closed its end after delivering `bytes` bytes total.
    Eof,
    /// A lower layer hit something it cannot recover from.
    Fatal(String),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Eof => write!(f, "end of file"),
            BufferError::Fatal(message) => write!(f, "{message}"),
        }
    }
}

/// A byte buffer that only ever flows one way: bytes are appended at the
/// tail (`put`/`get_space` + `got`) and consumed from the head (`get` +
/// `skip`). Every transport layer in this crate is built around one of
/// these: it drains its input buffer and feeds its output buffer.
#[derive(Debug, Default)]
pub struct DirectedBuffer {
    data: Vec<u8>,
    pos: usize,
    reserved_at: usize,
    eof: bool,
    error: Option<BufferError>,
}

impl DirectedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the buffer.
    pub fn put(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reserves at least `size` bytes of spare capacity at the tail and
    /// returns a mutable view over it; call [`Self::got`] afterward with
    /// however many bytes were actually written.
    pub fn get_space(&mut self, size: usize) -> &mut [u8] {
        self.reserved_at = self.data.len();
        self.data.resize(self.reserved_at + size, 0);
        &mut self.data[self.reserved_at..]
    }

    /// Confirms that `n` bytes of the space from the last [`Self::get_space`]
    /// call were actually filled in, trimming the rest back off.
    pub fn got(&mut self, n: usize) {
        self.data.truncate(self.reserved_at + n);
    }

    /// The readable bytes currently buffered.
    #[must_use]
    pub fn get(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Drops the first `n` readable bytes. Compacts the backing vector
    /// once it has drained enough to be worth the memmove.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
        if self.pos > 0 && self.pos == self.data.len() {
            self.data.clear();
            self.pos = 0;
        } else if self.pos > 4096 {
            self.data.drain(0..self.pos);
            self.pos = 0;
        }
    }

    /// Bytes currently readable.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the stream as cleanly ended; no more bytes will ever arrive.
    pub fn set_eof(&mut self) {
        self.eof = true;
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Latches a fatal error. Once set, it is returned by [`Self::error`]
    /// until [`Self::clear_error`] is called (e.g. on session retry).
    pub fn set_error(&mut self, error: BufferError) {
        self.error = Some(error);
    }

    #[must_use]
    pub fn error(&self) -> Option<&BufferError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_same_bytes() {
        let mut buffer = DirectedBuffer::new();
        buffer.put(b"hello");
        assert_eq!(buffer.get(), b"hello");
    }

    #[test]
    fn skip_advances_read_position() {
        let mut buffer = DirectedBuffer::new();
        buffer.put(b"hello world");
        buffer.skip(6);
        assert_eq!(buffer.get(), b"world");
    }

    #[test]
    fn skip_past_end_drains_fully() {
        let mut buffer = DirectedBuffer::new();
        buffer.put(b"abc");
        buffer.skip(100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn get_space_then_got_appends_filled_prefix() {
        let mut buffer = DirectedBuffer::new();
        {
            let space = buffer.get_space(4);
            space[..3].copy_from_slice(b"abc");
        }
        buffer.got(3);
        assert_eq!(buffer.get(), b"abc");
    }

    #[test]
    fn eof_and_error_latch_independently() {
        let mut buffer = DirectedBuffer::new();
        assert!(!buffer.is_eof());
        buffer.set_eof();
        assert!(buffer.is_eof());
        assert!(buffer.error().is_none());
        buffer.set_error(BufferError::Fatal("boom".into()));
        assert!(matches!(buffer.error(), Some(BufferError::Fatal(_))));
    }
}
