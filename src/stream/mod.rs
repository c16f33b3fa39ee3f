//! In-memory byte stream with a single read/write cursor.
//!
//! [`Stream`] is the only I/O surface the record engine sees.  Callers that
//! pull bytes from a file or socket append them here first; the engine never
//! reaches out to an external source itself.
//!
//! # Cursor rules
//! - The cursor always lies in `0..=len()`.
//! - [`Stream::read_exact`] either returns exactly the requested bytes or
//!   fails without moving the cursor.
//! - [`Stream::write`] overwrites from the cursor and grows the buffer as
//!   needed; it never drops data.
//! - [`Stream::seek`] rejects targets outside `0..=len()` instead of
//!   clamping them.

use std::io::{self, Read, Seek, SeekFrom, Write};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream exhausted: wanted {wanted} bytes, {available} available")]
    Exhausted { wanted: usize, available: usize },
    #[error("Seek target {target} outside stream of {len} bytes")]
    SeekOutOfRange { target: i128, len: usize },
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match e {
            StreamError::Exhausted { .. }      => io::ErrorKind::UnexpectedEof,
            StreamError::SeekOutOfRange { .. } => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    buf: Vec<u8>,
    pos: usize,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stream with existing bytes; the cursor starts at 0.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buf: bytes, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// The not-yet-consumed tail of the buffer.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Read up to `n` bytes.  Fewer are returned only at the end of data.
    pub fn read(&mut self, n: usize) -> &[u8] {
        let start = self.pos;
        let end   = start + n.min(self.remaining());
        self.pos  = end;
        &self.buf[start..end]
    }

    /// Read exactly `n` bytes or fail with the cursor left untouched.
    pub fn read_exact(&mut self, n: usize) -> Result<&[u8], StreamError> {
        if n > self.remaining() {
            return Err(StreamError::Exhausted { wanted: n, available: self.remaining() });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Write `data` at the cursor, overwriting existing bytes and growing the
    /// buffer past its end.  Returns the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let end     = self.pos + data.len();
        let overlap = end.min(self.buf.len()).saturating_sub(self.pos);
        self.buf[self.pos..self.pos + overlap].copy_from_slice(&data[..overlap]);
        self.buf.extend_from_slice(&data[overlap..]);
        self.pos = end;
        data.len()
    }

    /// Append `data` at the end of the buffer without moving the cursor.
    pub fn append(&mut self, data: &[u8]) {
        let saved = self.pos;
        self.pos  = self.buf.len();
        self.write(data);
        self.pos  = saved;
    }

    // ── Positioning ──────────────────────────────────────────────────────────

    pub fn seek(&mut self, to: SeekFrom) -> Result<usize, StreamError> {
        let target: i128 = match to {
            SeekFrom::Start(off)   => off as i128,
            SeekFrom::Current(off) => self.pos as i128 + off as i128,
            SeekFrom::End(off)     => self.buf.len() as i128 + off as i128,
        };
        if target < 0 || target > self.buf.len() as i128 {
            return Err(StreamError::SeekOutOfRange { target, len: self.buf.len() });
        }
        self.pos = target as usize;
        Ok(self.pos)
    }

    /// Drop `n` already-consumed bytes from the front of the buffer.
    ///
    /// The cursor moves back by the same amount so it keeps pointing at the
    /// same byte.  `n` is clamped to the cursor; unread data is never lost.
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.pos);
        self.buf.drain(..n);
        self.pos -= n;
    }

    /// Shrink the logical length to `n` bytes, keeping the allocation.
    pub fn truncate(&mut self, n: usize) {
        self.buf.truncate(n);
        self.pos = self.pos.min(self.buf.len());
    }
}

// ── std::io adapters ─────────────────────────────────────────────────────────

impl Read for Stream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let chunk = Stream::read(self, out.len());
        out[..chunk.len()].copy_from_slice(chunk);
        Ok(chunk.len())
    }
}

impl Write for Stream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(Stream::write(self, data))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Stream {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        Ok(Stream::seek(self, to)? as u64)
    }
}
