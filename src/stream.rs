//! In-memory byte stream
//!
//! [`MemoryStream`] lets an extracted archive member flow through the same
//! `Read`/`BufRead`/`Seek` interfaces that files and standard input use, so
//! the decoders never care where their bytes came from.

use std::io::{self, BufRead, Read, Seek, SeekFrom};

/// Read cursor over an owned byte buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    buf: Vec<u8>,
    pos: usize,
}

impl MemoryStream {
    /// Wrap a buffer; the cursor starts at offset zero
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    /// Total number of bytes in the underlying buffer
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current read offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Next byte without advancing the cursor
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &[u8] {
        // pos may sit past the end after a seek
        self.buf.get(self.pos..).unwrap_or(&[])
    }

    /// Give the buffer back
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl From<Vec<u8>> for MemoryStream {
    fn from(buf: Vec<u8>) -> Self {
        Self::new(buf)
    }
}

impl Read for MemoryStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.remaining();
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl BufRead for MemoryStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.remaining())
    }

    fn consume(&mut self, amt: usize) {
        self.pos = self.pos.saturating_add(amt);
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match target {
            SeekFrom::Start(n) => {
                self.pos = usize::try_from(n).map_err(|_| seek_error())?;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.buf.len() as u64, n),
            SeekFrom::Current(n) => (self.pos as u64, n),
        };

        let new_pos = base.checked_add_signed(offset).ok_or_else(seek_error)?;
        self.pos = usize::try_from(new_pos).map_err(|_| seek_error())?;
        Ok(new_pos)
    }
}

fn seek_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "invalid seek to a negative or overflowing position",
    )
}
