//! Read/write cursors which assist with packing fixed byte layouts, such as the derived key and the
//! word registers of the AES accelerator
//!
//! All multi-byte values are big-endian: the key layout and the accelerator registers are both
//! defined most-significant byte first. Note that the cursor methods will **panic** if the
//! respective buffers aren't the correct size; every caller works on fixed-size arrays.

use core::mem::size_of;

/// Cursor which enables reading from a buffer in strictly increasing indices
#[derive(Debug)]
pub struct ReadCursor<'a> {
    /// The buffer being read by the cursor
    buf: &'a [u8],
}

impl<'a> ReadCursor<'a> {
    /// Creates a new read cursor over the referenced buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Advances the cursor `n` bytes on the referenced buffer
    pub fn advance(&mut self, n: usize) {
        self.buf = &self.buf[n..];
    }

    /// Reads a big-endian u32 from the buffer, then advances by the size of one u32
    pub fn read_u32(&mut self) -> u32 {
        let mut buf = [0_u8; size_of::<u32>()];
        buf.copy_from_slice(&self.buf[..size_of::<u32>()]);
        self.advance(size_of::<u32>());
        u32::from_be_bytes(buf)
    }
}

/// Cursor which enables writing to a buffer in strictly increasing indices
///
/// Note that, to preserve the consistency of the mutated buffer, the functions here consume the
/// write cursor, returning the updated cursor to allow for chaining of writes
#[derive(Debug)]
pub struct WriteCursor<'a> {
    /// Buffer which is written to by this cursor
    buf: &'a mut [u8],
}

impl<'a> WriteCursor<'a> {
    /// Creates a new write cursor over the referenced buffer
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    /// Advances the cursor forward `n` bytes on the referenced buffer
    pub fn advance(self, n: usize) -> Self {
        Self {
            buf: &mut self.buf[n..],
        }
    }

    /// Writes a single byte to the buffer, then advances by one
    pub fn write_u8(self, n: u8) -> Self {
        self.buf[0] = n;
        self.advance(1)
    }

    /// Writes a big-endian u32 to the buffer, then advances by the size of one u32
    pub fn write_u32(self, n: u32) -> Self {
        self.buf[..size_of::<u32>()].copy_from_slice(&n.to_be_bytes());
        self.advance(size_of::<u32>())
    }

    /// Writes the entire source buffer to the underlying buffer,
    /// then advances by the length of the source buffer
    pub fn write(self, src: &[u8]) -> Self {
        self.buf[..src.len()].copy_from_slice(src);
        self.advance(src.len())
    }
}
