//! Bounded big-endian byte reader over an in-memory stream.
//!
//! Every marker segment and box header is read through this type so that
//! the current byte offset is always available for error reports.

use crate::error::{CodecError, ErrorKind, Result};

#[derive(Clone)]
pub struct StreamReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current offset from the start of the underlying buffer.
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, what: &'static str) -> CodecError {
        CodecError::new(ErrorKind::Truncated(what)).with_offset(self.position as u64)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.position)
            .ok_or_else(|| self.truncated("byte"))?;
        self.position += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2).map_err(|_| self.truncated("u16"))?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4).map_err(|_| self.truncated("u32"))?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8).map_err(|_| self.truncated("u64"))?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.truncated("byte range"))?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    pub fn peek_u16(&self) -> Option<u16> {
        let hi = *self.data.get(self.position)?;
        let lo = *self.data.get(self.position + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Everything from the current position to the end of the buffer.
    pub fn tail(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    /// Position the reader at an absolute offset.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.data.len() as u64 {
            return Err(self.truncated("seek target"));
        }
        self.position = offset as usize;
        Ok(())
    }
}
