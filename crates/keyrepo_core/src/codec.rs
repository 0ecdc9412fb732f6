//! Binary stream primitives for keys and auxiliary values.
//!
//! # Format
//!
//! All integers are big-endian. Strings are a `u16` byte length followed by
//! modified UTF-8: NUL is encoded as `C0 80` and supplementary characters
//! as two encoded surrogates. A string consisting of a single NUL character
//! is reserved to mean "no string". Collections are an `i32` count followed
//! by that many self-describing entries.

use crate::error::{KeyRepoError, Result};

/// Longest encodable string, in encoded bytes.
pub const MAX_STRING_BYTES: usize = u16::MAX as usize;

const NULL_SENTINEL: [u8; 2] = [0xC0, 0x80];

/// Growable output buffer.
#[derive(Debug, Default, Clone)]
pub struct KeyOutput {
    buf: Vec<u8>,
}

impl KeyOutput {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Writes a big-endian `i16`.
    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a big-endian `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a collection count.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let count = i32::try_from(count)
            .map_err(|_| KeyRepoError::Corrupted(format!("collection of {count} entries")))?;
        self.write_i32(count);
        Ok(())
    }

    /// Writes a string.
    ///
    /// # Errors
    ///
    /// Fails with [`KeyRepoError::ReservedString`] for `"\0"`, which would
    /// read back as an absent string.
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        if s == "\0" {
            return Err(KeyRepoError::ReservedString);
        }
        let encoded_len = modified_utf8_len(s);
        if encoded_len > MAX_STRING_BYTES {
            return Err(KeyRepoError::StringTooLong {
                len: encoded_len,
                limit: MAX_STRING_BYTES,
            });
        }
        self.buf.extend_from_slice(&(encoded_len as u16).to_be_bytes());
        encode_modified_utf8(s, &mut self.buf);
        Ok(())
    }

    /// Writes an optional string; `None` becomes the single-NUL sentinel.
    pub fn write_opt_str(&mut self, s: Option<&str>) -> Result<()> {
        match s {
            Some(s) => self.write_str(s),
            None => {
                self.buf.extend_from_slice(&2u16.to_be_bytes());
                self.buf.extend_from_slice(&NULL_SENTINEL);
                Ok(())
            }
        }
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Cursor over an input slice.
#[derive(Debug, Clone)]
pub struct KeyInput<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> KeyInput<'a> {
    /// Creates a cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fails unless every byte was consumed.
    pub fn expect_end(&self) -> Result<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(KeyRepoError::Corrupted(format!(
                "{} trailing bytes at offset {}",
                self.remaining(),
                self.pos
            )))
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(KeyRepoError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a boolean byte.
    pub fn read_bool(&mut self) -> Result<bool> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(KeyRepoError::Corrupted(format!(
                "invalid boolean byte {other} at offset {offset}"
            ))),
        }
    }

    /// Reads a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Reads a collection count.
    pub fn read_count(&mut self) -> Result<usize> {
        let offset = self.pos;
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| {
            KeyRepoError::Corrupted(format!("negative count {count} at offset {offset}"))
        })
    }

    /// Reads an optional string; the single-NUL sentinel reads as `None`.
    pub fn read_opt_string(&mut self) -> Result<Option<String>> {
        let len = u16::from_be_bytes(self.take_array()?) as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        if bytes == NULL_SENTINEL {
            return Ok(None);
        }
        decode_modified_utf8(bytes)
            .map(Some)
            .map_err(|reason| KeyRepoError::InvalidString { offset, reason })
    }

    /// Reads a string that must be present.
    pub fn read_string(&mut self) -> Result<String> {
        let offset = self.pos;
        self.read_opt_string()?.ok_or_else(|| {
            KeyRepoError::Corrupted(format!("unexpected null string at offset {offset}"))
        })
    }
}

fn modified_utf8_len(s: &str) -> usize {
    s.chars()
        .map(|c| match c as u32 {
            0 => 2,
            0x01..=0x7F => 1,
            0x80..=0x7FF => 2,
            0x800..=0xFFFF => 3,
            _ => 6,
        })
        .sum()
}

fn encode_modified_utf8(s: &str, out: &mut Vec<u8>) {
    let mut units = [0u16; 2];
    for c in s.chars() {
        for &unit in c.encode_utf16(&mut units).iter() {
            match unit {
                0x01..=0x7F => out.push(unit as u8),
                0x00 | 0x80..=0x7FF => {
                    out.push(0xC0 | (unit >> 6) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
                _ => {
                    out.push(0xE0 | (unit >> 12) as u8);
                    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
            }
        }
    }
}

fn decode_modified_utf8(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let continuation = |i: usize| -> std::result::Result<u16, String> {
        match bytes.get(i) {
            Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
            Some(&b) => Err(format!("bad continuation byte {b:#04x}")),
            None => Err("sequence cut short".to_string()),
        }
    };
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x00 => return Err("raw NUL byte".to_string()),
            0x01..=0x7F => {
                units.push(u16::from(b));
                i += 1;
            }
            0xC0..=0xDF => {
                units.push((u16::from(b & 0x1F) << 6) | continuation(i + 1)?);
                i += 2;
            }
            0xE0..=0xEF => {
                units.push(
                    (u16::from(b & 0x0F) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?,
                );
                i += 3;
            }
            _ => return Err(format!("invalid lead byte {b:#04x}")),
        }
    }
    String::from_utf16(&units).map_err(|e| e.to_string())
}
