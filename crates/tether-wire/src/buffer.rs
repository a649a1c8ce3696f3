//! The serialization buffer: a fixed-capacity byte region with independent
//! read and write cursors.
//!
//! One [`SerialBuffer`] is the unit of data exchange between the protocol
//! layers and the transport. Writers append typed values with the `put_*`
//! family; readers consume them in the same order with `get_*`. The buffer
//! enforces its bounds — it never grows, and a read can never pass the
//! write cursor — so a malformed record surfaces as a [`WireError::Overrun`]
//! instead of reading garbage.
//!
//! All integers and floats are written big-endian regardless of host
//! endianness. Checksumming is the transport's job; the buffer only
//! provides [`SerialBuffer::checksum`] over a byte range.

use crate::WireError;

/// Computes the Fletcher-16 checksum over `bytes`.
///
/// Position-sensitive (unlike a plain byte sum), so transposed bytes are
/// caught. Both peers must use the same algorithm; this is an integrity
/// check against transport corruption, not a security primitive.
pub fn fletcher16(bytes: &[u8]) -> u16 {
    let mut sum1: u16 = 0;
    let mut sum2: u16 = 0;
    for &b in bytes {
        sum1 = (sum1 + u16::from(b)) % 255;
        sum2 = (sum2 + sum1) % 255;
    }
    (sum2 << 8) | sum1
}

/// String encoding selector for length-prefixed strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrEncoding {
    /// UTF-8, the default.
    #[default]
    Utf8,
    /// UTF-16, big-endian code units.
    Utf16Be,
}

/// A fixed-capacity byte region with independent read/write cursors.
///
/// ```text
/// 0          read_pos        write_pos        capacity
/// |-- consumed --|-- readable --|-- free space --|
/// ```
pub struct SerialBuffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl SerialBuffer {
    /// Creates a buffer with the given fixed capacity, both cursors at 0.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Total capacity in bytes. Never changes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes still writable before the capacity is hit.
    pub fn free_space(&self) -> usize {
        self.data.len() - self.write_pos
    }

    /// The write cursor — one past the last written byte.
    pub fn limit(&self) -> usize {
        self.write_pos
    }

    /// Bytes readable between the read cursor and the write cursor.
    pub fn remaining(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Current read cursor position.
    pub fn position(&self) -> usize {
        self.read_pos
    }

    /// Resets both cursors to 0. Previously written bytes become dead.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Rewinds the read cursor to 0 so everything written is readable again.
    pub fn flip(&mut self) {
        self.read_pos = 0;
    }

    /// Everything written so far, as a slice.
    pub fn as_written(&self) -> &[u8] {
        &self.data[..self.write_pos]
    }

    /// Replaces the contents with `bytes` and flips for reading.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.clear();
        self.put_bytes(bytes)?;
        self.flip();
        Ok(())
    }

    /// Fletcher-16 over `len` written bytes starting at `offset`.
    pub fn checksum(&self, offset: usize, len: usize) -> Result<u16, WireError> {
        let end = offset.checked_add(len).ok_or(WireError::Overrun {
            needed: len,
            available: self.write_pos,
        })?;
        if end > self.write_pos {
            return Err(WireError::Overrun {
                needed: len,
                available: self.write_pos.saturating_sub(offset),
            });
        }
        Ok(fletcher16(&self.data[offset..end]))
    }

    // -----------------------------------------------------------------------
    // Raw byte access
    // -----------------------------------------------------------------------

    /// Appends raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        if bytes.len() > self.free_space() {
            return Err(WireError::Overrun {
                needed: bytes.len(),
                available: self.free_space(),
            });
        }
        self.data[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.write_pos += bytes.len();
        Ok(())
    }

    /// Reads `len` raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>, WireError> {
        if len > self.remaining() {
            return Err(WireError::Overrun {
                needed: len,
                available: self.remaining(),
            });
        }
        let out = self.data[self.read_pos..self.read_pos + len].to_vec();
        self.read_pos += len;
        Ok(out)
    }

    /// Advances the read cursor by `len` without looking at the bytes.
    /// Used to step over records addressed to entities this side no longer
    /// knows about.
    pub fn skip(&mut self, len: usize) -> Result<(), WireError> {
        if len > self.remaining() {
            return Err(WireError::Overrun {
                needed: len,
                available: self.remaining(),
            });
        }
        self.read_pos += len;
        Ok(())
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        if N > self.remaining() {
            return Err(WireError::Overrun {
                needed: N,
                available: self.remaining(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.read_pos..self.read_pos + N]);
        self.read_pos += N;
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Typed primitives (big-endian)
    // -----------------------------------------------------------------------

    /// Appends a `u8`.
    pub fn put_u8(&mut self, v: u8) -> Result<(), WireError> {
        self.put_bytes(&[v])
    }

    /// Reads a `u8`.
    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.get_array::<1>()?[0])
    }

    /// Appends an `i8`.
    pub fn put_i8(&mut self, v: i8) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads an `i8`.
    pub fn get_i8(&mut self) -> Result<i8, WireError> {
        Ok(i8::from_be_bytes(self.get_array()?))
    }

    /// Appends a `u16`.
    pub fn put_u16(&mut self, v: u16) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads a `u16`.
    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.get_array()?))
    }

    /// Appends an `i16`.
    pub fn put_i16(&mut self, v: i16) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads an `i16`.
    pub fn get_i16(&mut self) -> Result<i16, WireError> {
        Ok(i16::from_be_bytes(self.get_array()?))
    }

    /// Appends a `u32`.
    pub fn put_u32(&mut self, v: u32) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads a `u32`.
    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.get_array()?))
    }

    /// Appends an `i32`.
    pub fn put_i32(&mut self, v: i32) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads an `i32`.
    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.get_array()?))
    }

    /// Appends a `u64`.
    pub fn put_u64(&mut self, v: u64) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads a `u64`.
    pub fn get_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.get_array()?))
    }

    /// Appends an `i64`.
    pub fn put_i64(&mut self, v: i64) -> Result<(), WireError> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Reads an `i64`.
    pub fn get_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_be_bytes(self.get_array()?))
    }

    /// Appends an `f32` as its IEEE-754 bit pattern.
    pub fn put_f32(&mut self, v: f32) -> Result<(), WireError> {
        self.put_bytes(&v.to_bits().to_be_bytes())
    }

    /// Reads an `f32`. The bit pattern round-trips exactly, NaNs included.
    pub fn get_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(u32::from_be_bytes(self.get_array()?)))
    }

    /// Appends an `f64` as its IEEE-754 bit pattern.
    pub fn put_f64(&mut self, v: f64) -> Result<(), WireError> {
        self.put_bytes(&v.to_bits().to_be_bytes())
    }

    /// Reads an `f64`.
    pub fn get_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_bits(u64::from_be_bytes(self.get_array()?)))
    }

    /// Appends a `bool` as one byte, 0 or 1.
    pub fn put_bool(&mut self, v: bool) -> Result<(), WireError> {
        self.put_u8(u8::from(v))
    }

    /// Reads a `bool`. Anything other than 0 or 1 is malformed.
    pub fn get_bool(&mut self) -> Result<bool, WireError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::Malformed(format!("bool byte 0x{other:02x}"))),
        }
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    /// Appends a length-prefixed string: `u16` byte count, then the encoded
    /// bytes in the selected encoding.
    pub fn put_str(&mut self, s: &str, enc: StrEncoding) -> Result<(), WireError> {
        let bytes: Vec<u8> = match enc {
            StrEncoding::Utf8 => s.as_bytes().to_vec(),
            StrEncoding::Utf16Be => {
                s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
            }
        };
        if bytes.len() > usize::from(u16::MAX) {
            return Err(WireError::Malformed(format!(
                "string of {} bytes exceeds length prefix",
                bytes.len()
            )));
        }
        if 2 + bytes.len() > self.free_space() {
            return Err(WireError::Overrun {
                needed: 2 + bytes.len(),
                available: self.free_space(),
            });
        }
        self.put_u16(bytes.len() as u16)?;
        self.put_bytes(&bytes)
    }

    /// Reads a length-prefixed string in the selected encoding.
    pub fn get_str(&mut self, enc: StrEncoding) -> Result<String, WireError> {
        let len = usize::from(self.get_u16()?);
        let bytes = self.get_bytes(len)?;
        match enc {
            StrEncoding::Utf8 => String::from_utf8(bytes)
                .map_err(|e| WireError::Malformed(format!("invalid UTF-8: {e}"))),
            StrEncoding::Utf16Be => {
                if len % 2 != 0 {
                    return Err(WireError::Malformed(format!(
                        "UTF-16 payload of odd length {len}"
                    )));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| WireError::Malformed(format!("invalid UTF-16: {e}")))
            }
        }
    }
}

impl std::fmt::Debug for SerialBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialBuffer")
            .field("capacity", &self.data.len())
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================
