//! DSDL v0 bit-level serialisation.
//!
//! Wire rules:
//! ```text
//!   scalar  : value laid out little-endian; when the bit length is not a
//!             multiple of 8 the final (most significant) byte is
//!             left-aligned, then the bits are streamed MSB-first
//!   union   : ceil(log2(n)) tag bits, then the selected field
//!   array   : ceil(log2(max+1)) length bits, then the items
//!   tail    : the last array of a top-level type carries no length; it
//!             extends to the end of the payload
//! ```
//!
//! Both cursors work on fixed buffers; nothing here allocates.

use crate::error::DecodeError;

/// Largest transfer payload this node encodes or accepts.
pub const MAX_PAYLOAD: usize = 512;

/// A transfer payload.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

/// The leading bytes of `bytes` that fit in `N`.
pub fn truncated<const N: usize>(bytes: &[u8]) -> heapless::Vec<u8, N> {
    bytes.iter().take(N).copied().collect()
}

// ═══════════════════════════════════════════════════════════════
//  Writer
// ═══════════════════════════════════════════════════════════════

/// Streams fields into a zero-initialised payload buffer.
pub struct BitWriter {
    buf: [u8; MAX_PAYLOAD],
    bit_len: usize,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_PAYLOAD],
            bit_len: 0,
        }
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Write the low `bits` bits of `value` (1..=64).
    pub fn write_unsigned(&mut self, value: u64, bits: u8) {
        let bits = usize::from(bits.min(64));
        if bits == 0 || self.bit_len + bits > MAX_PAYLOAD * 8 {
            debug_assert!(bits == 0, "DSDL writer overflow");
            return;
        }

        let mut storage = value.to_le_bytes();
        if bits % 8 != 0 {
            storage[bits / 8] <<= 8 - bits % 8;
        }

        for i in 0..bits {
            if (storage[i / 8] >> (7 - i % 8)) & 1 != 0 {
                let dst = self.bit_len + i;
                self.buf[dst / 8] |= 0x80 >> (dst % 8);
            }
        }
        self.bit_len += bits;
    }

    /// Two's-complement signed write.
    pub fn write_signed(&mut self, value: i64, bits: u8) {
        self.write_unsigned(value as u64, bits);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_unsigned(u64::from(value), 1);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_unsigned(u64::from(value.to_bits()), 32);
    }

    /// Padding (`voidN`).
    pub fn write_void(&mut self, bits: u8) {
        self.bit_len = (self.bit_len + usize::from(bits)).min(MAX_PAYLOAD * 8);
    }

    /// `uint8` items with no length prefix (static arrays and tail arrays).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_unsigned(u64::from(b), 8);
        }
    }

    /// `uint8[<=max]` with a length prefix of `len_bits` bits.
    pub fn write_prefixed_bytes(&mut self, bytes: &[u8], len_bits: u8) {
        self.write_unsigned(bytes.len() as u64, len_bits);
        self.write_bytes(bytes);
    }

    /// Finish the payload, rounding up to whole bytes.
    pub fn finish(self) -> Payload {
        let len = self.bit_len.div_ceil(8);
        truncated(&self.buf[..len])
    }
}

// ═══════════════════════════════════════════════════════════════
//  Reader
// ═══════════════════════════════════════════════════════════════

/// Pulls fields out of a received payload.
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }

    /// Whole bytes left, the length of a tail array.
    pub fn remaining_bytes(&self) -> usize {
        self.remaining_bits() / 8
    }

    pub fn read_unsigned(&mut self, bits: u8) -> Result<u64, DecodeError> {
        let bits = usize::from(bits.min(64));
        if bits > self.remaining_bits() {
            return Err(DecodeError::Truncated);
        }

        let mut storage = [0u8; 8];
        for i in 0..bits {
            let src = self.bit_pos + i;
            if (self.data[src / 8] >> (7 - src % 8)) & 1 != 0 {
                storage[i / 8] |= 0x80 >> (i % 8);
            }
        }
        if bits % 8 != 0 {
            storage[bits / 8] >>= 8 - bits % 8;
        }

        self.bit_pos += bits;
        Ok(u64::from_le_bytes(storage))
    }

    /// Sign-extending read.
    pub fn read_signed(&mut self, bits: u8) -> Result<i64, DecodeError> {
        let raw = self.read_unsigned(bits)?;
        let bits = u32::from(bits.min(64));
        if bits > 0 && bits < 64 && raw & (1u64 << (bits - 1)) != 0 {
            Ok((raw | (u64::MAX << bits)) as i64)
        } else {
            Ok(raw as i64)
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_unsigned(8)? as u8)
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_unsigned(1)? != 0)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_unsigned(32)? as u32))
    }

    pub fn skip(&mut self, bits: u8) -> Result<(), DecodeError> {
        if usize::from(bits) > self.remaining_bits() {
            return Err(DecodeError::Truncated);
        }
        self.bit_pos += usize::from(bits);
        Ok(())
    }

    /// Read exactly `count` bytes into a bounded vector.
    pub fn read_bytes<const N: usize>(
        &mut self,
        count: usize,
    ) -> Result<heapless::Vec<u8, N>, DecodeError> {
        if count > N {
            return Err(DecodeError::ArrayTooLong);
        }
        let mut out = heapless::Vec::new();
        for _ in 0..count {
            out.push(self.read_u8()?)
                .map_err(|_| DecodeError::ArrayTooLong)?;
        }
        Ok(out)
    }

    /// Fixed-size `uint8[N]`.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        for b in &mut out {
            *b = self.read_u8()?;
        }
        Ok(out)
    }

    /// `uint8[<=N]` with a `len_bits` length prefix.
    pub fn read_prefixed_bytes<const N: usize>(
        &mut self,
        len_bits: u8,
    ) -> Result<heapless::Vec<u8, N>, DecodeError> {
        let len = self.read_unsigned(len_bits)? as usize;
        self.read_bytes(len)
    }

    /// Tail-array `uint8[<=N]`: everything up to the end of the payload.
    pub fn read_tail_bytes<const N: usize>(&mut self) -> Result<heapless::Vec<u8, N>, DecodeError> {
        let len = self.remaining_bytes();
        self.read_bytes(len)
    }
}
