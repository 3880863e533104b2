mod reader;
mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BitError {
    #[error("bit buffer exhausted: needed {needed} bits at position {position}, {available} available")]
    Exhausted {
        position: usize,
        needed: usize,
        available: usize,
    },
    #[error("seek to bit {position} outside buffer of {len} bits")]
    Seek { position: usize, len: usize },
}

/// A finished, immutable bit string. Bits past `bit_len` in the last byte are zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackedBits {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl PackedBits {
    pub fn new(bytes: Vec<u8>, bit_len: usize) -> Self {
        debug_assert!(bit_len <= bytes.len() * 8);
        Self { bytes, bit_len }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn byte_len(&self) -> usize {
        self.bit_len.div_ceil(8)
    }

    pub fn reader(&self) -> BitReader<'_> {
        BitReader::with_len(&self.bytes, self.bit_len)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads `count` (<= 64) bits starting at `start`, LSB-first. Caller checks bounds.
pub(crate) fn extract_bits(data: &[u8], start: usize, count: u32) -> u64 {
    let mut value = 0u64;
    let mut taken = 0u32;
    let mut position = start;

    while taken < count {
        let byte = data[position / 8];
        let offset = (position % 8) as u32;
        let take = (8 - offset).min(count - taken);
        let bits = u64::from(byte >> offset) & ((1u64 << take) - 1);
        value |= bits << taken;
        taken += take;
        position += take as usize;
    }

    value
}

/// Number of bits needed to store `value`.
pub fn bit_width(value: u64) -> u32 {
    u64::BITS - value.leading_zeros()
}
