use super::{PackedBits, extract_bits};

/// Bounded LSB-first bit writer.
///
/// A write that does not fit sets the overflow flag and is dropped whole; every
/// later write is dropped too. Callers check [`BitWriter::overflowed`] once at
/// the end of an operation instead of after each field.
#[derive(Debug, Clone)]
pub struct BitWriter {
    buffer: Vec<u8>,
    bits_written: usize,
    limit_bits: usize,
    overflowed: bool,
}

impl BitWriter {
    pub fn with_capacity_bits(limit_bits: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit_bits.div_ceil(8).min(1024)),
            bits_written: 0,
            limit_bits,
            overflowed: false,
        }
    }

    pub fn with_capacity_bytes(limit_bytes: usize) -> Self {
        Self::with_capacity_bits(limit_bytes * 8)
    }

    pub fn bits_written(&self) -> usize {
        self.bits_written
    }

    pub fn remaining_bits(&self) -> usize {
        self.limit_bits - self.bits_written
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.bits_written = 0;
        self.overflowed = false;
    }

    pub fn finish(self) -> PackedBits {
        PackedBits::new(self.buffer, self.bits_written)
    }

    fn reserve(&mut self, count: usize) -> bool {
        if self.overflowed {
            return false;
        }
        if count > self.limit_bits - self.bits_written {
            self.overflowed = true;
            return false;
        }
        true
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write_ubits(u64::from(bit), 1);
    }

    pub fn write_ubits(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 64);
        if count == 0 || !self.reserve(count as usize) {
            return;
        }

        let mut value = if count < 64 {
            value & ((1u64 << count) - 1)
        } else {
            value
        };
        let mut remaining = count;

        while remaining > 0 {
            let byte_index = self.bits_written / 8;
            let offset = (self.bits_written % 8) as u32;
            if byte_index == self.buffer.len() {
                self.buffer.push(0);
            }

            let take = (8 - offset).min(remaining);
            let mask = ((1u16 << take) - 1) as u8;
            self.buffer[byte_index] |= ((value as u8) & mask) << offset;

            value >>= take;
            remaining -= take;
            self.bits_written += take as usize;
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if !self.reserve(bytes.len() * 8) {
            return;
        }
        for &byte in bytes {
            self.write_ubits(u64::from(byte), 8);
        }
    }

    /// Relays `count` bits of `source` starting at bit `start` without interpreting them.
    pub fn write_bits_from(&mut self, source: &[u8], start: usize, count: usize) {
        debug_assert!(start + count <= source.len() * 8);
        if !self.reserve(count) {
            return;
        }

        let mut position = start;
        let end = start + count;
        while position < end {
            let chunk = (end - position).min(64) as u32;
            self.write_ubits(extract_bits(source, position, chunk), chunk);
            position += chunk as usize;
        }
    }
}
