use super::{BitError, extract_bits};

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    len_bits: usize,
    position: usize,
    overflowed: bool,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_len(data, data.len() * 8)
    }

    pub fn with_len(data: &'a [u8], len_bits: usize) -> Self {
        Self {
            data,
            len_bits: len_bits.min(data.len() * 8),
            position: 0,
            overflowed: false,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len_bits(&self) -> usize {
        self.len_bits
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_bits(&self) -> usize {
        self.len_bits - self.position
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn seek(&mut self, position: usize) -> Result<(), BitError> {
        if position > self.len_bits {
            return Err(BitError::Seek {
                position,
                len: self.len_bits,
            });
        }
        self.position = position;
        Ok(())
    }

    fn check(&mut self, needed: usize) -> Result<(), BitError> {
        if needed > self.remaining_bits() {
            self.overflowed = true;
            return Err(BitError::Exhausted {
                position: self.position,
                needed,
                available: self.remaining_bits(),
            });
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, BitError> {
        Ok(self.read_ubits(1)? != 0)
    }

    pub fn read_ubits(&mut self, count: u32) -> Result<u64, BitError> {
        debug_assert!(count <= 64);
        if count == 0 {
            return Ok(0);
        }
        self.check(count as usize)?;
        let value = extract_bits(self.data, self.position, count);
        self.position += count as usize;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BitError> {
        self.check(count * 8)?;
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read_ubits(8)? as u8);
        }
        Ok(bytes)
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<(), BitError> {
        self.check(count)?;
        self.position += count;
        Ok(())
    }
}
