use super::{DeltaError, index, lookup};
use crate::bits::{BitReader, BitWriter, PackedBits};
use crate::codec::{self, PropValue};
use crate::schema::{FlatProp, FlattenedSchema};

/// Walks a delta stream one property at a time.
///
/// After [`next_prop_index`](Self::next_prop_index) returns an index the caller
/// must consume that prop's value with exactly one of the `*_prop_data`,
/// [`read_prop_value`](Self::read_prop_value) or [`is_prop_zero`](Self::is_prop_zero)
/// calls before asking for the next index.
#[derive(Debug, Clone)]
pub struct DeltaReader<'a> {
    reader: BitReader<'a>,
    last_index: i32,
    finished: bool,
}

impl<'a> DeltaReader<'a> {
    pub fn new(data: &'a [u8], bit_len: usize) -> Self {
        Self::from_reader(BitReader::with_len(data, bit_len))
    }

    pub fn from_bits(bits: &'a PackedBits) -> Self {
        Self::from_reader(bits.reader())
    }

    pub fn from_reader(reader: BitReader<'a>) -> Self {
        Self {
            reader,
            last_index: -1,
            finished: false,
        }
    }

    pub fn position(&self) -> usize {
        self.reader.position()
    }

    pub fn remaining_bits(&self) -> usize {
        self.reader.remaining_bits()
    }

    pub fn data(&self) -> &'a [u8] {
        self.reader.data()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// `None` once the terminator is read. Asking again after that is an error.
    pub fn next_prop_index(&mut self) -> Result<Option<usize>, DeltaError> {
        if self.finished {
            return Err(DeltaError::ReadPastEnd);
        }
        if !self.reader.read_bit()? {
            self.finished = true;
            return Ok(None);
        }
        let index = index::read_index(&mut self.reader, self.last_index)?;
        self.last_index = index as i32;
        Ok(Some(index))
    }

    pub fn skip_prop_data(&mut self, prop: &FlatProp) -> Result<(), DeltaError> {
        codec::skip_prop(prop.prop(), &mut self.reader)?;
        Ok(())
    }

    /// Relays the current prop's encoded bits into `out` untouched. Returns the bit count.
    pub fn copy_prop_data(&mut self, prop: &FlatProp, out: &mut BitWriter) -> Result<usize, DeltaError> {
        let start = self.reader.position();
        codec::skip_prop(prop.prop(), &mut self.reader)?;
        let len = self.reader.position() - start;
        out.write_bits_from(self.reader.data(), start, len);
        if out.overflowed() {
            return Err(DeltaError::Overflow);
        }
        Ok(len)
    }

    /// Consumes the current prop on both readers; `true` when the encodings differ.
    pub fn compare_prop_data(
        &mut self,
        other: &mut DeltaReader<'_>,
        prop: &FlatProp,
    ) -> Result<bool, DeltaError> {
        Ok(codec::compare_deltas(
            prop.prop(),
            &mut self.reader,
            &mut other.reader,
        )?)
    }

    pub fn read_prop_value(&mut self, prop: &FlatProp) -> Result<PropValue, DeltaError> {
        Ok(codec::decode(prop.prop(), &mut self.reader)?)
    }

    pub fn is_prop_zero(&mut self, prop: &FlatProp) -> Result<bool, DeltaError> {
        Ok(codec::is_encoded_zero(prop.prop(), &mut self.reader)?)
    }

    /// Indices of every prop left in the stream, skipping their values.
    pub fn read_prop_index_list(
        &mut self,
        schema: &FlattenedSchema,
    ) -> Result<Vec<usize>, DeltaError> {
        let mut indices = Vec::new();
        while let Some(index) = self.next_prop_index()? {
            self.skip_prop_data(lookup(schema, index)?)?;
            indices.push(index);
        }
        Ok(indices)
    }
}
