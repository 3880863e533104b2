use super::{DeltaError, DeltaReader, index};
use crate::bits::BitWriter;
use crate::codec::{self, PropValue};
use crate::schema::FlatProp;

/// Writes a delta stream into a borrowed [`BitWriter`].
///
/// The terminator is written by [`finish`](Self::finish), or on drop if the
/// writer is abandoned early, so a stream is never left open.
#[derive(Debug)]
pub struct DeltaWriter<'w> {
    writer: &'w mut BitWriter,
    last_index: i32,
    count: usize,
    finished: bool,
}

impl<'w> DeltaWriter<'w> {
    pub fn new(writer: &'w mut BitWriter) -> Self {
        Self {
            writer,
            last_index: -1,
            count: 0,
            finished: false,
        }
    }

    /// Props written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bit_writer(&mut self) -> &mut BitWriter {
        &mut *self.writer
    }

    /// Writes the continuation bit and index code. On error the stream is untouched.
    pub fn write_prop_index(&mut self, index: usize) -> Result<(), DeltaError> {
        index::check_index(self.last_index, index)?;
        self.writer.write_bit(true);
        index::write_index(self.writer, self.last_index, index)?;
        if self.writer.overflowed() {
            return Err(DeltaError::Overflow);
        }
        self.last_index = index as i32;
        self.count += 1;
        Ok(())
    }

    pub fn write_prop(&mut self, prop: &FlatProp, value: &PropValue) -> Result<(), DeltaError> {
        self.write_prop_index(prop.index())?;
        codec::encode(prop.prop(), value, self.writer)?;
        Ok(())
    }

    /// Writes `prop`'s index and relays its value from `source` without decoding it.
    pub fn copy_prop(&mut self, prop: &FlatProp, source: &mut DeltaReader<'_>) -> Result<(), DeltaError> {
        self.write_prop_index(prop.index())?;
        source.copy_prop_data(prop, self.writer)?;
        Ok(())
    }

    /// Terminates the stream and returns the number of props written.
    pub fn finish(mut self) -> Result<usize, DeltaError> {
        self.terminate();
        if self.writer.overflowed() {
            return Err(DeltaError::Overflow);
        }
        Ok(self.count)
    }

    fn terminate(&mut self) {
        if !self.finished {
            self.writer.write_bit(false);
            self.finished = true;
        }
    }
}

impl Drop for DeltaWriter<'_> {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MAX_PROPS, PropFlags, SendProp, SendTable};

    fn table() -> SendTable {
        SendTable::new(
            "Crate",
            vec![
                SendProp::int("a", 4, PropFlags::UNSIGNED),
                SendProp::int("b", 4, PropFlags::UNSIGNED),
                SendProp::int("c", 4, PropFlags::UNSIGNED),
                SendProp::string("label"),
            ],
        )
    }

    #[test]
    fn stream_reads_back() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut out = BitWriter::with_capacity_bytes(64);
        let mut delta = DeltaWriter::new(&mut out);
        delta.write_prop(schema.get(0).unwrap(), &PropValue::Int(3)).unwrap();
        delta
            .write_prop(schema.get(3).unwrap(), &PropValue::from("lid"))
            .unwrap();
        assert_eq!(delta.finish().unwrap(), 2);

        let bits = out.finish();
        let mut reader = DeltaReader::from_bits(&bits);
        assert_eq!(reader.next_prop_index().unwrap(), Some(0));
        assert_eq!(
            reader.read_prop_value(schema.get(0).unwrap()).unwrap(),
            PropValue::Int(3)
        );
        assert_eq!(reader.next_prop_index().unwrap(), Some(3));
        assert_eq!(
            reader.read_prop_value(schema.get(3).unwrap()).unwrap(),
            PropValue::from("lid")
        );
        assert_eq!(reader.next_prop_index().unwrap(), None);
        assert_eq!(reader.next_prop_index(), Err(DeltaError::ReadPastEnd));
        assert_eq!(reader.position(), bits.bit_len());
    }

    #[test]
    fn drop_writes_terminator() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut out = BitWriter::with_capacity_bytes(8);
        {
            let mut delta = DeltaWriter::new(&mut out);
            delta.write_prop(schema.get(1).unwrap(), &PropValue::Int(9)).unwrap();
        }
        // cont + 3-bit index code + 4 value bits + terminator
        assert_eq!(out.bits_written(), 1 + 3 + 4 + 1);

        let bits = out.finish();
        let indices = DeltaReader::from_bits(&bits)
            .read_prop_index_list(schema)
            .unwrap();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn indices_must_increase() {
        let mut out = BitWriter::with_capacity_bytes(8);
        let mut delta = DeltaWriter::new(&mut out);
        delta.write_prop_index(2).unwrap();
        assert!(matches!(
            delta.write_prop_index(1),
            Err(DeltaError::IndexOrder {
                previous: 2,
                index: 1
            })
        ));
    }

    #[test]
    fn uncodable_index_leaves_stream_intact() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut out = BitWriter::with_capacity_bytes(8);
        {
            let mut delta = DeltaWriter::new(&mut out);
            delta.write_prop(schema.get(0).unwrap(), &PropValue::Int(5)).unwrap();
            let before = delta.bit_writer().bits_written();
            assert!(matches!(
                delta.write_prop_index(MAX_PROPS + 2),
                Err(DeltaError::IndexOutOfRange { .. })
            ));
            assert_eq!(delta.bit_writer().bits_written(), before);
            assert_eq!(delta.count(), 1);
        }

        let bits = out.finish();
        let indices = DeltaReader::from_bits(&bits)
            .read_prop_index_list(schema)
            .unwrap();
        assert_eq!(indices, vec![0]);
    }

    #[test]
    fn empty_stream_is_one_bit() {
        let mut out = BitWriter::with_capacity_bytes(1);
        assert_eq!(DeltaWriter::new(&mut out).finish().unwrap(), 0);
        assert_eq!(out.bits_written(), 1);
    }
}
