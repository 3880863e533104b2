use super::DeltaError;
use crate::bits::{BitError, BitReader, BitWriter};
use crate::schema::MAX_PROPS;

const SELECTOR_BITS: u32 = 2;
const GAP_BITS: [u32; 4] = [0, 4, 8, 12];

fn selector(value: u64) -> usize {
    if value == 0 {
        0
    } else if value < 16 {
        1
    } else if value < 256 {
        2
    } else {
        3
    }
}

/// Checks that `index` can follow `last` and returns the gap between them.
pub(crate) fn check_index(last: i32, index: usize) -> Result<u64, DeltaError> {
    let gap = index as i64 - i64::from(last) - 1;
    if gap < 0 {
        return Err(DeltaError::IndexOrder {
            previous: last,
            index,
        });
    }
    if gap > MAX_PROPS as i64 {
        return Err(DeltaError::IndexOutOfRange {
            index,
            len: MAX_PROPS,
        });
    }
    Ok(gap as u64)
}

/// Writes `index` relative to `last` (`-1` before the first prop).
/// Nothing is written if the index cannot be coded.
pub(crate) fn write_index(writer: &mut BitWriter, last: i32, index: usize) -> Result<(), DeltaError> {
    let gap = check_index(last, index)?;
    if gap == 0 {
        writer.write_bit(true);
        return Ok(());
    }

    let value = gap - 1;
    let selector = selector(value);
    writer.write_bit(false);
    writer.write_ubits(selector as u64, SELECTOR_BITS);
    writer.write_ubits(value, GAP_BITS[selector]);
    Ok(())
}

pub(crate) fn read_index(reader: &mut BitReader<'_>, last: i32) -> Result<usize, BitError> {
    let next = (i64::from(last) + 1) as usize;
    if reader.read_bit()? {
        return Ok(next);
    }
    let selector = reader.read_ubits(SELECTOR_BITS)? as usize;
    let value = reader.read_ubits(GAP_BITS[selector])? as usize;
    Ok(next + 1 + value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_len(last: i32, index: usize) -> usize {
        let mut writer = BitWriter::with_capacity_bytes(4);
        write_index(&mut writer, last, index).unwrap();
        let len = writer.bits_written();
        let bits = writer.finish();
        assert_eq!(read_index(&mut bits.reader(), last).unwrap(), index);
        len
    }

    #[test]
    fn code_lengths_by_gap() {
        assert_eq!(code_len(-1, 0), 1);
        assert_eq!(code_len(4, 5), 1);
        assert_eq!(code_len(-1, 1), 3);
        assert_eq!(code_len(-1, 2), 7);
        assert_eq!(code_len(-1, 16), 7);
        assert_eq!(code_len(-1, 17), 11);
        assert_eq!(code_len(-1, 256), 11);
        assert_eq!(code_len(-1, 257), 15);
        assert_eq!(code_len(-1, 4095), 15);
    }

    #[test]
    fn backwards_index_is_rejected() {
        let mut writer = BitWriter::with_capacity_bytes(4);
        assert_eq!(
            write_index(&mut writer, 7, 7).unwrap_err(),
            DeltaError::IndexOrder {
                previous: 7,
                index: 7
            }
        );
        assert_eq!(writer.bits_written(), 0);
    }
}
