use super::{CodecError, PropCodec, PropValue, check_overflow, compare_encoded, mismatch};
use crate::bits::{BitReader, BitWriter};
use crate::schema::{PropFlags, SendProp};

pub(super) const CODEC: PropCodec = PropCodec {
    encode,
    decode,
    decode_zero,
    is_encoded_zero,
    compare_deltas,
    skip_prop,
};

const VARINT_GROUP_BITS: u32 = 8;
const VARINT_PAYLOAD_MASK: u64 = 0x7F;
const VARINT_CONTINUE: u64 = 0x80;
const VARINT_MAX_GROUPS: usize = 10;

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn write_varint(writer: &mut BitWriter, value: u64) {
    let mut value = value;
    loop {
        let group = value & VARINT_PAYLOAD_MASK;
        value >>= 7;
        if value == 0 {
            writer.write_ubits(group, VARINT_GROUP_BITS);
            return;
        }
        writer.write_ubits(group | VARINT_CONTINUE, VARINT_GROUP_BITS);
    }
}

fn read_varint(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<u64, CodecError> {
    let mut value = 0u64;
    for group in 0..VARINT_MAX_GROUPS {
        let byte = reader.read_ubits(VARINT_GROUP_BITS)?;
        value |= (byte & VARINT_PAYLOAD_MASK) << (7 * group);
        if byte & VARINT_CONTINUE == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::VarintTooLong {
        prop: prop.name().to_owned(),
    })
}

/// Inclusive range a fixed-width int can carry.
fn fixed_range(prop: &SendProp) -> (i64, i64) {
    let bits = prop.bits().min(32);
    if bits == 0 {
        (0, 0)
    } else if prop.flags().contains(PropFlags::UNSIGNED) {
        (0, (1i64 << bits) - 1)
    } else {
        (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
    }
}

fn encode(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    let value = value.as_int().ok_or_else(|| mismatch(prop, "int", value))?;
    let flags = prop.flags();

    if flags.contains(PropFlags::VARINT) {
        if flags.contains(PropFlags::UNSIGNED) {
            let value = if value < 0 {
                prop.warn_out_of_range(value, 0, i64::MAX);
                0
            } else {
                value
            };
            write_varint(writer, value as u64);
        } else {
            write_varint(writer, zigzag(value));
        }
    } else {
        let (low, high) = fixed_range(prop);
        let value = if value < low || value > high {
            prop.warn_out_of_range(value, low, high);
            value.clamp(low, high)
        } else {
            value
        };
        writer.write_ubits(value as u64, prop.bits());
    }

    check_overflow(prop, writer)
}

fn decode(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    let flags = prop.flags();
    let unsigned = flags.contains(PropFlags::UNSIGNED);

    if flags.contains(PropFlags::VARINT) {
        let raw = read_varint(prop, reader)?;
        let value = if unsigned { raw as i64 } else { unzigzag(raw) };
        return Ok(PropValue::Int(value));
    }

    let bits = prop.bits();
    let raw = reader.read_ubits(bits)?;
    if unsigned || bits == 0 || bits >= 64 {
        return Ok(PropValue::Int(raw as i64));
    }
    let shift = 64 - bits;
    Ok(PropValue::Int(((raw << shift) as i64) >> shift))
}

fn decode_zero(_: &SendProp) -> Result<PropValue, CodecError> {
    Ok(PropValue::Int(0))
}

fn is_encoded_zero(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    Ok(decode(prop, reader)? == PropValue::Int(0))
}

fn compare_deltas(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    compare_encoded(prop, a, b, skip_prop)
}

fn skip_prop(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    if prop.flags().contains(PropFlags::VARINT) {
        read_varint(prop, reader)?;
    } else {
        reader.skip_bits(prop.bits() as usize)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(prop: &SendProp, value: i64) -> (i64, usize) {
        let mut writer = BitWriter::with_capacity_bytes(32);
        encode(prop, &PropValue::Int(value), &mut writer).unwrap();
        let bits = writer.finish();
        let mut reader = bits.reader();
        let decoded = decode(prop, &mut reader).unwrap().as_int().unwrap();
        (decoded, bits.bit_len())
    }

    #[test]
    fn signed_fixed_width_sign_extends() {
        let prop = SendProp::int("delta", 5, PropFlags::empty());
        assert_eq!(round_trip(&prop, -16), (-16, 5));
        assert_eq!(round_trip(&prop, -1), (-1, 5));
        assert_eq!(round_trip(&prop, 15), (15, 5));
    }

    #[test]
    fn unsigned_full_width() {
        let prop = SendProp::int("mask", 32, PropFlags::UNSIGNED);
        assert_eq!(round_trip(&prop, u32::MAX as i64).0, u32::MAX as i64);
    }

    #[test]
    fn out_of_range_clamps_and_warns_once() {
        let prop = SendProp::int("health", 8, PropFlags::UNSIGNED);
        assert!(!prop.range_warned());
        assert_eq!(round_trip(&prop, 300).0, 255);
        assert!(prop.range_warned());
        assert_eq!(round_trip(&prop, -4).0, 0);
    }

    #[test]
    fn varint_groups_are_bytes() {
        let prop = SendProp::int("score", 0, PropFlags::VARINT | PropFlags::UNSIGNED);
        assert_eq!(round_trip(&prop, 0), (0, 8));
        assert_eq!(round_trip(&prop, 127), (127, 8));
        assert_eq!(round_trip(&prop, 128), (128, 16));
        assert_eq!(round_trip(&prop, i64::MAX).0, i64::MAX);
    }

    #[test]
    fn signed_varint_uses_zigzag() {
        let prop = SendProp::int("velocity", 0, PropFlags::VARINT);
        assert_eq!(round_trip(&prop, -1), (-1, 8));
        assert_eq!(round_trip(&prop, -64), (-64, 8));
        assert_eq!(round_trip(&prop, -65).1, 16);
        assert_eq!(round_trip(&prop, i64::MIN).0, i64::MIN);
    }

    #[test]
    fn unterminated_varint_is_an_error() {
        let prop = SendProp::int("score", 0, PropFlags::VARINT);
        let data = [0xFFu8; 12];
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            decode(&prop, &mut reader),
            Err(CodecError::VarintTooLong { .. })
        ));
    }

    #[test]
    fn skip_matches_encoded_length() {
        let prop = SendProp::int("score", 0, PropFlags::VARINT);
        let mut writer = BitWriter::with_capacity_bytes(32);
        encode(&prop, &PropValue::Int(1 << 20), &mut writer).unwrap();
        let len = writer.bits_written();
        let bits = writer.finish();
        let mut reader = bits.reader();
        skip_prop(&prop, &mut reader).unwrap();
        assert_eq!(reader.position(), len);
    }

    #[test]
    fn zero_detection() {
        let prop = SendProp::int("armor", 7, PropFlags::empty());
        let mut writer = BitWriter::with_capacity_bytes(4);
        encode(&prop, &PropValue::Int(0), &mut writer).unwrap();
        encode(&prop, &PropValue::Int(3), &mut writer).unwrap();
        let bits = writer.finish();
        let mut reader = bits.reader();
        assert!(is_encoded_zero(&prop, &mut reader).unwrap());
        assert!(!is_encoded_zero(&prop, &mut reader).unwrap());
    }
}
