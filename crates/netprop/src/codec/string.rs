use super::{CodecError, PropCodec, PropValue, check_overflow, compare_encoded, mismatch};
use crate::bits::{BitReader, BitWriter};
use crate::schema::SendProp;

pub(super) const CODEC: PropCodec = PropCodec {
    encode,
    decode,
    decode_zero,
    is_encoded_zero,
    compare_deltas,
    skip_prop,
};

pub const STRING_LENGTH_BITS: u32 = 9;
pub const MAX_STRING_BYTES: usize = (1 << STRING_LENGTH_BITS) - 1;

fn encode(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    let text = value.as_str().ok_or_else(|| mismatch(prop, "string", value))?;
    let bytes = text.as_bytes();
    if bytes.len() > MAX_STRING_BYTES {
        return Err(CodecError::StringTooLong {
            prop: prop.name().to_owned(),
            len: bytes.len(),
            max: MAX_STRING_BYTES,
        });
    }
    writer.write_ubits(bytes.len() as u64, STRING_LENGTH_BITS);
    writer.write_bytes(bytes);
    check_overflow(prop, writer)
}

fn decode(_: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    let len = reader.read_ubits(STRING_LENGTH_BITS)? as usize;
    let bytes = reader.read_bytes(len)?;
    Ok(PropValue::Str(String::from_utf8_lossy(&bytes).into_owned()))
}

fn decode_zero(_: &SendProp) -> Result<PropValue, CodecError> {
    Ok(PropValue::Str(String::new()))
}

fn is_encoded_zero(_: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    let len = reader.read_ubits(STRING_LENGTH_BITS)? as usize;
    reader.skip_bits(len * 8)?;
    Ok(len == 0)
}

fn compare_deltas(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    compare_encoded(prop, a, b, skip_prop)
}

fn skip_prop(_: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    let len = reader.read_ubits(STRING_LENGTH_BITS)? as usize;
    reader.skip_bits(len * 8)?;
    Ok(())
}
