use super::{CodecError, PropCodec, PropValue, check_overflow, compare_encoded, mismatch};
use crate::bits::{BitReader, BitWriter, bit_width};
use crate::schema::SendProp;

pub(super) const CODEC: PropCodec = PropCodec {
    encode,
    decode,
    decode_zero,
    is_encoded_zero,
    compare_deltas,
    skip_prop,
};

/// Width of the element count prefix.
fn count_bits(prop: &SendProp) -> u32 {
    bit_width(u64::from(prop.max_elements()))
}

fn element(prop: &SendProp) -> Result<&SendProp, CodecError> {
    prop.array_element().ok_or_else(|| CodecError::MissingElement {
        prop: prop.name().to_owned(),
    })
}

fn too_long(prop: &SendProp, len: usize) -> CodecError {
    CodecError::ArrayTooLong {
        prop: prop.name().to_owned(),
        len,
        max: prop.max_elements() as usize,
    }
}

fn read_count(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<usize, CodecError> {
    let count = reader.read_ubits(count_bits(prop))? as usize;
    if count > prop.max_elements() as usize {
        return Err(too_long(prop, count));
    }
    Ok(count)
}

fn encode(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    let items = value.as_array().ok_or_else(|| mismatch(prop, "array", value))?;
    if items.len() > prop.max_elements() as usize {
        return Err(too_long(prop, items.len()));
    }

    let element = element(prop)?;
    writer.write_ubits(items.len() as u64, count_bits(prop));
    for item in items {
        super::encode(element, item, writer)?;
    }
    check_overflow(prop, writer)
}

fn decode(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    let element = element(prop)?;
    let count = read_count(prop, reader)?;
    let items = (0..count)
        .map(|_| super::decode(element, reader))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PropValue::Array(items))
}

fn decode_zero(_: &SendProp) -> Result<PropValue, CodecError> {
    Ok(PropValue::Array(Vec::new()))
}

fn is_encoded_zero(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    let element = element(prop)?;
    let count = read_count(prop, reader)?;
    for _ in 0..count {
        super::skip_prop(element, reader)?;
    }
    Ok(count == 0)
}

fn compare_deltas(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    compare_encoded(prop, a, b, skip_prop)
}

fn skip_prop(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    let element = element(prop)?;
    let count = read_count(prop, reader)?;
    for _ in 0..count {
        super::skip_prop(element, reader)?;
    }
    Ok(())
}
