use glam::Vec3;

use super::float::{read_f32, skip_f32, write_f32};
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

pub(super) const XY_CODEC: PropCodec = PropCodec {
    encode: encode_xy,
    decode: decode_xy,
    decode_zero,
    is_encoded_zero: is_encoded_zero_xy,
    compare_deltas: compare_deltas_xy,
    skip_prop: skip_prop_xy,
};

fn is_normal(prop: &SendProp) -> bool {
    prop.flags().contains(PropFlags::NORMAL)
}

fn encode(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    let v = value.as_vector().ok_or_else(|| mismatch(prop, "vector", value))?;
    write_f32(prop, v.x, writer);
    write_f32(prop, v.y, writer);
    if is_normal(prop) {
        // z is rebuilt from x and y; only its sign travels.
        writer.write_bit(v.z <= -super::NORMAL_RESOLUTION);
    } else {
        write_f32(prop, v.z, writer);
    }
    check_overflow(prop, writer)
}

fn decode(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    let x = read_f32(prop, reader)?;
    let y = read_f32(prop, reader)?;
    let z = if is_normal(prop) {
        let negative = reader.read_bit()?;
        let z_sq = 1.0 - x * x - y * y;
        let z = if z_sq > 0.0 { z_sq.sqrt() } else { 0.0 };
        if negative { -z } else { z }
    } else {
        read_f32(prop, reader)?
    };
    Ok(PropValue::Vector(Vec3::new(x, y, z)))
}

fn decode_zero(_: &SendProp) -> Result<PropValue, CodecError> {
    Ok(PropValue::Vector(Vec3::ZERO))
}

/// True only for `+0.0` in every component, matching [`decode_zero`].
fn is_zero_value(value: &PropValue) -> bool {
    matches!(value, PropValue::Vector(v) if v.to_array().iter().all(|c| c.to_bits() == 0))
}

fn is_encoded_zero(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    Ok(is_zero_value(&decode(prop, reader)?))
}

fn compare_deltas(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    compare_encoded(prop, a, b, skip_prop)
}

fn skip_prop(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    skip_f32(prop, reader)?;
    skip_f32(prop, reader)?;
    if is_normal(prop) {
        reader.skip_bits(1)?;
    } else {
        skip_f32(prop, reader)?;
    }
    Ok(())
}

fn encode_xy(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    let v = value.as_vector().ok_or_else(|| mismatch(prop, "vector", value))?;
    write_f32(prop, v.x, writer);
    write_f32(prop, v.y, writer);
    check_overflow(prop, writer)
}

fn decode_xy(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    let x = read_f32(prop, reader)?;
    let y = read_f32(prop, reader)?;
    Ok(PropValue::Vector(Vec3::new(x, y, 0.0)))
}

fn is_encoded_zero_xy(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    Ok(is_zero_value(&decode_xy(prop, reader)?))
}

fn compare_deltas_xy(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    compare_encoded(prop, a, b, skip_prop_xy)
}

fn skip_prop_xy(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    skip_f32(prop, reader)?;
    skip_f32(prop, reader)
}
