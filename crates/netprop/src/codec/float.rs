use super::{CodecError, PropCodec, PropValue, check_overflow, compare_encoded, mismatch};
use crate::bits::{BitReader, BitWriter};
use crate::schema::{FloatEncoding, PropFlags, SendProp};

pub(super) const CODEC: PropCodec = PropCodec {
    encode,
    decode,
    decode_zero,
    is_encoded_zero,
    compare_deltas,
    skip_prop,
};

pub const COORD_INTEGER_BITS: u32 = 14;
pub const COORD_FRACTIONAL_BITS: u32 = 5;
pub const COORD_DENOMINATOR: u32 = 1 << COORD_FRACTIONAL_BITS;
pub const COORD_RESOLUTION: f32 = 1.0 / COORD_DENOMINATOR as f32;
/// Largest magnitude a coord can carry.
pub const COORD_MAX: f32 =
    (1u32 << COORD_INTEGER_BITS) as f32 + (COORD_DENOMINATOR - 1) as f32 * COORD_RESOLUTION;

pub const COORD_INTEGER_BITS_MP: u32 = 11;
const COORD_FRACTIONAL_BITS_MP_LOW_PRECISION: u32 = 3;
const COORD_DENOMINATOR_LOW_PRECISION: u32 = 1 << COORD_FRACTIONAL_BITS_MP_LOW_PRECISION;
pub const COORD_RESOLUTION_LOW_PRECISION: f32 = 1.0 / COORD_DENOMINATOR_LOW_PRECISION as f32;

pub const NORMAL_FRACTIONAL_BITS: u32 = 11;
pub const NORMAL_DENOMINATOR: u32 = (1 << NORMAL_FRACTIONAL_BITS) - 1;
pub const NORMAL_RESOLUTION: f32 = 1.0 / NORMAL_DENOMINATOR as f32;

/// Clamps `value` to `[-limit, limit]`, reporting the first violation per prop.
fn clamp_symmetric(prop: &SendProp, value: f32, limit: f32) -> f32 {
    if value.abs() <= limit {
        return value;
    }
    prop.warn_out_of_range(value, -limit, limit);
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-limit, limit)
    }
}

fn write_coord(writer: &mut BitWriter, value: f32) {
    let int_val = value.abs() as u32;
    let fract_val = ((value * COORD_DENOMINATOR as f32).abs() as u32) & (COORD_DENOMINATOR - 1);

    writer.write_bit(int_val != 0);
    writer.write_bit(fract_val != 0);
    if int_val == 0 && fract_val == 0 {
        return;
    }

    writer.write_bit(value <= -COORD_RESOLUTION);
    if int_val != 0 {
        writer.write_ubits(u64::from(int_val - 1), COORD_INTEGER_BITS);
    }
    if fract_val != 0 {
        writer.write_ubits(u64::from(fract_val), COORD_FRACTIONAL_BITS);
    }
}

fn read_coord(reader: &mut BitReader<'_>) -> Result<f32, CodecError> {
    let has_int = reader.read_bit()?;
    let has_fract = reader.read_bit()?;
    if !has_int && !has_fract {
        return Ok(0.0);
    }

    let negative = reader.read_bit()?;
    let mut value = 0.0;
    if has_int {
        value += (reader.read_ubits(COORD_INTEGER_BITS)? + 1) as f32;
    }
    if has_fract {
        value += reader.read_ubits(COORD_FRACTIONAL_BITS)? as f32 * COORD_RESOLUTION;
    }
    Ok(if negative { -value } else { value })
}

fn skip_coord(reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    let has_int = reader.read_bit()?;
    let has_fract = reader.read_bit()?;
    if !has_int && !has_fract {
        return Ok(());
    }
    let mut count = 1;
    if has_int {
        count += COORD_INTEGER_BITS;
    }
    if has_fract {
        count += COORD_FRACTIONAL_BITS;
    }
    reader.skip_bits(count as usize)?;
    Ok(())
}

fn mp_fraction(low_precision: bool) -> (u32, u32, f32) {
    if low_precision {
        (
            COORD_FRACTIONAL_BITS_MP_LOW_PRECISION,
            COORD_DENOMINATOR_LOW_PRECISION,
            COORD_RESOLUTION_LOW_PRECISION,
        )
    } else {
        (COORD_FRACTIONAL_BITS, COORD_DENOMINATOR, COORD_RESOLUTION)
    }
}

fn write_coord_mp(writer: &mut BitWriter, value: f32, low_precision: bool) {
    let (fract_bits, denominator, resolution) = mp_fraction(low_precision);
    let int_val = value.abs() as u32;
    let fract_val = ((value * denominator as f32).abs() as u32) & (denominator - 1);
    let in_bounds = int_val < (1 << COORD_INTEGER_BITS_MP);

    writer.write_bit(in_bounds);
    writer.write_bit(int_val != 0);
    writer.write_bit(value <= -resolution);
    if int_val != 0 {
        let width = if in_bounds {
            COORD_INTEGER_BITS_MP
        } else {
            COORD_INTEGER_BITS
        };
        writer.write_ubits(u64::from(int_val - 1), width);
    }
    writer.write_ubits(u64::from(fract_val), fract_bits);
}

fn read_coord_mp(reader: &mut BitReader<'_>, low_precision: bool) -> Result<f32, CodecError> {
    let (fract_bits, _, resolution) = mp_fraction(low_precision);
    let in_bounds = reader.read_bit()?;
    let has_int = reader.read_bit()?;
    let negative = reader.read_bit()?;

    let mut value = 0.0;
    if has_int {
        let width = if in_bounds {
            COORD_INTEGER_BITS_MP
        } else {
            COORD_INTEGER_BITS
        };
        value += (reader.read_ubits(width)? + 1) as f32;
    }
    value += reader.read_ubits(fract_bits)? as f32 * resolution;
    Ok(if negative { -value } else { value })
}

fn skip_coord_mp(reader: &mut BitReader<'_>, low_precision: bool) -> Result<(), CodecError> {
    let (fract_bits, _, _) = mp_fraction(low_precision);
    let in_bounds = reader.read_bit()?;
    let has_int = reader.read_bit()?;
    let mut count = 1 + fract_bits;
    if has_int {
        count += if in_bounds {
            COORD_INTEGER_BITS_MP
        } else {
            COORD_INTEGER_BITS
        };
    }
    reader.skip_bits(count as usize)?;
    Ok(())
}

fn write_normal(writer: &mut BitWriter, value: f32) {
    let fract_val = ((value * NORMAL_DENOMINATOR as f32).abs() as u32).min(NORMAL_DENOMINATOR);
    writer.write_bit(value <= -NORMAL_RESOLUTION);
    writer.write_ubits(u64::from(fract_val), NORMAL_FRACTIONAL_BITS);
}

fn read_normal(reader: &mut BitReader<'_>) -> Result<f32, CodecError> {
    let negative = reader.read_bit()?;
    let value = reader.read_ubits(NORMAL_FRACTIONAL_BITS)? as f32 * NORMAL_RESOLUTION;
    Ok(if negative { -value } else { value })
}

fn write_ranged(prop: &SendProp, value: f32, writer: &mut BitWriter) {
    let bits = prop.bits();
    let low = f64::from(prop.low());
    let high = f64::from(prop.high());

    let mut value = f64::from(value);
    if !(value >= low && value <= high) {
        prop.warn_out_of_range(value as f32, prop.low(), prop.high());
        value = value.max(low).min(high);
    }

    let max = ((1u64 << bits) - 1) as f64;
    let scaled = (value - low) / (high - low) * max;
    let flags = prop.flags();
    let quantized = if flags.contains(PropFlags::ROUND_DOWN) {
        scaled.floor()
    } else if flags.contains(PropFlags::ROUND_UP) {
        scaled.ceil()
    } else {
        scaled.round()
    };
    writer.write_ubits(quantized.max(0.0).min(max) as u64, bits);
}

fn read_ranged(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<f32, CodecError> {
    let bits = prop.bits();
    let raw = reader.read_ubits(bits)?;
    let max = ((1u64 << bits) - 1) as f64;
    let low = f64::from(prop.low());
    let high = f64::from(prop.high());
    Ok((low + (high - low) * raw as f64 / max) as f32)
}

/// Encodes one scalar with the prop's float encoding. Vectors call this per component.
pub(super) fn write_f32(prop: &SendProp, value: f32, writer: &mut BitWriter) {
    match prop.float_encoding() {
        FloatEncoding::Coord => write_coord(writer, clamp_symmetric(prop, value, COORD_MAX)),
        FloatEncoding::CoordMp { low_precision } => write_coord_mp(
            writer,
            clamp_symmetric(prop, value, COORD_MAX),
            low_precision,
        ),
        FloatEncoding::Normal => write_normal(writer, clamp_symmetric(prop, value, 1.0)),
        FloatEncoding::NoScale => writer.write_ubits(u64::from(value.to_bits()), 32),
        FloatEncoding::Ranged => write_ranged(prop, value, writer),
    }
}

pub(super) fn read_f32(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<f32, CodecError> {
    match prop.float_encoding() {
        FloatEncoding::Coord => read_coord(reader),
        FloatEncoding::CoordMp { low_precision } => read_coord_mp(reader, low_precision),
        FloatEncoding::Normal => read_normal(reader),
        FloatEncoding::NoScale => Ok(f32::from_bits(reader.read_ubits(32)? as u32)),
        FloatEncoding::Ranged => read_ranged(prop, reader),
    }
}

pub(super) fn skip_f32(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    match prop.float_encoding() {
        FloatEncoding::Coord => skip_coord(reader),
        FloatEncoding::CoordMp { low_precision } => skip_coord_mp(reader, low_precision),
        FloatEncoding::Normal => Ok(reader.skip_bits(1 + NORMAL_FRACTIONAL_BITS as usize)?),
        FloatEncoding::NoScale => Ok(reader.skip_bits(32)?),
        FloatEncoding::Ranged => Ok(reader.skip_bits(prop.bits() as usize)?),
    }
}

fn encode(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    let value = value.as_float().ok_or_else(|| mismatch(prop, "float", value))?;
    write_f32(prop, value, writer);
    check_overflow(prop, writer)
}

fn decode(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    read_f32(prop, reader).map(PropValue::Float)
}

fn decode_zero(_: &SendProp) -> Result<PropValue, CodecError> {
    Ok(PropValue::Float(0.0))
}

/// Only `+0.0` counts; a no-scale `-0.0` has to be sent like any other value.
fn is_encoded_zero(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    Ok(read_f32(prop, reader)?.to_bits() == 0)
}

fn compare_deltas(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    compare_encoded(prop, a, b, skip_prop)
}

fn skip_prop(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    skip_f32(prop, reader)
}
