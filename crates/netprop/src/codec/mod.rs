//! Per-type property encoders.
//!
//! Every [`PropType`] has one [`PropCodec`], a row of plain function pointers
//! looked up by the type's discriminant. The delta layer never matches on the
//! type itself; it goes through the free functions below.

mod array;
mod float;
mod int;
mod string;
mod value;
mod vector;

pub use float::{
    COORD_DENOMINATOR, COORD_FRACTIONAL_BITS, COORD_INTEGER_BITS, COORD_INTEGER_BITS_MP, COORD_MAX,
    COORD_RESOLUTION, COORD_RESOLUTION_LOW_PRECISION, NORMAL_DENOMINATOR, NORMAL_FRACTIONAL_BITS,
    NORMAL_RESOLUTION,
};
pub use string::{MAX_STRING_BYTES, STRING_LENGTH_BITS};
pub use value::PropValue;

use crate::bits::{BitError, BitReader, BitWriter, extract_bits};
use crate::schema::{PropType, SendProp};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Bits(#[from] BitError),
    #[error("writer overflowed while encoding '{prop}'")]
    Overflow { prop: String },
    #[error("prop '{prop}' expects a {expected} value, got {found}")]
    TypeMismatch {
        prop: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("string for '{prop}' is {len} bytes, max {max}")]
    StringTooLong { prop: String, len: usize, max: usize },
    #[error("array '{prop}' has {len} elements, max {max}")]
    ArrayTooLong { prop: String, len: usize, max: usize },
    #[error("varint for '{prop}' runs past 64 bits")]
    VarintTooLong { prop: String },
    #[error("array '{prop}' has no element descriptor")]
    MissingElement { prop: String },
    #[error("'{prop}' is a table and has no value of its own")]
    NotALeaf { prop: String },
}

pub type EncodeFn = fn(&SendProp, &PropValue, &mut BitWriter) -> Result<(), CodecError>;
pub type DecodeFn = fn(&SendProp, &mut BitReader<'_>) -> Result<PropValue, CodecError>;
pub type DecodeZeroFn = fn(&SendProp) -> Result<PropValue, CodecError>;
pub type IsZeroFn = fn(&SendProp, &mut BitReader<'_>) -> Result<bool, CodecError>;
pub type CompareFn =
    fn(&SendProp, &mut BitReader<'_>, &mut BitReader<'_>) -> Result<bool, CodecError>;
pub type SkipFn = fn(&SendProp, &mut BitReader<'_>) -> Result<(), CodecError>;

/// Operations every property type implements.
#[derive(Clone, Copy)]
pub struct PropCodec {
    pub encode: EncodeFn,
    pub decode: DecodeFn,
    /// The value a receiver assumes before anything was sent.
    pub decode_zero: DecodeZeroFn,
    /// Consumes one encoded value and reports whether it decodes to the zero value.
    pub is_encoded_zero: IsZeroFn,
    /// Consumes one encoded value from each reader; `true` when they differ.
    pub compare_deltas: CompareFn,
    pub skip_prop: SkipFn,
}

impl std::fmt::Debug for PropCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropCodec").finish_non_exhaustive()
    }
}

const TABLE_CODEC: PropCodec = PropCodec {
    encode: table_encode,
    decode: table_decode,
    decode_zero: table_decode_zero,
    is_encoded_zero: table_is_zero,
    compare_deltas: table_compare,
    skip_prop: table_skip,
};

fn table_encode(prop: &SendProp, _: &PropValue, _: &mut BitWriter) -> Result<(), CodecError> {
    Err(not_a_leaf(prop))
}

fn table_decode_zero(prop: &SendProp) -> Result<PropValue, CodecError> {
    Err(not_a_leaf(prop))
}

fn table_decode(prop: &SendProp, _: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    Err(not_a_leaf(prop))
}

fn table_is_zero(prop: &SendProp, _: &mut BitReader<'_>) -> Result<bool, CodecError> {
    Err(not_a_leaf(prop))
}

fn table_compare(
    prop: &SendProp,
    _: &mut BitReader<'_>,
    _: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    Err(not_a_leaf(prop))
}

fn table_skip(prop: &SendProp, _: &mut BitReader<'_>) -> Result<(), CodecError> {
    Err(not_a_leaf(prop))
}

static CODECS: [PropCodec; PropType::COUNT] = [
    int::CODEC,
    float::CODEC,
    vector::CODEC,
    vector::XY_CODEC,
    string::CODEC,
    array::CODEC,
    TABLE_CODEC,
];

pub fn codec_for(prop_type: PropType) -> &'static PropCodec {
    &CODECS[prop_type as usize]
}

pub fn encode(prop: &SendProp, value: &PropValue, writer: &mut BitWriter) -> Result<(), CodecError> {
    (codec_for(prop.prop_type()).encode)(prop, value, writer)
}

pub fn decode(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<PropValue, CodecError> {
    (codec_for(prop.prop_type()).decode)(prop, reader)
}

pub fn decode_zero(prop: &SendProp) -> Result<PropValue, CodecError> {
    (codec_for(prop.prop_type()).decode_zero)(prop)
}

pub fn is_encoded_zero(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<bool, CodecError> {
    (codec_for(prop.prop_type()).is_encoded_zero)(prop, reader)
}

pub fn compare_deltas(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
) -> Result<bool, CodecError> {
    (codec_for(prop.prop_type()).compare_deltas)(prop, a, b)
}

pub fn skip_prop(prop: &SendProp, reader: &mut BitReader<'_>) -> Result<(), CodecError> {
    (codec_for(prop.prop_type()).skip_prop)(prop, reader)
}

fn not_a_leaf(prop: &SendProp) -> CodecError {
    CodecError::NotALeaf {
        prop: prop.name().to_owned(),
    }
}

pub(crate) fn mismatch(prop: &SendProp, expected: &'static str, value: &PropValue) -> CodecError {
    CodecError::TypeMismatch {
        prop: prop.name().to_owned(),
        expected,
        found: value.kind(),
    }
}

pub(crate) fn check_overflow(prop: &SendProp, writer: &BitWriter) -> Result<(), CodecError> {
    if writer.overflowed() {
        return Err(CodecError::Overflow {
            prop: prop.name().to_owned(),
        });
    }
    Ok(())
}

/// Skips one value on each side and compares the raw bits.
pub(crate) fn compare_encoded(
    prop: &SendProp,
    a: &mut BitReader<'_>,
    b: &mut BitReader<'_>,
    skip: SkipFn,
) -> Result<bool, CodecError> {
    let start_a = a.position();
    skip(prop, a)?;
    let len = a.position() - start_a;

    let start_b = b.position();
    skip(prop, b)?;
    if b.position() - start_b != len {
        return Ok(true);
    }

    let mut offset = 0;
    while offset < len {
        let chunk = (len - offset).min(64) as u32;
        let left = extract_bits(a.data(), start_a + offset, chunk);
        let right = extract_bits(b.data(), start_b + offset, chunk);
        if left != right {
            return Ok(true);
        }
        offset += chunk as usize;
    }
    Ok(false)
}
