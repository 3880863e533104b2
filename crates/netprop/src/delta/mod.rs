//! Delta bit-stream: a sequence of (index, value) pairs terminated by a zero bit.
//!
//! A full entity and a delta between two entities share this layout, so every
//! operation here works on either.

mod entity;
mod index;
mod merge;
mod reader;
mod writer;

pub use entity::{PropReceiver, apply_to, decode_entity, decode_with, encode_entity};
pub use merge::{
    MergeOutput, calc_delta, merge_deltas, merge_deltas_into, write_against_zero, write_prop_list,
};
pub use reader::DeltaReader;
pub use writer::DeltaWriter;

use crate::bits::BitError;
use crate::codec::CodecError;
use crate::schema::{FlatProp, FlattenedSchema};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Bits(#[from] BitError),
    #[error("read past the end of the delta stream")]
    ReadPastEnd,
    #[error("prop index {index} out of range for schema of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("prop index {index} does not follow {previous}")]
    IndexOrder { previous: i32, index: usize },
    #[error("{count} changed props exceeds the limit of {max}")]
    TooManyChanges { count: usize, max: usize },
    #[error("output buffer overflowed")]
    Overflow,
    #[error("expected {expected} values, got {found}")]
    ValueCount { expected: usize, found: usize },
}

pub(crate) fn lookup(schema: &FlattenedSchema, index: usize) -> Result<&FlatProp, DeltaError> {
    schema.get(index).ok_or(DeltaError::IndexOutOfRange {
        index,
        len: schema.len(),
    })
}
