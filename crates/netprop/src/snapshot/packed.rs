use std::sync::Arc;

use super::SnapshotError;
use crate::bits::PackedBits;

/// Stored form of an entity's encoded props.
#[derive(Debug, Clone)]
pub enum PackedData {
    Raw(Arc<[u8]>),
    Compressed { bytes: Arc<[u8]>, raw_len: usize },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Compression {
    pub threshold: usize,
    pub level: i32,
}

/// One entity's full encoded state at the tick it was packed.
///
/// Immutable once built; snapshots share it through `Arc` for as long as the
/// entity stays unchanged.
#[derive(Debug)]
pub struct PackedEntity {
    serial: u64,
    entity: usize,
    tick: u32,
    signature: u32,
    bit_len: usize,
    data: PackedData,
}

impl PackedEntity {
    pub(crate) fn new(
        serial: u64,
        entity: usize,
        tick: u32,
        signature: u32,
        bits: PackedBits,
        compression: Option<Compression>,
    ) -> Result<Self, SnapshotError> {
        let bit_len = bits.bit_len();
        let raw = bits.into_bytes();

        let data = match compression {
            Some(c) if raw.len() >= c.threshold => {
                let compressed =
                    zstd::bulk::compress(&raw, c.level).map_err(SnapshotError::Compression)?;
                if compressed.len() < raw.len() {
                    PackedData::Compressed {
                        bytes: compressed.into(),
                        raw_len: raw.len(),
                    }
                } else {
                    PackedData::Raw(raw.into())
                }
            }
            _ => PackedData::Raw(raw.into()),
        };

        Ok(Self {
            serial,
            entity,
            tick,
            signature,
            bit_len,
            data,
        })
    }

    /// Unique per packed entity for the manager's lifetime. Keys the decode cache.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn entity(&self) -> usize {
        self.entity
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn signature(&self) -> u32 {
        self.signature
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn data(&self) -> &PackedData {
        &self.data
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.data, PackedData::Compressed { .. })
    }

    /// Bytes held in memory, compressed or not.
    pub fn stored_len(&self) -> usize {
        match &self.data {
            PackedData::Raw(bytes) => bytes.len(),
            PackedData::Compressed { bytes, .. } => bytes.len(),
        }
    }

    pub(crate) fn decompress(&self) -> Result<Arc<[u8]>, SnapshotError> {
        match &self.data {
            PackedData::Raw(bytes) => Ok(bytes.clone()),
            PackedData::Compressed { bytes, raw_len } => {
                let raw =
                    zstd::bulk::decompress(bytes, *raw_len).map_err(SnapshotError::Compression)?;
                Ok(raw.into())
            }
        }
    }
}
