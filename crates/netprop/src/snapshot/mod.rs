//! Per-tick world snapshots built from shared, immutable packed entities.

mod cache;
mod frame;
mod manager;
mod packed;

pub use cache::{CacheStats, DecodeCache};
pub use frame::{Snapshot, SnapshotBuilder, SnapshotId, SnapshotRef, SnapshotState};
pub use manager::{EntityDelta, ManagerStats, SnapshotConfig, SnapshotManager};
pub use packed::{PackedData, PackedEntity};

use crate::codec::CodecError;
use crate::delta::DeltaError;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("entity {entity} is outside the {max} snapshot slots")]
    EntityOutOfRange { entity: usize, max: usize },
    #[error("snapshot for tick {tick} has no data for entity {entity}")]
    NoEntityData { entity: usize, tick: u32 },
    #[error("entity {entity} was packed with schema {found:#010x}, expected {expected:#010x}")]
    SchemaMismatch {
        entity: usize,
        expected: u32,
        found: u32,
    },
    #[error("snapshot {0} is not live")]
    UnknownSnapshot(SnapshotId),
    #[error("snapshot {0} has no reference taken by id")]
    NotHeld(SnapshotId),
    #[error(transparent)]
    Delta(#[from] DeltaError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("packed entity compression failed")]
    Compression(#[source] std::io::Error),
}
