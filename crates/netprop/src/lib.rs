pub mod bits;
pub mod codec;
pub mod delta;
pub mod schema;
pub mod snapshot;

pub use bits::{BitError, BitReader, BitWriter, PackedBits};
pub use codec::{CodecError, PropCodec, PropValue};
pub use delta::{
    DeltaError, DeltaReader, DeltaWriter, MergeOutput, PropReceiver, apply_to, calc_delta,
    decode_entity, decode_with, encode_entity, merge_deltas, merge_deltas_into,
    write_against_zero, write_prop_list,
};
pub use schema::{
    FlatProp, FlattenedSchema, MAX_PROPS, PropFlags, PropType, SchemaError, SchemaRegistry,
    SchemaRegistryBuilder, SendProp, SendTable,
};
pub use snapshot::{
    EntityDelta, ManagerStats, PackedEntity, Snapshot, SnapshotBuilder, SnapshotConfig,
    SnapshotError, SnapshotId, SnapshotManager, SnapshotRef, SnapshotState,
};
