use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::packed::Compression;
use super::{
    CacheStats, DecodeCache, PackedData, PackedEntity, Snapshot, SnapshotBuilder, SnapshotError,
    SnapshotId, SnapshotRef,
};
use crate::bits::{BitWriter, PackedBits};
use crate::codec::PropValue;
use crate::delta::{
    DeltaReader, DeltaWriter, calc_delta, decode_entity, encode_entity, write_against_zero,
    write_prop_list,
};
use crate::schema::FlattenedSchema;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Entity slots per snapshot.
    pub max_entities: usize,
    /// Encode buffer size for one entity.
    pub max_packed_bytes: usize,
    /// Decompressed entities kept around for consumers. 0 disables the cache.
    pub decode_cache_size: usize,
    /// Packed entities at least this large are zstd-compressed. `None` disables compression.
    pub compress_threshold_bytes: Option<usize>,
    pub compression_level: i32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_entities: 2048,
            max_packed_bytes: 16 * 1024,
            decode_cache_size: 128,
            compress_threshold_bytes: None,
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub live_snapshots: usize,
    pub deleted_snapshots: u64,
    pub pooled_entities: usize,
    pub encoded: u64,
    pub reused: u64,
    pub cache: CacheStats,
}

/// Changes for one entity between two snapshots.
#[derive(Debug, Clone)]
pub struct EntityDelta {
    pub changed: Vec<usize>,
    pub bits: PackedBits,
}

impl EntityDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// A pooled packed entity and the last tick its bits are known to match.
#[derive(Debug, Clone)]
struct Pooled {
    packed: Arc<PackedEntity>,
    valid_through: u32,
}

#[derive(Debug)]
struct State {
    live: BTreeMap<SnapshotId, Arc<Snapshot>>,
    /// Most recent packed entity per slot, reused while the entity is unchanged.
    pool: Vec<Option<Pooled>>,
    /// References taken through `add_reference` and not yet released.
    held: HashMap<SnapshotId, usize>,
    deleted: u64,
}

#[derive(Debug)]
pub(crate) struct Shared {
    config: SnapshotConfig,
    state: Mutex<State>,
    cache: DecodeCache,
    next_id: AtomicU64,
    next_serial: AtomicU64,
    encoded: AtomicU64,
    reused: AtomicU64,
}

impl Shared {
    pub(crate) fn release(&self, snapshot: &Arc<Snapshot>) {
        let mut state = self.state.lock();
        if snapshot.release_ref() == 0 {
            Self::delete(&mut state, snapshot);
        }
    }

    fn delete(state: &mut State, snapshot: &Snapshot) {
        debug_assert_eq!(
            snapshot.ref_count(),
            0,
            "deleting snapshot {} while referenced",
            snapshot.id()
        );
        state.live.remove(&snapshot.id());
        state.held.remove(&snapshot.id());
        if snapshot.mark_deleted() {
            state.deleted += 1;
            log::debug!("snapshot {} (tick {}) deleted", snapshot.id(), snapshot.tick());
        } else {
            debug_assert!(false, "snapshot {} deleted twice", snapshot.id());
        }
    }
}

/// Owns the live snapshot list and the packed entity pool.
///
/// Cheap to clone; all clones share one state. Encoding and compression run
/// outside the lock, which only guards bookkeeping.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    shared: Arc<Shared>,
}

impl SnapshotManager {
    pub fn new(config: SnapshotConfig) -> Self {
        let state = State {
            live: BTreeMap::new(),
            pool: vec![None; config.max_entities],
            held: HashMap::new(),
            deleted: 0,
        };
        let shared = Shared {
            cache: DecodeCache::new(config.decode_cache_size),
            config,
            state: Mutex::new(state),
            next_id: AtomicU64::new(1),
            next_serial: AtomicU64::new(1),
            encoded: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.shared.config
    }

    pub fn create_snapshot(&self, tick: u32) -> SnapshotBuilder {
        let id = SnapshotId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        SnapshotBuilder {
            id,
            tick,
            entities: vec![None; self.shared.config.max_entities],
        }
    }

    fn compression(&self) -> Option<Compression> {
        let config = &self.shared.config;
        config.compress_threshold_bytes.map(|threshold| Compression {
            threshold,
            level: config.compression_level,
        })
    }

    /// Shares `packed` into `builder` and records that it still matches at the builder's tick.
    fn reuse(&self, builder: &mut SnapshotBuilder, packed: &Arc<PackedEntity>) -> Arc<PackedEntity> {
        if let Some(Some(pooled)) = self.shared.state.lock().pool.get_mut(packed.entity())
            && Arc::ptr_eq(&pooled.packed, packed)
        {
            pooled.valid_through = pooled.valid_through.max(builder.tick);
        }
        self.shared.reused.fetch_add(1, Ordering::Relaxed);
        builder.entities[packed.entity()] = Some(packed.clone());
        packed.clone()
    }

    /// Packs `entity` into `builder`.
    ///
    /// The pooled packed entity is shared instead of re-encoded when its schema
    /// matches and it was last known to match the entity at or after
    /// `last_changed_tick`, or when the fresh encoding is bit-identical to it.
    /// Either way the pooled entity then counts as valid through this tick.
    /// On error the slot is left empty.
    pub fn pack_entity(
        &self,
        builder: &mut SnapshotBuilder,
        entity: usize,
        schema: &FlattenedSchema,
        values: &[PropValue],
        last_changed_tick: u32,
    ) -> Result<Arc<PackedEntity>, SnapshotError> {
        let max = builder.entities.len();
        if entity >= max {
            return Err(SnapshotError::EntityOutOfRange { entity, max });
        }
        builder.entities[entity] = None;

        let signature = schema.signature();
        let previous = self
            .shared
            .state
            .lock()
            .pool
            .get(entity)
            .cloned()
            .flatten()
            .filter(|prev| prev.packed.signature() == signature);

        if let Some(prev) = &previous
            && prev.valid_through >= last_changed_tick
        {
            return Ok(self.reuse(builder, &prev.packed));
        }

        let mut writer = BitWriter::with_capacity_bytes(self.shared.config.max_packed_bytes);
        encode_entity(schema, values, &mut writer)?;
        let bits = writer.finish();

        if let Some(Pooled { packed: prev, .. }) = &previous
            && prev.bit_len() == bits.bit_len()
            && *self.packed_data(prev)? == *bits.bytes()
        {
            return Ok(self.reuse(builder, prev));
        }

        let serial = self.shared.next_serial.fetch_add(1, Ordering::Relaxed);
        let packed = Arc::new(PackedEntity::new(
            serial,
            entity,
            builder.tick,
            signature,
            bits,
            self.compression(),
        )?);

        if let Some(slot) = self.shared.state.lock().pool.get_mut(entity) {
            *slot = Some(Pooled {
                packed: packed.clone(),
                valid_through: builder.tick,
            });
        }
        self.shared.encoded.fetch_add(1, Ordering::Relaxed);
        builder.entities[entity] = Some(packed.clone());
        Ok(packed)
    }

    /// Publishes a finished snapshot with one reference, held by the returned handle.
    pub fn publish(&self, builder: SnapshotBuilder) -> SnapshotRef {
        let snapshot = Arc::new(Snapshot::publish(builder));
        log::debug!(
            "snapshot {} (tick {}) published with {} entities",
            snapshot.id(),
            snapshot.tick(),
            snapshot.num_entities()
        );
        self.shared
            .state
            .lock()
            .live
            .insert(snapshot.id(), snapshot.clone());
        SnapshotRef::adopt(snapshot, self.shared.clone())
    }

    /// Adds a reference by id. Returns the new count.
    pub fn add_reference(&self, id: SnapshotId) -> Result<usize, SnapshotError> {
        let mut state = self.shared.state.lock();
        let snapshot = state
            .live
            .get(&id)
            .cloned()
            .ok_or(SnapshotError::UnknownSnapshot(id))?;
        *state.held.entry(id).or_default() += 1;
        Ok(snapshot.add_ref())
    }

    /// Releases a reference taken with [`add_reference`](Self::add_reference).
    /// Returns the remaining count; at zero the snapshot is deleted.
    ///
    /// References owned by [`SnapshotRef`] handles are not released here; they
    /// go away when the handle is dropped.
    pub fn release_reference(&self, id: SnapshotId) -> Result<usize, SnapshotError> {
        let mut state = self.shared.state.lock();
        let snapshot = state
            .live
            .get(&id)
            .cloned()
            .ok_or(SnapshotError::UnknownSnapshot(id))?;
        match state.held.get_mut(&id) {
            Some(held) if *held > 1 => *held -= 1,
            Some(_) => {
                state.held.remove(&id);
            }
            None => return Err(SnapshotError::NotHeld(id)),
        }
        let remaining = snapshot.release_ref();
        if remaining == 0 {
            Shared::delete(&mut state, &snapshot);
        }
        Ok(remaining)
    }

    fn handle(&self, snapshot: &Arc<Snapshot>) -> SnapshotRef {
        snapshot.add_ref();
        SnapshotRef::adopt(snapshot.clone(), self.shared.clone())
    }

    pub fn snapshot(&self, id: SnapshotId) -> Option<SnapshotRef> {
        let state = self.shared.state.lock();
        state.live.get(&id).map(|snapshot| self.handle(snapshot))
    }

    pub fn snapshot_for_tick(&self, tick: u32) -> Option<SnapshotRef> {
        let state = self.shared.state.lock();
        state
            .live
            .values()
            .rev()
            .find(|snapshot| snapshot.tick() == tick)
            .map(|snapshot| self.handle(snapshot))
    }

    /// Most recently published live snapshot.
    pub fn latest(&self) -> Option<SnapshotRef> {
        let state = self.shared.state.lock();
        state
            .live
            .values()
            .next_back()
            .map(|snapshot| self.handle(snapshot))
    }

    /// Forgets the pooled packed entity so the next pack encodes from scratch.
    pub fn remove_entity(&self, entity: usize) {
        if let Some(slot) = self.shared.state.lock().pool.get_mut(entity) {
            *slot = None;
        }
    }

    /// Uncompressed bits of `packed`. Compressed entities go through the decode cache.
    pub fn packed_data(&self, packed: &PackedEntity) -> Result<Arc<[u8]>, SnapshotError> {
        match packed.data() {
            PackedData::Raw(bytes) => Ok(bytes.clone()),
            PackedData::Compressed { .. } => self
                .shared
                .cache
                .get_or_insert_with(packed.serial(), || packed.decompress()),
        }
    }

    fn entity_in<'s>(
        schema: &FlattenedSchema,
        snapshot: &'s Snapshot,
        entity: usize,
    ) -> Result<&'s Arc<PackedEntity>, SnapshotError> {
        let packed = snapshot
            .entity(entity)
            .ok_or(SnapshotError::NoEntityData {
                entity,
                tick: snapshot.tick(),
            })?;
        if packed.signature() != schema.signature() {
            return Err(SnapshotError::SchemaMismatch {
                entity,
                expected: schema.signature(),
                found: packed.signature(),
            });
        }
        Ok(packed)
    }

    pub fn decode_entity(
        &self,
        schema: &FlattenedSchema,
        snapshot: &Snapshot,
        entity: usize,
    ) -> Result<Vec<PropValue>, SnapshotError> {
        let packed = Self::entity_in(schema, snapshot, entity)?;
        let data = self.packed_data(packed)?;
        Ok(decode_entity(
            schema,
            DeltaReader::new(&data, packed.bit_len()),
        )?)
    }

    /// Delta for `entity` from `baseline` to `current`.
    ///
    /// Without a baseline, or if the baseline lacks the entity or holds it
    /// under another schema, the delta is taken against the zero state.
    pub fn entity_delta(
        &self,
        schema: &FlattenedSchema,
        baseline: Option<&Snapshot>,
        current: &Snapshot,
        entity: usize,
    ) -> Result<EntityDelta, SnapshotError> {
        let packed = Self::entity_in(schema, current, entity)?;
        let base = baseline
            .and_then(|snapshot| snapshot.entity(entity))
            .filter(|base| base.signature() == packed.signature());

        let mut out = BitWriter::with_capacity_bits(packed.bit_len() + 16 * schema.len() + 1);
        if let Some(base) = base
            && Arc::ptr_eq(base, packed)
        {
            DeltaWriter::new(&mut out).finish()?;
            return Ok(EntityDelta {
                changed: Vec::new(),
                bits: out.finish(),
            });
        }

        let data = self.packed_data(packed)?;
        let reader = DeltaReader::new(&data, packed.bit_len());
        let changed = match base {
            Some(base) => {
                let base_data = self.packed_data(base)?;
                let changed = calc_delta(
                    schema,
                    DeltaReader::new(&base_data, base.bit_len()),
                    reader.clone(),
                )?;
                write_prop_list(schema, reader, &changed, &mut out)?;
                changed
            }
            None => write_against_zero(schema, reader, &mut out)?,
        };

        Ok(EntityDelta {
            changed,
            bits: out.finish(),
        })
    }

    pub fn stats(&self) -> ManagerStats {
        let (live_snapshots, deleted_snapshots, pooled_entities) = {
            let state = self.shared.state.lock();
            (
                state.live.len(),
                state.deleted,
                state.pool.iter().filter(|slot| slot.is_some()).count(),
            )
        };
        ManagerStats {
            live_snapshots,
            deleted_snapshots,
            pooled_entities,
            encoded: self.shared.encoded.load(Ordering::Relaxed),
            reused: self.shared.reused.load(Ordering::Relaxed),
            cache: self.shared.cache.stats(),
        }
    }
}
