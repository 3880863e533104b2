use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::PackedEntity;
use super::manager::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    /// Being filled by the producer.
    Created,
    /// Published but currently unreferenced.
    Populated,
    Referenced,
    Deleted,
}

/// A snapshot still being filled. Only the producer holds one.
#[derive(Debug)]
pub struct SnapshotBuilder {
    pub(crate) id: SnapshotId,
    pub(crate) tick: u32,
    pub(crate) entities: Vec<Option<Arc<PackedEntity>>>,
}

impl SnapshotBuilder {
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn state(&self) -> SnapshotState {
        SnapshotState::Created
    }

    pub fn max_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, entity: usize) -> Option<&Arc<PackedEntity>> {
        self.entities.get(entity)?.as_ref()
    }

    /// Leaves `entity` out of this snapshot.
    pub fn clear_entity(&mut self, entity: usize) {
        if let Some(slot) = self.entities.get_mut(entity) {
            *slot = None;
        }
    }
}

/// The world state at one tick: per entity, the packed entity current at that tick.
#[derive(Debug)]
pub struct Snapshot {
    id: SnapshotId,
    tick: u32,
    entities: Box<[Option<Arc<PackedEntity>>]>,
    ref_count: AtomicUsize,
    deleted: AtomicBool,
}

impl Snapshot {
    pub(crate) fn publish(builder: SnapshotBuilder) -> Self {
        Self {
            id: builder.id,
            tick: builder.tick,
            entities: builder.entities.into_boxed_slice(),
            ref_count: AtomicUsize::new(1),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn max_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, entity: usize) -> Option<&Arc<PackedEntity>> {
        self.entities.get(entity)?.as_ref()
    }

    /// Populated entity slots in index order.
    pub fn entities(&self) -> impl Iterator<Item = (usize, &Arc<PackedEntity>)> {
        self.entities
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|packed| (index, packed)))
    }

    pub fn num_entities(&self) -> usize {
        self.entities.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SnapshotState {
        if self.deleted.load(Ordering::Acquire) {
            SnapshotState::Deleted
        } else if self.ref_count() > 0 {
            SnapshotState::Referenced
        } else {
            SnapshotState::Populated
        }
    }

    pub(crate) fn add_ref(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count left after this release.
    pub(crate) fn release_ref(&self) -> usize {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "snapshot {} released below zero", self.id);
        previous - 1
    }

    /// Marks the snapshot deleted. Returns false if it already was.
    pub(crate) fn mark_deleted(&self) -> bool {
        !self.deleted.swap(true, Ordering::AcqRel)
    }
}

/// Counted handle to a published snapshot.
///
/// Cloning adds a reference and dropping releases it. When the last reference
/// goes the snapshot leaves the manager's live list.
pub struct SnapshotRef {
    snapshot: Arc<Snapshot>,
    shared: Arc<Shared>,
}

impl SnapshotRef {
    /// Wraps a snapshot whose reference was already counted by the caller.
    pub(crate) fn adopt(snapshot: Arc<Snapshot>, shared: Arc<Shared>) -> Self {
        Self { snapshot, shared }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.snapshot, &b.snapshot)
    }
}

impl Deref for SnapshotRef {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl Clone for SnapshotRef {
    fn clone(&self) -> Self {
        self.snapshot.add_ref();
        Self {
            snapshot: self.snapshot.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl Drop for SnapshotRef {
    fn drop(&mut self) {
        self.shared.release(&self.snapshot);
    }
}

impl fmt::Debug for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRef")
            .field("id", &self.snapshot.id)
            .field("tick", &self.snapshot.tick)
            .field("ref_count", &self.snapshot.ref_count())
            .finish()
    }
}
