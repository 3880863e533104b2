use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

#[derive(Debug)]
struct Slot {
    serial: u64,
    stamp: u32,
    data: Arc<[u8]>,
}

#[derive(Debug)]
struct CacheInner {
    slots: Vec<Slot>,
    clock: u32,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    fn tick(&mut self) -> u32 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    fn find(&mut self, serial: u64) -> Option<Arc<[u8]>> {
        let stamp = self.tick();
        let slot = self.slots.iter_mut().find(|slot| slot.serial == serial)?;
        slot.stamp = stamp;
        Some(slot.data.clone())
    }
}

/// Bounded cache of decompressed packed entities, keyed by serial.
///
/// Each access stamps the slot with a free-running counter; when full the slot
/// with the oldest stamp is replaced. Ages are taken with wrapping subtraction
/// so the counter may roll over.
#[derive(Debug)]
pub struct DecodeCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl DecodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                slots: Vec::with_capacity(capacity),
                clock: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn get(&self, serial: u64) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.lock();
        let found = inner.find(serial);
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    pub fn insert(&self, serial: u64, data: Arc<[u8]>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let stamp = inner.tick();

        if let Some(slot) = inner.slots.iter_mut().find(|slot| slot.serial == serial) {
            slot.stamp = stamp;
            slot.data = data;
            return;
        }

        let slot = Slot {
            serial,
            stamp,
            data,
        };
        if inner.slots.len() < self.capacity {
            inner.slots.push(slot);
            return;
        }

        let clock = inner.clock;
        if let Some(oldest) = inner
            .slots
            .iter_mut()
            .max_by_key(|slot| clock.wrapping_sub(slot.stamp))
        {
            *oldest = slot;
        }
    }

    /// Returns the cached bytes for `serial`, producing and caching them on a miss.
    /// `produce` runs without the lock held.
    pub fn get_or_insert_with<E>(
        &self,
        serial: u64,
        produce: impl FnOnce() -> Result<Arc<[u8]>, E>,
    ) -> Result<Arc<[u8]>, E> {
        if let Some(data) = self.get(serial) {
            return Ok(data);
        }
        let data = produce()?;
        self.insert(serial, data.clone());
        Ok(data)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.slots.len(),
            capacity: self.capacity,
        }
    }
}
