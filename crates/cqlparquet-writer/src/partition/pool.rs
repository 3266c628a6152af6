//! Bounded pool of open partition writers with least-recently-used eviction.
//!
//! Writers live in an arena of slots. Every access stamps the slot with a
//! fresh tick from a monotonically increasing counter; `recency` orders
//! slots by their latest tick, so the first entry is always the eviction
//! candidate. The pool is the only owner of its writers.

use std::collections::{BTreeMap, HashMap};

use crate::stream_writer::StreamWriter;

pub(crate) struct PooledWriter {
    pub(crate) key: String,
    pub(crate) writer: StreamWriter,
    tick: u64,
}

pub(crate) struct WriterPool {
    capacity: usize,
    slots: Vec<Option<PooledWriter>>,
    free: Vec<usize>,
    by_key: HashMap<String, usize>,
    recency: BTreeMap<u64, usize>,
    next_tick: u64,
}

impl WriterPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            by_key: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Look up `key` and mark it most recently used.
    pub(crate) fn touch(&mut self, key: &str) -> Option<&mut StreamWriter> {
        let slot = *self.by_key.get(key)?;
        let tick = self.bump();
        let entry = self.slots.get_mut(slot)?.as_mut()?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, slot);
        Some(&mut entry.writer)
    }

    /// Insert a writer for a key not currently pooled. The caller evicts
    /// first when the pool is full.
    pub(crate) fn insert(&mut self, key: String, writer: StreamWriter) -> &mut StreamWriter {
        let tick = self.bump();
        let slot = self.free.pop().unwrap_or_else(|| {
            self.slots.push(None);
            self.slots.len() - 1
        });
        self.by_key.insert(key.clone(), slot);
        self.recency.insert(tick, slot);

        let entry = self.slots[slot].insert(PooledWriter { key, writer, tick });
        &mut entry.writer
    }

    fn take_slot(&mut self, slot: usize) -> Option<PooledWriter> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.recency.remove(&entry.tick);
        self.by_key.remove(&entry.key);
        self.free.push(slot);
        Some(entry)
    }

    /// Remove and return the least recently used writer.
    pub(crate) fn pop_lru(&mut self) -> Option<PooledWriter> {
        let (_, &slot) = self.recency.first_key_value()?;
        self.take_slot(slot)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<PooledWriter> {
        let slot = *self.by_key.get(key)?;
        self.take_slot(slot)
    }

    /// Remove every writer, least recently used first.
    pub(crate) fn drain(&mut self) -> Vec<PooledWriter> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    pub(crate) fn writers_mut(&mut self) -> impl Iterator<Item = &mut PooledWriter> {
        self.slots.iter_mut().flatten()
    }
}
