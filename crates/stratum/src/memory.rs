//! In-memory backend
//!
//! A stand-in for the durable store with identical repository semantics.
//! Each entry store is an insertion-ordered `Vec`; mutations are visible
//! immediately, and `save_changes` reports the number of mutations since
//! the last flush. Transactions snapshot the whole store registry at
//! begin and restore it on rollback; save points are not supported.

use async_trait::async_trait;
use std::collections::HashMap;
use std::any::{Any, TypeId};
use stratum_core::{
    AnyStore, Backend, BackendTxn, Entity, Entry, EntryStore, Result, StoreMap, StratumError,
};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

/// In-memory entry store for one entity type.
#[derive(Debug, Clone)]
pub struct MemoryEntries<T: Entity> {
    entries: Vec<T>,
    pending: usize,
}

impl<T: Entity> MemoryEntries<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pending: 0,
        }
    }

    pub fn with_entries(entries: impl IntoIterator<Item = T>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            pending: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Entity> Default for MemoryEntries<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> EntryStore<T> for MemoryEntries<T> {
    fn add(&mut self, entity: T) -> Result<Entry<T>> {
        if let Some(existing) = self.entries.iter().find(|stored| *stored == &entity) {
            // Deduplicated: hand back the existing instance unchanged.
            return Ok(Entry::new(existing.clone()));
        }
        self.entries.push(entity.clone());
        self.pending += 1;
        Ok(Entry::new(entity))
    }

    fn remove(&mut self, entity: &T) -> Result<Entry<T>> {
        match self.entries.iter().position(|stored| stored == entity) {
            Some(pos) => {
                let removed = self.entries.remove(pos);
                self.pending += 1;
                Ok(Entry::new(removed))
            }
            None => Err(StratumError::NotPresent),
        }
    }

    fn update(&mut self, entity: T) -> Result<Entry<T>> {
        match self.entries.iter().position(|stored| *stored == entity) {
            Some(pos) => {
                // Remove then append: the updated entity moves to the
                // end of enumeration order.
                self.entries.remove(pos);
                self.entries.push(entity.clone());
                self.pending += 1;
                Ok(Entry::new(entity))
            }
            None => Err(StratumError::NotPresent),
        }
    }

    fn scan(&self) -> Result<Vec<T>> {
        Ok(self.entries.clone())
    }
}

impl<T: Entity> AnyStore for MemoryEntries<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn flush(&mut self) -> Result<usize> {
        Ok(self.pending)
    }

    fn clear_staged(&mut self) {
        self.pending = 0;
    }

    fn boxed_clone(&self) -> Box<dyn AnyStore> {
        Box::new(self.clone())
    }
}

/// Snapshot-based transaction over the store registry.
struct MemoryTxn {
    id: Uuid,
    stores: StoreMap,
    snapshot: Option<HashMap<TypeId, Box<dyn AnyStore>>>,
}

impl MemoryTxn {
    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.stores.lock() = snapshot;
        }
    }
}

#[async_trait]
impl BackendTxn for MemoryTxn {
    fn id(&self) -> Uuid {
        self.id
    }

    fn supports_savepoints(&self) -> bool {
        false
    }

    async fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.restore();
        Ok(())
    }

    async fn savepoint(&mut self, _name: &str) -> Result<()> {
        Err(StratumError::SavePointsNotSupported)
    }

    async fn rollback_to(&mut self, _name: &str) -> Result<()> {
        Err(StratumError::SavePointsNotSupported)
    }

    fn rollback_blocking(&mut self) -> Result<()> {
        self.restore();
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Store<T: Entity> = MemoryEntries<T>;

    fn open_store<T: Entity>(&self) -> Result<MemoryEntries<T>> {
        Ok(MemoryEntries::new())
    }

    async fn begin(&self, stores: StoreMap) -> Result<Box<dyn BackendTxn>> {
        let snapshot = stores
            .lock()
            .iter()
            .map(|(type_id, store)| (*type_id, store.boxed_clone()))
            .collect();
        Ok(Box::new(MemoryTxn {
            id: Uuid::new_v4(),
            stores,
            snapshot: Some(snapshot),
        }))
    }

    fn save_begin(&self) -> Result<bool> {
        Ok(false)
    }

    fn save_commit(&self, _started: bool) -> Result<()> {
        Ok(())
    }

    fn save_abort(&self, _started: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag(String);

    impl Entity for Tag {
        fn store_name() -> &'static str {
            "tags"
        }
    }

    #[test]
    fn add_deduplicates_by_equality() {
        let mut store = MemoryEntries::new();
        store.add(Tag("a".into())).unwrap();
        let entry = store.add(Tag("a".into())).unwrap();
        assert_eq!(entry.entity(), &Tag("a".into()));
        assert_eq!(store.len(), 1);
        // The duplicate staged nothing.
        assert_eq!(store.flush().unwrap(), 1);
    }

    #[test]
    fn update_moves_entity_to_end() {
        let mut store = MemoryEntries::with_entries([Tag("a".into()), Tag("b".into())]);
        store.update(Tag("a".into())).unwrap();
        assert_eq!(
            store.scan().unwrap(),
            vec![Tag("b".into()), Tag("a".into())]
        );
    }

    #[test]
    fn remove_takes_first_match_only() {
        let mut store = MemoryEntries::with_entries([Tag("a".into()), Tag("b".into())]);
        let entry = store.remove(&Tag("a".into())).unwrap();
        assert_eq!(entry.into_entity(), Tag("a".into()));
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.remove(&Tag("missing".into())),
            Err(StratumError::NotPresent)
        ));
    }

    #[test]
    fn flush_counts_mutations_since_clear() {
        let mut store = MemoryEntries::new();
        store.add(Tag("a".into())).unwrap();
        store.add(Tag("b".into())).unwrap();
        store.remove(&Tag("a".into())).unwrap();
        assert_eq!(store.flush().unwrap(), 3);
        store.clear_staged();
        assert_eq!(store.flush().unwrap(), 0);
    }

    #[tokio::test]
    async fn async_forms_delegate() {
        let mut store = MemoryEntries::new();
        store.add_async(Tag("a".into())).await.unwrap();
        assert_eq!(store.scan_async().await.unwrap().len(), 1);
    }
}
