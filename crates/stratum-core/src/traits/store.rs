//! Entry store contracts
//!
//! An entry store is the per-entity-type backing collection of a
//! repository. `EntryStore<T>` is the typed capability contract shared
//! by the in-memory and durable implementations; `AnyStore` is its
//! type-erased face, which lets the repository keep one lazily-built
//! registry of stores keyed by `TypeId` and flush them uniformly.

use crate::entity::Entity;
use crate::entry::Entry;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// The repository's registry of type-erased stores, shared with backend
/// transactions that need to snapshot or restore it.
pub type StoreMap = Arc<Mutex<HashMap<TypeId, Box<dyn AnyStore>>>>;

/// Per-entity-type backing collection.
///
/// Insertion order is the enumeration order. Mutations against a durable
/// backend are staged and take effect at the repository's save point;
/// in-memory mutations are visible immediately.
#[async_trait]
pub trait EntryStore<T: Entity>: Send {
    /// Add an entity. The in-memory variant deduplicates: when an equal
    /// entity already exists, the returned entry wraps the existing
    /// instance and nothing is inserted. A durable backend stages the
    /// insert and leaves duplicate detection to its own constraints.
    fn add(&mut self, entity: T) -> Result<Entry<T>>;

    /// Asynchronous add. Suspends only while the backend acquires
    /// tracking state; no physical write happens before the flush.
    async fn add_async(&mut self, entity: T) -> Result<Entry<T>> {
        self.add(entity)
    }

    /// Remove the first entity equal to `entity`. Fails with
    /// `StratumError::NotPresent` when no match exists.
    fn remove(&mut self, entity: &T) -> Result<Entry<T>>;

    /// Replace the entity equal to `entity` with the given value. The
    /// in-memory variant removes then appends, which moves the entity to
    /// the end of enumeration order. Fails with `NotPresent` when no
    /// match exists.
    fn update(&mut self, entity: T) -> Result<Entry<T>>;

    /// Materialize the current contents. For a durable backend this is a
    /// backend query and does not see unsaved staged mutations.
    fn scan(&self) -> Result<Vec<T>>;

    async fn scan_async(&self) -> Result<Vec<T>> {
        self.scan()
    }

    /// Textual form of the store's read query, for error reports.
    fn select_text(&self) -> Option<String> {
        None
    }
}

/// Type-erased store surface used by the repository registry.
pub trait AnyStore: Send {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Execute staged mutations against the backend and return the
    /// number of affected records. Staging is retained until
    /// `clear_staged` so a failed multi-store flush can be rolled back
    /// without losing pending work.
    fn flush(&mut self) -> Result<usize>;

    /// Discard staging after the surrounding flush has been committed.
    fn clear_staged(&mut self);

    /// Clone the store as a boxed trait object. Used by the in-memory
    /// backend to snapshot the registry at transaction begin.
    fn boxed_clone(&self) -> Box<dyn AnyStore>;
}
