//! Storage backend contract
//!
//! A backend supplies per-type entry stores, opens backend transactions,
//! and groups a multi-store flush into one atomic write when no explicit
//! transaction is active.

use crate::entity::Entity;
use crate::error::Result;
use crate::traits::store::{AnyStore, EntryStore, StoreMap};
use async_trait::async_trait;
use uuid::Uuid;

/// One open backend transaction.
///
/// State tracking lives in the repository-level transaction wrapper;
/// implementations only execute the backend calls. `rollback_blocking`
/// exists for the drop path, where no executor is available.
#[async_trait]
pub trait BackendTxn: Send {
    /// Backend-assigned opaque identifier.
    fn id(&self) -> Uuid;

    fn supports_savepoints(&self) -> bool;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn savepoint(&mut self, name: &str) -> Result<()>;

    async fn rollback_to(&mut self, name: &str) -> Result<()>;

    fn rollback_blocking(&mut self) -> Result<()>;
}

/// Pluggable storage provider.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Store<T: Entity>: EntryStore<T> + AnyStore + 'static;

    /// Open (or create) the backing store for one entity type.
    fn open_store<T: Entity>(&self) -> Result<Self::Store<T>>;

    /// Open one backend transaction. The store registry is handed over
    /// so snapshot-based backends can capture it; durable backends
    /// ignore it.
    async fn begin(&self, stores: StoreMap) -> Result<Box<dyn BackendTxn>>;

    /// Start an implicit write group around a flush when no explicit
    /// transaction is active. Returns whether a group was started and
    /// must be closed by `save_commit`/`save_abort`.
    fn save_begin(&self) -> Result<bool>;

    fn save_commit(&self, started: bool) -> Result<()>;

    fn save_abort(&self, started: bool);
}
