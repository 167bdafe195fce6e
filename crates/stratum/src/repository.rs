//! Repository façade
//!
//! Coordinates one entry store per entity type, resolved lazily through
//! a `TypeId`-keyed registry, and owns the transaction lifecycle. The
//! transaction-creation lock is the only built-in synchronization:
//! mutating operations against one repository instance must otherwise be
//! serialized by the caller.

use crate::scope::TransactionScope;
use crate::transaction::{Transaction, TxnShared, TxnState};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stratum_core::{
    Backend, Entity, EntryStore, Hooks, NoHooks, QuerySpec, RepositoryConfig, Result, StoreMap,
    StratumError,
};
use tokio::sync::Semaphore;

/// Lazily evaluated view over one entity type's entries.
///
/// Creating a query reads nothing; the store is scanned when iteration
/// starts, so enumeration reflects the contents at enumeration time.
/// `restart` discards the current pass, and the next `next()` re-reads
/// the store. Filtering is applied during iteration.
pub struct Query<T> {
    scan: Arc<dyn Fn() -> Result<Vec<T>> + Send + Sync>,
    spec: Option<QuerySpec<T>>,
    pass: Option<std::vec::IntoIter<T>>,
}

impl<T> Query<T> {
    /// Discard the current pass so the next `next()` scans again.
    pub fn restart(&mut self) {
        self.pass = None;
    }
}

impl<T> Iterator for Query<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.pass.is_none() {
            match (self.scan)() {
                Ok(items) => self.pass = Some(items.into_iter()),
                Err(e) => {
                    tracing::warn!(error = %e, "query enumeration failed");
                    self.pass = Some(Vec::new().into_iter());
                }
            }
        }
        let items = self.pass.as_mut()?;
        loop {
            let item = items.next()?;
            match &self.spec {
                Some(spec) if !spec.matches(&item) => continue,
                _ => return Some(item),
            }
        }
    }
}

pub struct Repository<B: Backend> {
    backend: B,
    stores: StoreMap,
    hooks: Arc<dyn Hooks>,
    txn_gate: Semaphore,
    current: Mutex<Option<Arc<TxnShared>>>,
    disposed: AtomicBool,
    config: RepositoryConfig,
}

impl<B: Backend> Repository<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, RepositoryConfig::default())
    }

    pub fn with_config(backend: B, config: RepositoryConfig) -> Self {
        Self {
            backend,
            stores: Arc::new(Mutex::new(HashMap::new())),
            hooks: Arc::new(NoHooks),
            txn_gate: Semaphore::new(1),
            current: Mutex::new(None),
            disposed: AtomicBool::new(false),
            config,
        }
    }

    /// Replace the pre-operation hook object.
    pub fn with_hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Release the repository. Every subsequent operation fails fast
    /// with `StratumError::Disposed`.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            Err(StratumError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Run `f` against the store for `T`, creating the store on first
    /// access. Stores live for the repository's whole lifetime.
    fn with_store<T: Entity, R>(
        &self,
        f: impl FnOnce(&mut B::Store<T>) -> Result<R>,
    ) -> Result<R> {
        let mut stores = self.stores.lock();
        let key = TypeId::of::<T>();
        if !stores.contains_key(&key) {
            let store = self.backend.open_store::<T>()?;
            stores.insert(key, Box::new(store));
        }
        let store = stores
            .get_mut(&key)
            .and_then(|boxed| boxed.as_any_mut().downcast_mut::<B::Store<T>>())
            .ok_or_else(|| {
                StratumError::operation("store", None, "entry store type mismatch")
            })?;
        f(store)
    }

    /// Add `instance` to the store for its type. With `save_changes`
    /// the staged mutation flushes immediately. Returns the stored
    /// instance, which for the in-memory backend may be an existing
    /// equal entity rather than `instance` itself.
    pub async fn add<T: Entity>(&self, instance: T, save_changes: bool) -> Result<T> {
        self.ensure_open()?;
        self.hooks
            .before_add(&instance as &(dyn Any + Send + Sync))
            .await
            .map_err(|e| e.retag("add", None))?;
        let entry = self
            .with_store::<T, _>(|store| store.add(instance))
            .map_err(|e| e.retag("add", None))?;
        if save_changes {
            self.save_changes().await?;
        }
        Ok(entry.into_entity())
    }

    /// True when any stored entity of type `T` matches the specification.
    pub async fn exists<T: Entity>(&self, spec: &QuerySpec<T>) -> Result<bool> {
        self.ensure_open()?;
        let items = self.with_store::<T, _>(|store| {
            let text = spec
                .label()
                .map(str::to_string)
                .or_else(|| store.select_text());
            store.scan().map_err(|e| e.retag("exists", text))
        })?;
        Ok(items.iter().any(|entity| spec.matches(entity)))
    }

    /// Materialize all entities of type `T` into an owned list.
    pub async fn get<T: Entity>(&self) -> Result<Vec<T>> {
        self.ensure_open()?;
        self.with_store::<T, _>(|store| {
            let text = store.select_text();
            store.scan().map_err(|e| e.retag("get", text))
        })
    }

    /// Materialize the entities of type `T` matching the specification.
    pub async fn get_matching<T: Entity>(&self, spec: &QuerySpec<T>) -> Result<Vec<T>> {
        self.ensure_open()?;
        let items = self.with_store::<T, _>(|store| {
            let text = spec
                .label()
                .map(str::to_string)
                .or_else(|| store.select_text());
            store.scan().map_err(|e| e.retag("get", text))
        })?;
        Ok(items
            .into_iter()
            .filter(|entity| spec.matches(entity))
            .collect())
    }

    /// The scan closure handed to a `Query`: resolves the store through
    /// the registry at enumeration time. A registry restored by a
    /// rollback may no longer hold the store; that reads as empty.
    fn deferred_scan<T: Entity>(
        &self,
        text: Option<String>,
    ) -> Arc<dyn Fn() -> Result<Vec<T>> + Send + Sync> {
        let stores = Arc::clone(&self.stores);
        Arc::new(move || {
            let stores = stores.lock();
            match stores
                .get(&TypeId::of::<T>())
                .and_then(|boxed| boxed.as_any().downcast_ref::<B::Store<T>>())
            {
                Some(store) => store.scan().map_err(|e| e.retag("query", text.clone())),
                None => Ok(Vec::new()),
            }
        })
    }

    /// A lazily evaluated view over the entries of type `T`.
    pub fn query<T: Entity>(&self) -> Result<Query<T>> {
        self.ensure_open()?;
        let text = self.with_store::<T, _>(|store| Ok(store.select_text()))?;
        Ok(Query {
            scan: self.deferred_scan::<T>(text),
            spec: None,
            pass: None,
        })
    }

    pub fn query_matching<T: Entity>(&self, spec: &QuerySpec<T>) -> Result<Query<T>> {
        self.ensure_open()?;
        let text = self.with_store::<T, _>(|store| {
            Ok(spec
                .label()
                .map(str::to_string)
                .or_else(|| store.select_text()))
        })?;
        Ok(Query {
            scan: self.deferred_scan::<T>(text),
            spec: Some(spec.clone()),
            pass: None,
        })
    }

    /// Remove `instance` permanently. Fails with
    /// `StratumError::NotPresent` when no equal entity is stored.
    pub async fn remove<T: Entity>(&self, instance: T, save_changes: bool) -> Result<T> {
        self.ensure_open()?;
        self.hooks
            .before_remove(&instance as &(dyn Any + Send + Sync))
            .await
            .map_err(|e| e.retag("remove", None))?;
        let entry = self
            .with_store::<T, _>(|store| store.remove(&instance))
            .map_err(|e| e.retag("remove", None))?;
        if save_changes {
            self.save_changes().await?;
        }
        Ok(entry.into_entity())
    }

    /// Replace the stored entity equal to `instance` with `instance`.
    pub async fn update<T: Entity>(&self, instance: T, save_changes: bool) -> Result<T> {
        self.ensure_open()?;
        self.hooks
            .before_update(&instance as &(dyn Any + Send + Sync))
            .await
            .map_err(|e| e.retag("update", None))?;
        let entry = self
            .with_store::<T, _>(|store| store.update(instance))
            .map_err(|e| e.retag("update", None))?;
        if save_changes {
            self.save_changes().await?;
        }
        Ok(entry.into_entity())
    }

    /// Flush staged mutations across every entity-type store as one
    /// atomic backend write. Returns the count of affected entities.
    /// This is the sole point where a concurrency conflict surfaces.
    pub async fn save_changes(&self) -> Result<usize> {
        self.ensure_open()?;

        let started = self.backend.save_begin()?;

        let flushed: Result<usize> = {
            let mut stores = self.stores.lock();
            let mut total = 0usize;
            let mut failure = None;
            for store in stores.values_mut() {
                match store.flush() {
                    Ok(count) => total += count,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(total),
            }
        };

        let total = match flushed {
            Ok(total) => total,
            Err(e) => {
                self.backend.save_abort(started);
                return Err(e);
            }
        };

        if let Err(e) = self.backend.save_commit(started) {
            self.backend.save_abort(started);
            return Err(e);
        }

        let mut stores = self.stores.lock();
        for store in stores.values_mut() {
            store.clear_staged();
        }
        tracing::debug!(affected = total, "save_changes flushed staged mutations");
        Ok(total)
    }

    /// Begin a new transaction.
    ///
    /// Acquires the repository-wide creation lock, bounded by the
    /// configured timeout. A stale terminal transaction left behind by a
    /// prior caller is silently released; a previous transaction that is
    /// still uncommitted is an error. The lock is released once the new
    /// transaction has been constructed, not for its whole lifetime.
    pub async fn begin_transaction(&self) -> Result<Transaction> {
        self.ensure_open()?;

        let bound = self.config.lock_timeout();
        let permit = tokio::time::timeout(bound, self.txn_gate.acquire())
            .await
            .map_err(|_| {
                StratumError::Timeout(format!(
                    "transaction lock was not acquired within {bound:?}"
                ))
            })?
            .map_err(|e| StratumError::operation("begin_transaction", None, e.to_string()))?;

        {
            let mut current = self.current.lock();
            if let Some(shared) = current.as_ref() {
                if shared.state() == TxnState::Uncommitted {
                    return Err(StratumError::InvalidTransition(
                        "commit or rollback the current transaction first".to_string(),
                    ));
                }
                // Terminal transaction left by a prior caller.
                tracing::debug!("releasing stale terminal transaction");
                *current = None;
            }
        }

        let inner = self.backend.begin(Arc::clone(&self.stores)).await?;
        let txn = Transaction::new(inner, self.config.rollback_timeout());
        *self.current.lock() = Some(txn.shared());
        tracing::debug!(id = %txn.id(), "transaction started");

        drop(permit);
        Ok(txn)
    }

    /// Begin a transaction wrapped in a rollback-on-release scope.
    pub async fn begin_transaction_scope(&self) -> Result<TransactionScope> {
        TransactionScope::new(self.begin_transaction().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_query(calls: Arc<AtomicUsize>, spec: Option<QuerySpec<i32>>) -> Query<i32> {
        Query {
            scan: Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3, 4, 5, 6])
            }),
            spec,
            pass: None,
        }
    }

    #[test]
    fn query_iterator_filters_during_iteration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = QuerySpec::new(|n: &i32| n % 2 == 0);
        let query = counting_query(Arc::clone(&calls), Some(spec));
        assert_eq!(query.collect::<Vec<_>>(), vec![2, 4, 6]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn query_scans_on_first_next_and_restart_rescans() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut query = counting_query(Arc::clone(&calls), None);

        // Nothing is read until iteration starts.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(query.by_ref().count(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // An exhausted pass does not scan again on its own.
        assert_eq!(query.by_ref().count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        query.restart();
        assert_eq!(query.by_ref().count(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
