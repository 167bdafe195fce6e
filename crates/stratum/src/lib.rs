//! Stratum: a transactional, backend-pluggable entity repository
//!
//! Stratum lets callers add, remove, update, and query typed entities
//! against a pluggable storage backend, with:
//! - **Transactions**: one uncommitted transaction per repository,
//!   enforced by a timed exclusive lock; abandoned transactions are
//!   always rolled back
//! - **Conflict reporting**: optimistic-concurrency failures surface as
//!   structured reports carrying both sides of every colliding record
//! - **Uniform semantics**: the in-memory and SQLite backends present
//!   identical add/remove/update/query/exists behavior
//!
//! # Quick Start
//!
//! ```no_run
//! use stratum::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Character { id: u64, name: String }
//!
//! impl Entity for Character {
//!     fn store_name() -> &'static str { "characters" }
//! }
//!
//! # async fn run() -> Result<()> {
//! let repo = Repository::new(MemoryBackend::new());
//!
//! let mut txn = repo.begin_transaction().await?;
//! repo.add(Character { id: 1, name: "Mickey".into() }, false).await?;
//! repo.save_changes().await?;
//! txn.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod prelude;
pub mod repository;
pub mod scope;
pub mod transaction;

// Re-export core types
pub use stratum_core::{
    AnyStore, Backend, BackendTxn, ConcurrentUpdateItem, ConnectionStringProvider, Entity, Entry,
    EntryStore, Hooks, NoHooks, QuerySpec, RepositoryConfig, Result, StaticConnectionString,
    StoreMap, StratumError,
};

// Re-export implementations
pub use stratum_sqlite::{SqliteBackend, SqliteConfig, SynchronousMode};

// Re-export main types from this crate
pub use memory::{MemoryBackend, MemoryEntries};
pub use repository::{Query, Repository};
pub use scope::TransactionScope;
pub use transaction::{Transaction, TxnState};
