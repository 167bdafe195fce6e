//! Common imports for working with stratum

pub use crate::memory::MemoryBackend;
pub use crate::repository::Repository;
pub use crate::scope::TransactionScope;
pub use crate::transaction::{Transaction, TxnState};
pub use stratum_core::{
    Entity, Entry, Hooks, NoHooks, QuerySpec, RepositoryConfig, Result, StratumError,
};
pub use stratum_sqlite::{SqliteBackend, SqliteConfig};
