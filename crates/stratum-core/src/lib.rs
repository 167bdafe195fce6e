//! Stratum Core: traits and types for the stratum repository layer
//!
//! This crate defines the backend-agnostic abstractions of a typed,
//! transactional entity repository:
//! - Entry stores: per-entity-type collections (in-memory or durable)
//!   behind one capability contract
//! - Backends: pluggable storage providers with transaction support
//! - Query specifications: single-predicate filters passed to reads
//! - Concurrency reporting: structured conflict items carrying both the
//!   caller's and the backend's view of every colliding record
//!
//! Key features:
//! - One uncommitted transaction per repository, enforced by a timed lock
//! - Guaranteed rollback of abandoned transactions
//! - Uniform add/remove/update/query semantics across backends

pub mod config;
pub mod connect;
pub mod entity;
pub mod entry;
pub mod error;
pub mod query;
pub mod traits;

pub use config::RepositoryConfig;
pub use connect::{ConnectionStringProvider, StaticConnectionString};
pub use entity::Entity;
pub use entry::Entry;
pub use error::{ConcurrentUpdateItem, Result, StratumError};
pub use query::QuerySpec;
pub use traits::{AnyStore, Backend, BackendTxn, EntryStore, Hooks, NoHooks, StoreMap};
