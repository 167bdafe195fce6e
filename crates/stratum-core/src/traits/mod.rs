pub mod backend;
pub mod hooks;
pub mod store;

pub use backend::{Backend, BackendTxn};
pub use hooks::{Hooks, NoHooks};
pub use store::{AnyStore, EntryStore, StoreMap};
