//! SQLite-backed durable store implementation
//!
//! Stores each entity type in its own table as a JSON body plus a row
//! version counter used for optimistic concurrency detection.
//!
//! Key features:
//! - Unit-of-work staging: mutations collect in the entry store and execute
//!   at save time, grouped into one atomic write
//! - Version-guarded updates and deletes; a lost race yields a
//!   structured conflict report with both sides of every colliding row
//! - Transactions with save-point support
//! - WAL mode for better concurrency

pub mod config;
pub mod entries;
pub mod store;
pub mod txn;

pub use config::{SqliteConfig, SynchronousMode};
pub use entries::SqliteEntries;
pub use store::SqliteBackend;
pub use txn::SqliteTxn;

pub(crate) fn ensure_identifier(name: &str) -> stratum_core::Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(stratum_core::StratumError::Config(format!(
            "'{name}' is not a valid identifier"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::ensure_identifier;

    #[test]
    fn identifier_validation() {
        assert!(ensure_identifier("characters").is_ok());
        assert!(ensure_identifier("_migrations_2").is_ok());
        assert!(ensure_identifier("").is_err());
        assert!(ensure_identifier("2fast").is_err());
        assert!(ensure_identifier("drop table;--").is_err());
    }
}
