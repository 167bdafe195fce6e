//! SQLite backend
//!
//! Owns the single write connection shared by every entry store and
//! transaction opened against it. Two backends opened on the same file
//! coordinate through SQLite itself; the row version counters turn a
//! lost write race into a reportable conflict instead of a silent
//! overwrite.

use crate::config::{SqliteConfig, SynchronousMode};
use crate::entries::SqliteEntries;
use crate::txn::SqliteTxn;
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::sync::{Arc, Mutex};
use stratum_core::{
    Backend, BackendTxn, ConnectionStringProvider, Entity, Result, StoreMap, StratumError,
};

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    config: SqliteConfig,
}

impl SqliteBackend {
    /// Open the database file named by the configuration, creating it
    /// (and its parent directory) if needed.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StratumError::Config(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| StratumError::Config(format!("cannot open {}: {e}", config.path.display())))?;

        Self::configure_connection(&conn, &config)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Open using a resolved connection string (the database file path),
    /// keeping the non-path settings of `config`. Resolution failures
    /// surface as configuration errors.
    pub fn open_with_provider(
        provider: &dyn ConnectionStringProvider,
        config: SqliteConfig,
    ) -> Result<Self> {
        let path = provider.connection_string()?;
        Self::open(SqliteConfig {
            path: path.into(),
            ..config
        })
    }

    /// The underlying connection, for migrations and custom queries.
    pub fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn configure_connection(conn: &Connection, cfg: &SqliteConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| StratumError::Config(e.to_string()))?;
        }

        let sync_mode = match cfg.synchronous {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        };
        conn.pragma_update(None, "synchronous", sync_mode)
            .map_err(|e| StratumError::Config(e.to_string()))?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StratumError::Config(e.to_string()))?;

        conn.pragma_update(None, "cache_size", cfg.cache_size)
            .map_err(|e| StratumError::Config(e.to_string()))?;

        // Let a second writer on the same file queue briefly instead of
        // failing outright on lock contention.
        conn.busy_timeout(std::time::Duration::from_millis(5000))
            .map_err(|e| StratumError::Config(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    type Store<T: Entity> = SqliteEntries<T>;

    fn open_store<T: Entity>(&self) -> Result<SqliteEntries<T>> {
        SqliteEntries::new(Arc::clone(&self.conn))
    }

    async fn begin(&self, _stores: StoreMap) -> Result<Box<dyn BackendTxn>> {
        let txn = SqliteTxn::begin(Arc::clone(&self.conn))?;
        Ok(Box::new(txn))
    }

    fn save_begin(&self) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| StratumError::operation("save_changes", None, e))?;
            Ok(true)
        } else {
            // An explicit transaction is active; it owns atomicity.
            Ok(false)
        }
    }

    fn save_commit(&self, started: bool) -> Result<()> {
        if started {
            let conn = self.conn.lock().unwrap();
            conn.execute_batch("COMMIT")
                .map_err(|e| StratumError::operation("save_changes", None, e))?;
        }
        Ok(())
    }

    fn save_abort(&self, started: bool) {
        if started {
            let conn = self.conn.lock().unwrap();
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "rollback of implicit save group failed");
            }
        }
    }
}
