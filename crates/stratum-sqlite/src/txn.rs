use crate::ensure_identifier;
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use stratum_core::{BackendTxn, Result, StratumError};
use uuid::Uuid;

/// One open SQLite transaction.
///
/// The repository-level wrapper enforces the state machine; this type
/// only executes the statements. `active` guards the drop-path rollback
/// against a transaction that already terminated.
pub struct SqliteTxn {
    conn: Arc<Mutex<Connection>>,
    id: Uuid,
    active: bool,
}

impl SqliteTxn {
    pub(crate) fn begin(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        conn.lock()
            .unwrap()
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StratumError::operation("begin_transaction", None, e))?;
        Ok(Self {
            conn,
            id: Uuid::new_v4(),
            active: true,
        })
    }

    fn execute(&self, sql: &str, operation: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(sql)
            .map_err(|e| StratumError::operation(operation, Some(sql.to_string()), e))
    }
}

#[async_trait]
impl BackendTxn for SqliteTxn {
    fn id(&self) -> Uuid {
        self.id
    }

    fn supports_savepoints(&self) -> bool {
        true
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", "commit")?;
        self.active = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", "rollback")?;
        self.active = false;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        ensure_identifier(name)?;
        self.execute(&format!("SAVEPOINT {name}"), "savepoint")
    }

    async fn rollback_to(&mut self, name: &str) -> Result<()> {
        ensure_identifier(name)?;
        self.execute(&format!("ROLLBACK TO {name}"), "rollback_to")
    }

    fn rollback_blocking(&mut self) -> Result<()> {
        if self.active {
            self.execute("ROLLBACK", "rollback")?;
            self.active = false;
        }
        Ok(())
    }
}
