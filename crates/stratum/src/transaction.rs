//! Repository transaction state machine
//!
//! `Uncommitted` is the initial state; `Committed` and `Reverted` are
//! terminal. The state only advances after the backend call completes,
//! so a cancelled commit or rollback leaves the transaction usable.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stratum_core::{BackendTxn, Result, StratumError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Uncommitted,
    Committed,
    Reverted,
}

/// State shared between a live transaction and the repository that
/// created it, so a later `begin_transaction` can tell a stale terminal
/// transaction from one that is still open.
#[derive(Debug)]
pub(crate) struct TxnShared {
    state: Mutex<TxnState>,
}

impl TxnShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TxnState::Uncommitted),
        })
    }

    pub(crate) fn state(&self) -> TxnState {
        *self.state.lock()
    }

    fn set(&self, state: TxnState) {
        *self.state.lock() = state;
    }
}

pub struct Transaction {
    inner: Box<dyn BackendTxn>,
    shared: Arc<TxnShared>,
    rollback_timeout: Duration,
}

impl Transaction {
    pub(crate) fn new(inner: Box<dyn BackendTxn>, rollback_timeout: Duration) -> Self {
        Self {
            inner,
            shared: TxnShared::new(),
            rollback_timeout,
        }
    }

    pub(crate) fn shared(&self) -> Arc<TxnShared> {
        Arc::clone(&self.shared)
    }

    /// Backend-assigned identifier.
    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn state(&self) -> TxnState {
        self.shared.state()
    }

    pub fn supports_savepoints(&self) -> bool {
        self.inner.supports_savepoints()
    }

    pub fn rollback_timeout(&self) -> Duration {
        self.rollback_timeout
    }

    /// Commit the transaction. A no-op when already committed; fails
    /// when already reverted.
    pub async fn commit(&mut self) -> Result<()> {
        match self.state() {
            TxnState::Committed => Ok(()),
            TxnState::Reverted => Err(StratumError::InvalidTransition(
                "the transaction has already been reverted and commit is not possible".to_string(),
            )),
            TxnState::Uncommitted => {
                self.inner.commit().await?;
                self.shared.set(TxnState::Committed);
                tracing::debug!(id = %self.id(), "transaction committed");
                Ok(())
            }
        }
    }

    /// Roll back the transaction. A no-op when already reverted; fails
    /// when already committed.
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state() {
            TxnState::Reverted => Ok(()),
            TxnState::Committed => Err(StratumError::InvalidTransition(
                "the transaction has already been committed and rollback is not possible"
                    .to_string(),
            )),
            TxnState::Uncommitted => {
                self.inner.rollback().await?;
                self.shared.set(TxnState::Reverted);
                tracing::debug!(id = %self.id(), "transaction rolled back");
                Ok(())
            }
        }
    }

    /// Create a named save point. Only valid while uncommitted and only
    /// when the backend supports save points.
    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        if !self.supports_savepoints() {
            return Err(StratumError::SavePointsNotSupported);
        }
        if self.state() != TxnState::Uncommitted {
            return Err(StratumError::InvalidTransition(
                "save points are only possible while the transaction is uncommitted".to_string(),
            ));
        }
        self.inner.savepoint(name).await
    }

    /// Roll back to a previously created save point.
    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        if !self.supports_savepoints() {
            return Err(StratumError::SavePointsNotSupported);
        }
        if self.state() != TxnState::Uncommitted {
            return Err(StratumError::InvalidTransition(
                "rollback to a save point is only possible while the transaction is uncommitted"
                    .to_string(),
            ));
        }
        self.inner.rollback_to(name).await
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.shared.state() == TxnState::Uncommitted {
            match self.inner.rollback_blocking() {
                Ok(()) => {
                    self.shared.set(TxnState::Reverted);
                    tracing::debug!(id = %self.inner.id(), "abandoned transaction rolled back");
                }
                Err(e) => {
                    tracing::error!(id = %self.inner.id(), error = %e, "rollback of abandoned transaction failed");
                }
            }
        }
    }
}
