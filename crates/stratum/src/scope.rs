//! Transaction scope guard
//!
//! A scope owns one transaction and guarantees rollback on release when
//! the transaction was never committed. The explicit `release` path is
//! bounded by the transaction's rollback timeout and reports a timeout
//! failure; dropping the scope without releasing falls back to the
//! transaction's own drop rollback.

use crate::transaction::{Transaction, TxnState};
use stratum_core::{Result, StratumError};

#[derive(Debug)]
pub struct TransactionScope {
    txn: Option<Transaction>,
}

impl TransactionScope {
    /// Rejects a transaction that was already reverted.
    pub fn new(txn: Transaction) -> Result<Self> {
        if txn.state() == TxnState::Reverted {
            return Err(StratumError::InvalidTransition(
                "the transaction is in reverted state".to_string(),
            ));
        }
        Ok(Self { txn: Some(txn) })
    }

    pub fn transaction(&self) -> &Transaction {
        // `txn` is only vacated by `release`, which consumes the scope.
        self.txn.as_ref().expect("scope already released")
    }

    pub fn transaction_mut(&mut self) -> &mut Transaction {
        self.txn.as_mut().expect("scope already released")
    }

    /// Commit the scoped transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.transaction_mut().commit().await
    }

    /// Release the scope: if the transaction is still uncommitted it is
    /// rolled back, bounded by its rollback timeout. Exceeding the bound
    /// is a reported failure, not a silent leak.
    pub async fn release(mut self) -> Result<()> {
        let Some(mut txn) = self.txn.take() else {
            return Ok(());
        };
        if txn.state() == TxnState::Uncommitted {
            let bound = txn.rollback_timeout();
            match tokio::time::timeout(bound, txn.rollback()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(StratumError::Timeout(format!(
                        "transaction rollback did not complete within {bound:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}
