use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One colliding record in a concurrent-update conflict.
///
/// `attempted` is the caller's in-memory instance at the time of the
/// failed write; `stored` is the backend's current value for the same
/// record, or `None` if another writer deleted it in the meantime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrentUpdateItem {
    pub attempted: serde_json::Value,
    pub stored: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum StratumError {
    /// Any unanticipated backend or internal failure during a repository
    /// operation. Carries the operation name and, when derivable, the
    /// textual form of the query that was being executed.
    #[error("the {operation} operation failed")]
    Operation {
        operation: String,
        query: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend detected a stale write; one item per colliding record.
    #[error("concurrent update detected for {} record(s)", items.len())]
    ConcurrentUpdate { items: Vec<ConcurrentUpdateItem> },

    /// Remove/update target does not exist. A caller-programming-error
    /// signal, never retried.
    #[error("the entity is not part of the current store")]
    NotPresent,

    /// Commit/rollback of a terminal transaction, or beginning a new
    /// transaction while one is still uncommitted.
    #[error("invalid transaction state: {0}")]
    InvalidTransition(String),

    #[error("the current backend does not support save points")]
    SavePointsNotSupported,

    #[error("the repository has been disposed")]
    Disposed,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StratumError>;

impl StratumError {
    /// Build an operation failure from its parts.
    pub fn operation(
        operation: impl Into<String>,
        query: Option<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        StratumError::Operation {
            operation: operation.into(),
            query,
            source: source.into(),
        }
    }

    /// Rewrite the operation name (and attach query text, if absent) of
    /// an `Operation` failure surfacing through a higher-level call.
    /// Every other kind passes through unchanged.
    pub fn retag(self, operation: &str, query: Option<String>) -> Self {
        match self {
            StratumError::Operation {
                query: inner_query,
                source,
                ..
            } => StratumError::Operation {
                operation: operation.to_string(),
                query: query.or(inner_query),
                source,
            },
            other => other,
        }
    }

    /// The textual form of the query behind an operation failure, if any.
    pub fn query_text(&self) -> Option<&str> {
        match self {
            StratumError::Operation { query, .. } => query.as_deref(),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StratumError::ConcurrentUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_display_carries_name() {
        let err = StratumError::operation("save_changes", None, "disk full");
        assert_eq!(err.to_string(), "the save_changes operation failed");
        assert!(err.query_text().is_none());
    }

    #[test]
    fn retag_rewrites_operation_and_keeps_query() {
        let err = StratumError::operation("scan", Some("SELECT body FROM users".into()), "boom");
        let err = err.retag("exists", None);
        match &err {
            StratumError::Operation { operation, query, .. } => {
                assert_eq!(operation, "exists");
                assert_eq!(query.as_deref(), Some("SELECT body FROM users"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn retag_leaves_conflicts_alone() {
        let err = StratumError::ConcurrentUpdate { items: Vec::new() };
        assert!(err.retag("save_changes", None).is_conflict());
    }
}
