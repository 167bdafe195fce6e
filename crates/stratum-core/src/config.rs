use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a repository instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// How long a caller waits for the transaction-creation lock before
    /// failing with a timeout.
    /// Default: 60 seconds
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Bound on the rollback performed when an uncommitted transaction
    /// is released.
    /// Default: 30 seconds
    #[serde(default = "default_rollback_timeout_secs")]
    pub rollback_timeout_secs: u64,
}

fn default_lock_timeout_secs() -> u64 {
    60
}

fn default_rollback_timeout_secs() -> u64 {
    30
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            rollback_timeout_secs: default_rollback_timeout_secs(),
        }
    }
}

impl RepositoryConfig {
    pub fn with_lock_timeout_secs(mut self, secs: u64) -> Self {
        self.lock_timeout_secs = secs;
        self
    }

    pub fn with_rollback_timeout_secs(mut self, secs: u64) -> Self {
        self.rollback_timeout_secs = secs;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_secs(self.rollback_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.lock_timeout(), Duration::from_secs(60));
        assert_eq!(config.rollback_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let config: RepositoryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.lock_timeout_secs, 60);
        assert_eq!(config.rollback_timeout_secs, 30);
    }

    #[test]
    fn builders() {
        let config = RepositoryConfig::default()
            .with_lock_timeout_secs(1)
            .with_rollback_timeout_secs(2);
        assert_eq!(config.lock_timeout(), Duration::from_secs(1));
        assert_eq!(config.rollback_timeout(), Duration::from_secs(2));
    }
}
