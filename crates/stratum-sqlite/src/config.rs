use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the SQLite backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode
    /// Default: true
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// SQLite cache size (in pages, negative = KB)
    /// Default: -64000 (64MB)
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    Full,
    /// fsync at critical moments (good balance)
    #[default]
    Normal,
    /// No fsync (fastest, least safe)
    Off,
}

fn default_wal_mode() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -64000 // 64MB
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: default_wal_mode(),
            synchronous: SynchronousMode::default(),
            cache_size: default_cache_size(),
        }
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_cache_size(mut self, cache_size: i32) -> Self {
        self.cache_size = cache_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SqliteConfig::new("repo.db");
        assert!(config.wal_mode);
        assert_eq!(config.synchronous, SynchronousMode::Normal);
        assert_eq!(config.cache_size, -64000);
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let config: SqliteConfig = serde_json::from_str(r#"{"path":"repo.db"}"#).unwrap();
        assert!(config.wal_mode);
        assert_eq!(config.synchronous, SynchronousMode::Normal);
    }
}
