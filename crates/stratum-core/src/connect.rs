use crate::error::{Result, StratumError};

/// Supplies a connection string or equivalent backend locator.
///
/// Failures resolving it surface as `StratumError::Config`, never as a
/// repository operation error.
pub trait ConnectionStringProvider: Send + Sync {
    fn connection_string(&self) -> Result<String>;
}

/// Provider of a fixed, pre-resolved connection string.
pub struct StaticConnectionString {
    value: String,
}

impl StaticConnectionString {
    /// Rejects empty or whitespace-only values.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(StratumError::Config(
                "the connection string cannot be empty or only white-space".to_string(),
            ));
        }
        Ok(Self { value })
    }
}

impl ConnectionStringProvider for StaticConnectionString {
    fn connection_string(&self) -> Result<String> {
        Ok(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provides_fixed_value() {
        let provider = StaticConnectionString::new("repository.db").unwrap();
        assert_eq!(provider.connection_string().unwrap(), "repository.db");
    }

    #[test]
    fn rejects_blank_values() {
        assert!(matches!(
            StaticConnectionString::new("   "),
            Err(StratumError::Config(_))
        ));
        assert!(matches!(
            StaticConnectionString::new(""),
            Err(StratumError::Config(_))
        ));
    }
}
