//! Error types for state containers and the keyed store.

use thiserror::Error;

/// Shape of the adapter `Store::persist` expects, shown when persistence
/// is used before one is registered.
const PERSISTENCE_USAGE: &str = "\
register a persistence adapter to save state to your preferred storage, e.g.
store.persist(PersistConfig::new(adapter))
where `adapter` implements
    fn save_state(&self, key: &str, value: &V, initial: bool) -> Result<()>
    fn load_state(&self, key: &str) -> Result<Option<V>>";

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "There is no state with the key '{0}', you are either trying to access a \
         state that doesn't exist or it was deleted"
    )]
    MissingState(String),

    #[error("Persistence is not configured: {}", PERSISTENCE_USAGE)]
    PersistenceNotConfigured,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_names_key() {
        let err = StoreError::MissingState("count".to_string());
        assert!(err.to_string().contains("'count'"));
    }

    #[test]
    fn test_not_configured_describes_adapter() {
        let msg = StoreError::PersistenceNotConfigured.to_string();
        assert!(msg.contains("save_state"));
        assert!(msg.contains("load_state"));
    }

    #[test]
    fn test_from_serde_json() {
        let err: StoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
