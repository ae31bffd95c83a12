//! Session configuration
//!
//! Defaults match observed production usage: a 1000ms sliding debounce
//! capped at 5000ms of buffering. There is no environment or CLI surface;
//! the surrounding application constructs the config when entering a
//! workspace.

use crate::cache::InvalidationMode;
use crate::sync::{DebouncePolicy, ReconnectPolicy, SyncResult};

/// Configuration for one workspace sync session
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Default debounce policy for channels that do not override it
    pub debounce: DebouncePolicy,

    /// Reconnect backoff policy
    pub reconnect: ReconnectPolicy,

    /// What invalidation does to affected cache entries
    pub cache_mode: InvalidationMode,
}

impl SyncConfig {
    /// Validate the whole configuration
    pub fn validate(&self) -> SyncResult<()> {
        self.debounce.validate()?;
        self.reconnect.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce.debounce, Duration::from_millis(1000));
        assert_eq!(config.debounce.max_wait, Duration::from_millis(5000));
        assert_eq!(config.cache_mode, InvalidationMode::StaleWhileRevalidate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_debounce_rejected() {
        let config = SyncConfig {
            debounce: DebouncePolicy::from_millis(8000, 5000),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
