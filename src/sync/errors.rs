//! # Sync Errors
//!
//! Error types for the synchronization core.
//!
//! Configuration errors are surfaced synchronously to the caller; all
//! runtime failures (transport drops, callback failures, malformed frames)
//! are recovered locally and exposed only through observable state.

use thiserror::Error;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync errors
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    // ==================
    // Configuration Errors
    // ==================
    /// Invalid subscribe() arguments
    #[error("Invalid channel configuration: {0}")]
    Config(String),

    /// A live channel with this ID already exists
    #[error("Duplicate channel: {0}")]
    DuplicateChannel(String),

    // ==================
    // Runtime Errors
    // ==================
    /// Backend transport failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// A caller's on_fire handler failed
    #[error("Callback failed on channel {channel}: {message}")]
    Callback { channel: String, message: String },

    /// A frame that could not be decoded into a change event
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

impl SyncError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// True for errors rejected synchronously at subscribe time
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DuplicateChannel(_))
    }
}
