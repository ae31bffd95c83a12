//! Observability for the sync core
//!
//! Structured logging and counter metrics, read-only with respect to the
//! synchronization logic: nothing here influences routing, scheduling, or
//! cache state.
//!
//! # Usage
//!
//! ```ignore
//! use livesync::observability::{Logger, MetricsRegistry};
//!
//! Logger::info("CHANNEL_SUBSCRIBED", &[("channel", "projects-board")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.incr_callbacks_fired();
//! ```

mod logger;
mod metrics;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
