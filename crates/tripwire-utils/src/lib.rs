//! # Tripwire Utilities
//!
//! Shared utilities and logging for the Tripwire workspace.
//!
//! This crate provides the logging infrastructure (built on `tracing`) that
//! renders the checker core's structured events.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{LogFormat, LogLevel, init_logging, init_logging_with_level};
pub use tracing::{debug, error, info, trace, warn};
