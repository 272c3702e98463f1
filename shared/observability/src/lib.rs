//! StrategyForge Observability Library
//!
//! Shared logging setup for the StrategyForge services.
//!
//! # Features
//! - `tracing-subscriber` initialisation with JSON or pretty output
//! - Structured domain events for authentication outcomes
//! - Logging macros for store access and security-relevant rejections

pub mod domain_events;
pub mod init;
pub mod macros;

pub use domain_events::*;
pub use init::*;

// Re-export tracing for convenience
pub use tracing::{debug, error, info, warn, trace, Level, Instrument};
pub use tracing::instrument;
