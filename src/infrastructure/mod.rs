//! Infrastructure layer module
//!
//! Process-level concerns that sit outside the domain:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
