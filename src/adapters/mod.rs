//! Infrastructure adapters for external systems.

pub mod github;
pub mod memory;
pub mod metrics;
pub mod mock;
pub mod sqlite;
