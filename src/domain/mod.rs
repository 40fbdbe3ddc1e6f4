//! Domain layer for the autopilot decision pipeline
//!
//! This module contains the proposal lifecycle, the scoring and decision
//! models, and the ports every collaborator is reached through.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
