//! Autopilot - Autonomous Improvement Decision Pipeline
//!
//! Autopilot decides whether a proposed code change may be merged without a
//! human, supervises its canary rollout, reverts it when the canary breaches
//! its criteria, and opens self-healing proposals when the running system
//! degrades.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Proposal lifecycle, scoring models and ports
//! - **Service Layer** (`services`): Risk, confidence, decision, learning,
//!   rollback and self-healing logic
//! - **Application Layer** (`application`): Wiring and the operation facade
//! - **Adapters** (`adapters`): `SQLite` store, GitHub, metrics sources and
//!   in-memory fakes
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use autopilot::{AppContext, AutonomyApi, ConfigLoader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = AppContext::from_config(ConfigLoader::load()?).await?;
//!     let api = AutonomyApi::new(&ctx);
//!     let insight = api.learning_patterns().await;
//!     println!("{} patterns", insight.patterns.len());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{AppContext, AutonomyApi, ContextError};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, DecisionAction, DecisionResult, ImprovementProposal, NewProposal, ProposalStatus,
    RiskLevel, TriggerType,
};
pub use domain::ports::{MetricsSource, ProposalRepository, VersionControl};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ConfidenceScorer, DecisionEngine, LearningEngine, RiskAnalyzer, RollbackManager,
    SelfHealingMonitor,
};
