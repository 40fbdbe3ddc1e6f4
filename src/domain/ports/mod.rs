//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async interfaces adapters must implement:
//! - ProposalRepository: the proposal store, single source of truth
//! - VersionControl: branch / pull request operations used for reverts
//! - MetricsSource: live rates for canaries and the health monitor
//! - Clock: wall-clock time for window arithmetic

pub mod clock;
pub mod metrics_source;
pub mod proposal_repository;
pub mod version_control;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics_source::MetricsSource;
pub use proposal_repository::{ProposalFilter, ProposalRepository};
pub use version_control::{FileChange, PullRequest, PullRequestState, VersionControl};
