//! GitHub adapter for the version control collaborator.
//!
//! Reverts are performed with the git data API: a revert branch is cut from
//! the default branch, a commit restoring the touched files is written onto
//! it, and a pull request is opened and squash-merged.

pub mod client;
pub mod models;

pub use client::GitHubVersionControl;
