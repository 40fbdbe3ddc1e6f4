//! Version control collaborator port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
}

/// Pull request as reported by the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: PullRequestState,
    pub merged: bool,
    pub merge_commit_sha: Option<String>,
    pub head_branch: String,
    pub base_branch: String,
    pub title: String,
}

/// A file written as part of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

/// Operations the rollback manager needs from the hosting provider.
///
/// Calls are safe to retry but are never retried automatically. Callers
/// wrap every call in their own timeout.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Create `branch` pointing at the tip of `from_ref`. Returns the branch name.
    async fn create_branch(&self, branch: &str, from_ref: &str) -> DomainResult<String>;

    /// Commit `files` onto `branch`. Returns the new commit sha.
    async fn commit_files(
        &self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> DomainResult<String>;

    /// Commit the inverse of `commit_sha` onto `branch`. Returns the new commit sha.
    async fn revert_commit(&self, branch: &str, commit_sha: &str, message: &str)
        -> DomainResult<String>;

    /// Open a pull request from `head` into `base`.
    async fn open_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> DomainResult<PullRequest>;

    /// Squash-merge a pull request. Returns the merge commit sha.
    async fn merge_pull_request(&self, number: u64) -> DomainResult<String>;

    /// Fetch a pull request by number.
    async fn get_pull_request(&self, number: u64) -> DomainResult<PullRequest>;
}
