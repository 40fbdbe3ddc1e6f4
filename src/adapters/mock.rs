//! Recording version control fake for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{FileChange, PullRequest, PullRequestState, VersionControl};

/// Operation names, used to inject failures and inspect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsOperation {
    CreateBranch,
    CommitFiles,
    RevertCommit,
    OpenPullRequest,
    MergePullRequest,
    GetPullRequest,
}

/// A call received by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsCall {
    pub operation: VcsOperation,
    /// Main argument of the call (branch, sha or PR number).
    pub target: String,
}

/// Version control fake that records every call.
pub struct MockVersionControl {
    pull_requests: RwLock<HashMap<u64, PullRequest>>,
    failures: RwLock<HashMap<VcsOperation, String>>,
    calls: RwLock<Vec<VcsCall>>,
    next_number: AtomicU64,
    next_sha: AtomicU64,
    latency: Option<Duration>,
}

impl Default for MockVersionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVersionControl {
    pub fn new() -> Self {
        Self {
            pull_requests: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            next_number: AtomicU64::new(1_000),
            next_sha: AtomicU64::new(1),
            latency: None,
        }
    }

    /// Make every call sleep first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register an already merged pull request.
    pub async fn add_merged_pull_request(&self, number: u64, merge_commit_sha: &str) {
        self.pull_requests.write().await.insert(
            number,
            PullRequest {
                number,
                state: PullRequestState::Closed,
                merged: true,
                merge_commit_sha: Some(merge_commit_sha.to_string()),
                head_branch: format!("feature-{number}"),
                base_branch: "main".to_string(),
                title: format!("PR {number}"),
            },
        );
    }

    /// Register an open, unmerged pull request.
    pub async fn add_open_pull_request(&self, number: u64) {
        self.pull_requests.write().await.insert(
            number,
            PullRequest {
                number,
                state: PullRequestState::Open,
                merged: false,
                merge_commit_sha: None,
                head_branch: format!("feature-{number}"),
                base_branch: "main".to_string(),
                title: format!("PR {number}"),
            },
        );
    }

    /// Make `operation` fail with `message` from now on.
    pub async fn fail_on(&self, operation: VcsOperation, message: &str) {
        self.failures
            .write()
            .await
            .insert(operation, message.to_string());
    }

    pub async fn calls(&self) -> Vec<VcsCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self, operation: VcsOperation) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    async fn enter(&self, operation: VcsOperation, target: impl Into<String>) -> DomainResult<()> {
        self.calls.write().await.push(VcsCall {
            operation,
            target: target.into(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.read().await.get(&operation) {
            Some(message) => Err(DomainError::VersionControl(message.clone())),
            None => Ok(()),
        }
    }

    fn sha(&self) -> String {
        format!("{:040x}", self.next_sha.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl VersionControl for MockVersionControl {
    async fn create_branch(&self, branch: &str, _from_ref: &str) -> DomainResult<String> {
        self.enter(VcsOperation::CreateBranch, branch).await?;
        Ok(branch.to_string())
    }

    async fn commit_files(
        &self,
        branch: &str,
        _files: &[FileChange],
        _message: &str,
    ) -> DomainResult<String> {
        self.enter(VcsOperation::CommitFiles, branch).await?;
        Ok(self.sha())
    }

    async fn revert_commit(
        &self,
        _branch: &str,
        commit_sha: &str,
        _message: &str,
    ) -> DomainResult<String> {
        self.enter(VcsOperation::RevertCommit, commit_sha).await?;
        Ok(self.sha())
    }

    async fn open_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        _body: &str,
    ) -> DomainResult<PullRequest> {
        self.enter(VcsOperation::OpenPullRequest, head).await?;
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let pr = PullRequest {
            number,
            state: PullRequestState::Open,
            merged: false,
            merge_commit_sha: None,
            head_branch: head.to_string(),
            base_branch: base.to_string(),
            title: title.to_string(),
        };
        self.pull_requests.write().await.insert(number, pr.clone());
        Ok(pr)
    }

    async fn merge_pull_request(&self, number: u64) -> DomainResult<String> {
        self.enter(VcsOperation::MergePullRequest, number.to_string())
            .await?;
        let sha = self.sha();
        let mut prs = self.pull_requests.write().await;
        let pr = prs
            .get_mut(&number)
            .ok_or_else(|| DomainError::VersionControl(format!("PR #{number} not found")))?;
        pr.merged = true;
        pr.state = PullRequestState::Closed;
        pr.merge_commit_sha = Some(sha.clone());
        Ok(sha)
    }

    async fn get_pull_request(&self, number: u64) -> DomainResult<PullRequest> {
        self.enter(VcsOperation::GetPullRequest, number.to_string())
            .await?;
        self.pull_requests
            .read()
            .await
            .get(&number)
            .cloned()
            .ok_or_else(|| DomainError::VersionControl(format!("PR #{number} not found")))
    }
}
