//! GitHub implementation of the version control collaborator.
//!
//! Wraps the GitHub REST API v3 (git data, contents and pulls endpoints)
//! behind the [`VersionControl`] port. Requests share a governor rate
//! limiter sized to the 5 000 req/hour authenticated API limit.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::VersionControlConfig;
use crate::domain::ports::{FileChange, PullRequest, VersionControl};

use super::models::{
    GitHubCommitDetail, GitHubContent, GitHubCreateCommitRequest, GitHubCreatePullRequest,
    GitHubCreateRefRequest, GitHubCreateTreeRequest, GitHubGitCommit, GitHubMergeRequest,
    GitHubMergeResponse, GitHubPullRequest, GitHubRef, GitHubTreeEntry, GitHubUpdateRefRequest,
};

const REQUESTS_PER_HOUR: NonZeroU32 = match NonZeroU32::new(5_000) {
    Some(n) => n,
    None => panic!("request budget must be non-zero"),
};

/// HTTP client for one GitHub repository.
///
/// All failures map to [`DomainError::VersionControl`].
#[derive(Clone)]
pub struct GitHubVersionControl {
    http: Client,
    token: String,
    api_base: String,
    owner: String,
    repo: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for GitHubVersionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubVersionControl")
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl GitHubVersionControl {
    pub fn new(config: &VersionControlConfig, token: String) -> Self {
        Self {
            http: Client::new(),
            token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_hour(REQUESTS_PER_HOUR))),
        }
    }

    /// Build a client using the `GITHUB_TOKEN` environment variable.
    pub fn from_env(config: &VersionControlConfig) -> Result<Self, String> {
        if !config.is_configured() {
            return Err("version_control.owner and version_control.repo must be set".to_string());
        }
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| "GITHUB_TOKEN environment variable is not set".to_string())?;
        if token.is_empty() {
            return Err("GITHUB_TOKEN environment variable is empty".to_string());
        }
        Ok(Self::new(config, token))
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.repo, path)
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.limiter.until_ready().await;
        self.http
            .request(method, self.repo_url(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "autopilot")
    }

    async fn send<T: DeserializeOwned>(&self, op: &str, req: RequestBuilder) -> DomainResult<T> {
        let resp = req.send().await.map_err(|e| {
            DomainError::VersionControl(format!("GitHub {op} request failed: {e}"))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::VersionControl(format!(
                "GitHub {op} returned {status}: {body}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| DomainError::VersionControl(format!("GitHub {op} parse failed: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, op: &str, path: &str) -> DomainResult<T> {
        let req = self.request(Method::GET, path).await;
        self.send(op, req).await
    }

    async fn write<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        op: &str,
        method: Method,
        path: &str,
        body: &B,
    ) -> DomainResult<T> {
        let req = self.request(method, path).await.json(body);
        self.send(op, req).await
    }

    async fn branch_head(&self, branch: &str) -> DomainResult<String> {
        let head: GitHubRef = self
            .get("get_ref", &format!("git/ref/heads/{branch}"))
            .await?;
        Ok(head.object.sha)
    }

    /// Write `entries` on top of the branch tip and move the branch to the new commit.
    async fn commit_tree(
        &self,
        branch: &str,
        entries: Vec<GitHubTreeEntry>,
        message: &str,
    ) -> DomainResult<String> {
        let head = self.branch_head(branch).await?;
        let head_commit: GitHubGitCommit = self
            .get("get_commit", &format!("git/commits/{head}"))
            .await?;

        let tree: GitHubGitCommit = self
            .write(
                "create_tree",
                Method::POST,
                "git/trees",
                &GitHubCreateTreeRequest {
                    base_tree: head_commit.tree.sha,
                    tree: entries,
                },
            )
            .await?;

        let commit: GitHubGitCommit = self
            .write(
                "create_commit",
                Method::POST,
                "git/commits",
                &GitHubCreateCommitRequest {
                    message: message.to_string(),
                    tree: tree.sha,
                    parents: vec![head],
                },
            )
            .await?;

        let _: GitHubRef = self
            .write(
                "update_ref",
                Method::PATCH,
                &format!("git/refs/heads/{branch}"),
                &GitHubUpdateRefRequest {
                    sha: commit.sha.clone(),
                    force: false,
                },
            )
            .await?;

        Ok(commit.sha)
    }

    /// Tree entries that restore every file touched by `commit` to its parent's content.
    async fn inverse_entries(&self, commit: &GitHubCommitDetail) -> DomainResult<Vec<GitHubTreeEntry>> {
        let parent = commit.parents.first().ok_or_else(|| {
            DomainError::VersionControl(format!("commit {} has no parent to revert to", commit.sha))
        })?;

        let mut entries = Vec::with_capacity(commit.files.len());
        for file in &commit.files {
            match file.status.as_str() {
                "added" | "copied" => entries.push(GitHubTreeEntry::deletion(&file.filename)),
                "renamed" => {
                    entries.push(GitHubTreeEntry::deletion(&file.filename));
                    if let Some(previous) = &file.previous_filename {
                        let blob = self.blob_at(previous, &parent.sha).await?;
                        entries.push(GitHubTreeEntry::with_blob(previous, blob));
                    }
                }
                "unchanged" => {}
                _ => {
                    let blob = self.blob_at(&file.filename, &parent.sha).await?;
                    entries.push(GitHubTreeEntry::with_blob(&file.filename, blob));
                }
            }
        }
        Ok(entries)
    }

    async fn blob_at(&self, path: &str, git_ref: &str) -> DomainResult<String> {
        let content: GitHubContent = self
            .get("get_content", &format!("contents/{path}?ref={git_ref}"))
            .await?;
        Ok(content.sha)
    }
}

#[async_trait]
impl VersionControl for GitHubVersionControl {
    async fn create_branch(&self, branch: &str, from_ref: &str) -> DomainResult<String> {
        let sha = self.branch_head(from_ref).await?;
        let created: GitHubRef = self
            .write(
                "create_ref",
                Method::POST,
                "git/refs",
                &GitHubCreateRefRequest {
                    name: format!("refs/heads/{branch}"),
                    sha,
                },
            )
            .await?;
        tracing::debug!(branch, from_ref, git_ref = %created.name, "created branch");
        Ok(branch.to_string())
    }

    async fn commit_files(
        &self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> DomainResult<String> {
        let entries = files
            .iter()
            .map(|f| GitHubTreeEntry::with_content(&f.path, &f.content))
            .collect();
        self.commit_tree(branch, entries, message).await
    }

    async fn revert_commit(
        &self,
        branch: &str,
        commit_sha: &str,
        message: &str,
    ) -> DomainResult<String> {
        let commit: GitHubCommitDetail = self
            .get("get_commit_detail", &format!("commits/{commit_sha}"))
            .await?;
        let entries = self.inverse_entries(&commit).await?;
        if entries.is_empty() {
            return Err(DomainError::VersionControl(format!(
                "commit {commit_sha} touched no files to revert"
            )));
        }
        self.commit_tree(branch, entries, message).await
    }

    async fn open_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> DomainResult<PullRequest> {
        let pr: GitHubPullRequest = self
            .write(
                "create_pull_request",
                Method::POST,
                "pulls",
                &GitHubCreatePullRequest {
                    title: title.to_string(),
                    body: body.to_string(),
                    head: head.to_string(),
                    base: base.to_string(),
                },
            )
            .await?;
        Ok(pr.into())
    }

    async fn merge_pull_request(&self, number: u64) -> DomainResult<String> {
        let merged: GitHubMergeResponse = self
            .write(
                "merge_pull_request",
                Method::PUT,
                &format!("pulls/{number}/merge"),
                &GitHubMergeRequest {
                    merge_method: "squash",
                },
            )
            .await?;
        if !merged.merged {
            return Err(DomainError::VersionControl(format!(
                "GitHub refused to merge PR #{number}: {}",
                merged.message
            )));
        }
        Ok(merged.sha)
    }

    async fn get_pull_request(&self, number: u64) -> DomainResult<PullRequest> {
        let pr: GitHubPullRequest = self.get("get_pull_request", &format!("pulls/{number}")).await?;
        Ok(pr.into())
    }
}
