//! GitHub REST API payloads used by the version control adapter.
//!
//! Internal to the adapter; the domain only sees [`PullRequest`].

use serde::{Deserialize, Serialize};

use crate::domain::ports::{PullRequest, PullRequestState};

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubShaRef {
    pub sha: String,
}

/// `GET /git/ref/heads/{branch}`
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: GitHubShaRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubCreateRefRequest {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubUpdateRefRequest {
    pub sha: String,
    pub force: bool,
}

/// `GET /git/commits/{sha}`
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubGitCommit {
    pub sha: String,
    pub tree: GitHubShaRef,
}

/// `GET /commits/{sha}`, including the files it touched.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitDetail {
    pub sha: String,
    #[serde(default)]
    pub parents: Vec<GitHubShaRef>,
    #[serde(default)]
    pub files: Vec<GitHubCommitFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitFile {
    pub filename: String,
    /// added, removed, modified, renamed, copied, changed, unchanged
    pub status: String,
    #[serde(default)]
    pub previous_filename: Option<String>,
}

/// `GET /contents/{path}?ref=...`, only the blob sha is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubContent {
    pub sha: String,
}

/// One entry of a tree being written.
///
/// `sha: Some(None)` serializes as `null` and deletes the path.
#[derive(Debug, Clone, Serialize)]
pub struct GitHubTreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl GitHubTreeEntry {
    pub fn with_content(path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            mode: "100644",
            kind: "blob",
            sha: None,
            content: Some(content.to_string()),
        }
    }

    pub fn with_blob(path: &str, sha: String) -> Self {
        Self {
            path: path.to_string(),
            mode: "100644",
            kind: "blob",
            sha: Some(Some(sha)),
            content: None,
        }
    }

    pub fn deletion(path: &str) -> Self {
        Self {
            path: path.to_string(),
            mode: "100644",
            kind: "blob",
            sha: Some(None),
            content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubCreateTreeRequest {
    pub base_tree: String,
    pub tree: Vec<GitHubTreeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubCreateCommitRequest {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubCreatePullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubBranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

/// `GET /pulls/{number}` and `POST /pulls` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubPullRequest {
    pub number: u64,
    pub state: String,
    pub title: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    pub head: GitHubBranchRef,
    pub base: GitHubBranchRef,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        let state = if pr.state == "open" {
            PullRequestState::Open
        } else {
            PullRequestState::Closed
        };
        // GitHub reports a test-merge sha on unmerged PRs; only keep it once merged.
        let merge_commit_sha = if pr.merged { pr.merge_commit_sha } else { None };
        Self {
            number: pr.number,
            state,
            merged: pr.merged,
            merge_commit_sha,
            head_branch: pr.head.name,
            base_branch: pr.base.name,
            title: pr.title,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GitHubMergeRequest {
    pub merge_method: &'static str,
}

/// `PUT /pulls/{number}/merge`
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubMergeResponse {
    pub sha: String,
    pub merged: bool,
    #[serde(default)]
    pub message: String,
}
