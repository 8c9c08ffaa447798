//! The hosting-service operations the preview pipeline relies on.
//!
//! [`Forge`] is implemented against the GitHub API by `preview-pages-github`; the
//! pipeline itself only ever sees this trait, so it can be driven by an in-memory
//! implementation in tests.

use std::io;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Deserialize;

use crate::models::PullRequestTarget;

/// Response body of a streamed download.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub details_url: Option<String>,
    pub status: RunStatus,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobStatus {
    pub status: RunStatus,
    pub conclusion: Option<String>,
}

impl JobStatus {
    pub fn is_completed(&self) -> bool { self.status == RunStatus::Completed }

    pub fn is_success(&self) -> bool { self.conclusion.as_deref() == Some("success") }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    /// Static metadata URL; not used for the transfer itself.
    pub archive_download_url: String,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub id: u64,
    pub author: Option<String>,
    pub body: Option<String>,
}

pub struct FetchedBody {
    pub status: u16,
    pub body: Option<ByteStream>,
}

impl FetchedBody {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

#[async_trait]
pub trait Forge: Send + Sync {
    /// Names of every branch in the repository, across all pages.
    async fn list_branches(&self) -> Result<Vec<String>>;

    /// Every open pull request, across all pages.
    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequestTarget>>;

    /// All check runs named `check_name` reported against the latest commit of `git_ref`.
    async fn check_runs_for_ref(&self, git_ref: &str, check_name: &str) -> Result<Vec<CheckRun>>;

    async fn job_status(&self, job_id: u64) -> Result<JobStatus>;

    async fn list_run_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>>;

    /// Short-lived URL the artifact archive can be downloaded from.
    async fn artifact_download_url(&self, artifact_id: u64) -> Result<Option<String>>;

    async fn fetch_stream(&self, url: &str) -> Result<FetchedBody>;

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>>;

    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<()>;

    async fn update_issue_comment(&self, comment_id: u64, body: &str) -> Result<()>;

    /// Login the automation posts comments as.
    fn bot_login(&self) -> &str;
}
