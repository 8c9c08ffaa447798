use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A branch or pull request tracked for preview builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Target {
    Branch { branch: BranchTarget },
    PullRequest { pull_request: PullRequestTarget },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchTarget {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestTarget {
    pub number: u64,
    pub head_sha: String,
    /// `owner/repo` of the head repository, which may be a fork.
    pub head_repo_full_name: String,
}

impl Target {
    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch { branch: BranchTarget { name: name.into() } }
    }

    pub fn pull_request(pull_request: PullRequestTarget) -> Self {
        Self::PullRequest { pull_request }
    }

    /// The git reference whose check runs describe this target.
    pub fn git_ref(&self) -> &str {
        match self {
            Self::Branch { branch } => &branch.name,
            Self::PullRequest { pull_request } => &pull_request.head_sha,
        }
    }

    /// Directory name used for extraction and as the public preview path segment.
    pub fn dir_name(&self) -> String {
        match self {
            Self::Branch { branch } => format!("branch-{}", branch.name),
            Self::PullRequest { pull_request } => format!("pr-{}", pull_request.number),
        }
    }

    pub fn as_pull_request(&self) -> Option<&PullRequestTarget> {
        match self {
            Self::Branch { .. } => None,
            Self::PullRequest { pull_request } => Some(pull_request),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch { branch } => write!(f, "Branch {}", branch.name),
            Self::PullRequest { pull_request } => write!(f, "PR #{}", pull_request.number),
        }
    }
}

/// A target whose artifact was downloaded and extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub source: Target,
    pub dir_name: String,
}

impl DownloadResult {
    pub fn new(source: Target) -> Self {
        let dir_name = source.dir_name();
        Self { source, dir_name }
    }
}

/// Every target currently live. Replaced wholesale on each collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub downloads: Vec<DownloadResult>,
}

impl Manifest {
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("Failed to parse manifest")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize manifest")
    }

    pub fn pull_requests(&self) -> impl Iterator<Item = (&PullRequestTarget, &str)> {
        self.downloads.iter().filter_map(|download| {
            download.source.as_pull_request().map(|pr| (pr, download.dir_name.as_str()))
        })
    }
}
