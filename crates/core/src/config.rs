use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub github: GitHubConfig,
    pub repository: RepositoryName,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Personal access token. Used when no app is configured.
    pub token: Option<String>,
    pub app: Option<GitHubAppConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubAppConfig {
    pub id: u64,
    pub private_key: String,
    /// Account whose installation should be used. Defaults to the repository owner.
    pub installation_owner: Option<String>,
}

/// `owner/repo` pair of the watched repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryName {
    pub owner: String,
    pub repo: String,
}

impl RepositoryName {
    pub fn full_name(&self) -> String { format!("{}/{}", self.owner, self.repo) }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepositoryName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self { owner: owner.to_string(), repo: repo.to_string() })
            }
            _ => Err(format!("Invalid repository name '{s}', expected 'owner/repo'")),
        }
    }
}

impl Serialize for RepositoryName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RepositoryName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Name of the check run that builds the preview.
    pub check_name: String,
    /// Name of the artifact uploaded by that check's workflow run.
    pub artifact_name: String,
    /// Public base URL the extracted previews are served from.
    pub pages_url: Url,
    /// Directory each target's artifact is extracted under.
    pub destination_dir: PathBuf,
    /// Defaults to `downloads.json` inside `destination_dir`.
    pub manifest_path: Option<PathBuf>,
    pub branches: BranchFilter,
    pub poll: PollConfig,
}

impl PreviewConfig {
    pub fn manifest_path(&self) -> PathBuf {
        match &self.manifest_path {
            Some(path) => path.clone(),
            None => self.destination_dir.join("downloads.json"),
        }
    }

    pub fn destination_for(&self, dir_name: &str) -> PathBuf {
        crate::util::join_normalized(&self.destination_dir, Path::new(dir_name))
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            check_name: "build_preview_pages".to_string(),
            artifact_name: "preview-pages".to_string(),
            pages_url: Url::parse("https://voicevox.github.io/preview-pages")
                .expect("default pages URL is valid"),
            destination_dir: PathBuf::from("public/preview"),
            manifest_path: None,
            branches: BranchFilter::default(),
            poll: PollConfig::default(),
        }
    }
}

/// Selects which branches are tracked.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BranchFilter {
    pub names: Vec<String>,
    pub prefixes: Vec<String>,
}

impl BranchFilter {
    pub fn matches(&self, branch: &str) -> bool {
        self.names.iter().any(|name| name == branch)
            || self.prefixes.iter().any(|prefix| branch.starts_with(prefix.as_str()))
    }
}

impl Default for BranchFilter {
    fn default() -> Self {
        Self { names: vec!["main".to_string()], prefixes: vec!["project-".to_string()] }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
    /// Upper bound on job status reads in flight across all targets.
    pub concurrency: usize,
}

impl PollConfig {
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs) }
}

impl Default for PollConfig {
    fn default() -> Self { Self { interval_secs: 15, max_attempts: 20, concurrency: 5 } }
}
