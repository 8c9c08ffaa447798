use std::{io, pin::pin, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use http::{StatusCode, Uri, header};
use octocrab::{
    GitHubError, Octocrab,
    models::{CommentId, InstallationId, RunId},
    params,
};
use preview_pages_core::{
    config::{GitHubConfig, RepositoryName},
    forge::{Artifact, CheckRun, FetchedBody, Forge, IssueComment, JobStatus, RunStatus},
    models::PullRequestTarget,
};

/// [`Forge`] backed by the GitHub REST API for a single repository.
pub struct GitHub {
    pub client: Octocrab,
    http: reqwest::Client,
    repository: RepositoryName,
    bot_login: String,
}

#[derive(serde::Serialize)]
struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

#[derive(serde::Deserialize)]
struct AppInfo {
    name: String,
    slug: String,
}

#[derive(serde::Serialize)]
struct CheckRunParams<'a> {
    check_name: &'a str,
    per_page: u8,
    page: u32,
}

#[derive(serde::Deserialize)]
struct CheckRunList {
    total_count: u64,
    check_runs: Vec<CheckRunRecord>,
}

#[derive(serde::Deserialize)]
struct CheckRunRecord {
    id: u64,
    name: String,
    details_url: Option<String>,
    status: RunStatus,
    conclusion: Option<String>,
}

impl From<CheckRunRecord> for CheckRun {
    fn from(value: CheckRunRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
            details_url: value.details_url,
            status: value.status,
            conclusion: value.conclusion,
        }
    }
}

async fn find_installation(app_client: &Octocrab, owner: &str) -> Result<InstallationId> {
    let mut first = None;
    let mut stream = pin!(app_client.apps().installations().send().await?.into_stream(app_client));
    while let Some(installation) = stream.try_next().await? {
        if installation.account.login.eq_ignore_ascii_case(owner) {
            return Ok(installation.id);
        }
        first.get_or_insert(installation.id);
    }
    let installation_id = first.context("GitHub app has no installations")?;
    tracing::warn!("No installation found for {}, using installation {}", owner, installation_id);
    Ok(installation_id)
}

/// API path of the check runs of `git_ref`, with the ref encoded as a single segment.
fn check_runs_route(repository: &RepositoryName, git_ref: &str) -> Result<String> {
    let mut url = url::Url::parse("https://api.github.com/").context("Invalid API base URL")?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("API base URL cannot have path segments"))?
        .clear()
        .extend([
            "repos",
            repository.owner.as_str(),
            repository.repo.as_str(),
            "commits",
            git_ref,
            "check-runs",
        ]);
    Ok(url.path().to_string())
}

/// Requests numbered pages (starting at 1) until `total_count` items were collected or
/// a page comes back empty.
async fn fetch_counted_pages<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, u64), E>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let (batch, total_count) = fetch(page).await?;
        let empty = batch.is_empty();
        items.extend(batch);
        if empty || items.len() as u64 >= total_count {
            return Ok(items);
        }
        page += 1;
    }
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. }
        if matches!(**source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }))
}

impl GitHub {
    pub async fn new(config: &GitHubConfig, repository: &RepositoryName) -> Result<Arc<Self>> {
        let (client, bot_login) = if let Some(app_config) = &config.app {
            let app_client = Octocrab::builder()
                .app(
                    app_config.id.into(),
                    jsonwebtoken::EncodingKey::from_rsa_pem(app_config.private_key.as_bytes())
                        .context("Failed to parse GitHub app private key")?,
                )
                .build()
                .context("Failed to create GitHub client")?;
            let app: AppInfo = app_client
                .get("/app", None::<&()>)
                .await
                .context("Failed to fetch app info")?;
            tracing::info!("Running as {}", app.name);
            let owner = app_config.installation_owner.as_deref().unwrap_or(&repository.owner);
            let installation_id = find_installation(&app_client, owner)
                .await
                .context("Failed to fetch installations")?;
            let client = app_client.installation(installation_id)?;
            (client, format!("{}[bot]", app.slug))
        } else if let Some(token) = &config.token {
            let client = Octocrab::builder()
                .personal_token(token.clone())
                .build()
                .context("Failed to create GitHub client")?;
            let profile = client.current().user().await.context("Failed to fetch current user")?;
            tracing::info!("Logged in as {}", profile.login);
            (client, profile.login)
        } else {
            bail!("Either github.token or github.app must be configured");
        };
        let http = reqwest::Client::builder()
            .user_agent(concat!("preview-pages/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Arc::new(Self { client, http, repository: repository.clone(), bot_login }))
    }

    fn owner(&self) -> &str { &self.repository.owner }

    fn repo(&self) -> &str { &self.repository.repo }
}

#[async_trait]
impl Forge for GitHub {
    async fn list_branches(&self) -> Result<Vec<String>> {
        let page = self
            .client
            .repos(self.owner(), self.repo())
            .list_branches()
            .per_page(100)
            .send()
            .await
            .context("Failed to fetch branches")?;
        let branches = self.client.all_pages(page).await.context("Failed to fetch branches")?;
        Ok(branches.into_iter().map(|branch| branch.name).collect())
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequestTarget>> {
        let page = self
            .client
            .pulls(self.owner(), self.repo())
            .list()
            .state(params::State::Open)
            .per_page(100)
            .send()
            .await
            .context("Failed to fetch pull requests")?;
        let pull_requests =
            self.client.all_pages(page).await.context("Failed to fetch pull requests")?;
        Ok(pull_requests
            .into_iter()
            .map(|pull_request| {
                let head_repo_full_name = pull_request
                    .head
                    .repo
                    .and_then(|repo| repo.full_name)
                    .unwrap_or_else(|| self.repository.full_name());
                PullRequestTarget {
                    number: pull_request.number,
                    head_sha: pull_request.head.sha,
                    head_repo_full_name,
                }
            })
            .collect())
    }

    async fn check_runs_for_ref(&self, git_ref: &str, check_name: &str) -> Result<Vec<CheckRun>> {
        let route = check_runs_route(&self.repository, git_ref)?;
        let result = fetch_counted_pages(|page| {
            let route = &route;
            async move {
                let params = CheckRunParams { check_name, per_page: 100, page };
                let list: CheckRunList = self.client.get(route, Some(&params)).await?;
                Ok::<_, octocrab::Error>((list.check_runs, list.total_count))
            }
        })
        .await;
        match result {
            Ok(check_runs) => Ok(check_runs.into_iter().map(CheckRun::from).collect()),
            Err(e) if is_not_found(&e) => Ok(vec![]),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch check runs for {git_ref}")),
        }
    }

    async fn job_status(&self, job_id: u64) -> Result<JobStatus> {
        let route = format!("/repos/{}/{}/actions/jobs/{}", self.owner(), self.repo(), job_id);
        self.client
            .get(route, None::<&()>)
            .await
            .with_context(|| format!("Failed to fetch job {job_id}"))
    }

    async fn list_run_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>> {
        let artifacts = self
            .client
            .all_pages(
                self.client
                    .actions()
                    .list_workflow_run_artifacts(self.owner(), self.repo(), RunId(run_id))
                    .send()
                    .await
                    .context("Failed to fetch artifacts")?
                    .value
                    .unwrap_or_default(),
            )
            .await?;
        tracing::debug!("Run {} (artifacts {})", run_id, artifacts.len());
        Ok(artifacts
            .into_iter()
            .map(|artifact| Artifact {
                id: artifact.id.into_inner(),
                name: artifact.name,
                archive_download_url: artifact.archive_download_url.to_string(),
                expired: artifact.expired,
            })
            .collect())
    }

    async fn artifact_download_url(&self, artifact_id: u64) -> Result<Option<String>> {
        // The archive endpoint answers with a redirect to short-lived blob storage.
        let route = format!(
            "/repos/{}/{}/actions/artifacts/{}/zip",
            self.owner(),
            self.repo(),
            artifact_id
        );
        let uri = Uri::builder().path_and_query(route).build().context("Invalid artifact URI")?;
        let response = self
            .client
            ._get(uri)
            .await
            .with_context(|| format!("Failed to request download URL for artifact {artifact_id}"))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(None);
        }
        if !status.is_redirection() {
            bail!("Unexpected status {} requesting artifact {}", status, artifact_id);
        }
        Ok(response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned))
    }

    async fn fetch_stream(&self, url: &str) -> Result<FetchedBody> {
        let response = self.http.get(url).send().await.context("Failed to request artifact")?;
        let status = response.status().as_u16();
        let body = match response.content_length() {
            Some(0) => None,
            _ => Some(response.bytes_stream().map_err(io::Error::other).boxed()),
        };
        Ok(FetchedBody { status, body })
    }

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        let page = self
            .client
            .issues(self.owner(), self.repo())
            .list_comments(number)
            .per_page(100)
            .send()
            .await
            .with_context(|| format!("Failed to fetch comments for #{number}"))?;
        let comments = self.client.all_pages(page).await?;
        Ok(comments
            .into_iter()
            .map(|comment| IssueComment {
                id: comment.id.into_inner(),
                author: Some(comment.user.login),
                body: comment.body,
            })
            .collect())
    }

    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<()> {
        self.client
            .issues(self.owner(), self.repo())
            .create_comment(number, body)
            .await
            .with_context(|| format!("Failed to create comment on #{number}"))?;
        Ok(())
    }

    async fn update_issue_comment(&self, comment_id: u64, body: &str) -> Result<()> {
        self.client
            .issues(self.owner(), self.repo())
            .update_comment(CommentId(comment_id), body)
            .await
            .with_context(|| format!("Failed to update comment {comment_id}"))?;
        Ok(())
    }

    fn bot_login(&self) -> &str { &self.bot_login }
}
