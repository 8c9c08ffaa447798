use anyhow::{Context, Result};
use preview_pages_core::{config::BranchFilter, forge::Forge, models::Target};

/// Lists the tracked branches followed by every open pull request.
///
/// Any failure here is fatal: a partial list would silently drop previews.
pub async fn enumerate_targets(forge: &dyn Forge, filter: &BranchFilter) -> Result<Vec<Target>> {
    let branches = forge.list_branches().await.context("Failed to list branches")?;
    let pull_requests =
        forge.list_open_pull_requests().await.context("Failed to list pull requests")?;
    let mut targets = branches
        .into_iter()
        .filter(|name| filter.matches(name))
        .map(Target::branch)
        .collect::<Vec<_>>();
    let branch_count = targets.len();
    targets.extend(pull_requests.into_iter().map(Target::pull_request));
    tracing::info!(
        "Found {} branches and {} pull requests",
        branch_count,
        targets.len() - branch_count
    );
    Ok(targets)
}
