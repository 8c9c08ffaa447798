use std::sync::OnceLock;

use preview_pages_core::{forge::Forge, models::Target};
use regex::Regex;

use crate::{SkipReason, TargetError};

/// Identifiers behind the preview build check of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCheck {
    /// Actions job backing the check run; shares the check run's ID.
    pub job_id: u64,
    /// Workflow run the job belongs to, which owns the artifacts.
    pub run_id: u64,
}

/// Extracts the workflow run ID from a check run's details URL
/// (`https://github.com/{owner}/{repo}/actions/runs/{run_id}/job/{job_id}`).
pub fn parse_run_id(details_url: &str) -> Option<u64> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX.get_or_init(|| Regex::new(r"/runs/(?P<run_id>[0-9]+)").unwrap());
    regex.captures(details_url)?.name("run_id")?.as_str().parse().ok()
}

pub async fn resolve_check(
    forge: &dyn Forge,
    target: &Target,
    check_name: &str,
) -> Result<ResolvedCheck, TargetError> {
    let check_runs = forge.check_runs_for_ref(target.git_ref(), check_name).await?;
    let check_run = check_runs
        .into_iter()
        .find(|check_run| check_run.name == check_name)
        .ok_or_else(|| SkipReason::NoCheckRun(check_name.to_string()))?;
    let details_url = check_run.details_url.ok_or(SkipReason::NoDetailsUrl(check_run.id))?;
    let run_id = parse_run_id(&details_url).ok_or(SkipReason::NoRunId(details_url))?;
    tracing::debug!("Found check run {} (run {})", check_run.id, run_id);
    Ok(ResolvedCheck { job_id: check_run.id, run_id })
}
