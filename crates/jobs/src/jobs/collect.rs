use std::path::Path;

use anyhow::{Context, Result};
use preview_pages_core::models::{DownloadResult, Manifest, Target};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::{
    CollectError, JobContext, SkipReason, TargetError,
    jobs::{
        artifact::fetch_artifact,
        check::resolve_check,
        targets::enumerate_targets,
        waiter::{JobOutcome, PollLimiter, PollSettings, wait_for_job},
    },
};

#[derive(Debug, Clone)]
pub struct CollectSummary {
    pub manifest: Manifest,
    pub total: usize,
}

/// Runs the check → wait → download chain for a single target.
pub async fn process_target(
    ctx: &JobContext,
    limiter: &PollLimiter,
    target: &Target,
) -> Result<DownloadResult, TargetError> {
    let forge = ctx.forge.as_ref();
    tracing::info!("Checking...");
    let check = resolve_check(forge, target, &ctx.config.check_name).await?;
    let settings = PollSettings::from(&ctx.config.poll);
    match wait_for_job(forge, limiter, check.job_id, &settings).await? {
        JobOutcome::Succeeded => {}
        JobOutcome::Failed { conclusion } => {
            return Err(SkipReason::JobFailed { job_id: check.job_id, conclusion }.into());
        }
        JobOutcome::TimedOut { attempts } => {
            return Err(SkipReason::JobTimedOut { job_id: check.job_id, attempts }.into());
        }
    }
    let download = fetch_artifact(forge, &ctx.config, target, check.run_id).await?;
    tracing::info!("Done.");
    Ok(download)
}

/// Processes every target concurrently and replaces the manifest with the successful ones.
///
/// Nothing is written unless at least one target succeeded.
pub async fn collect(ctx: &JobContext) -> Result<CollectSummary, CollectError> {
    let targets = enumerate_targets(ctx.forge.as_ref(), &ctx.config.branches)
        .await
        .map_err(CollectError::Enumerate)?;
    let total = targets.len();
    let limiter = PollLimiter::new(ctx.config.poll.concurrency);

    struct TaskResult {
        index: usize,
        target: Target,
        result: Result<DownloadResult, TargetError>,
    }
    let mut set = JoinSet::new();
    for (index, target) in targets.into_iter().enumerate() {
        let ctx = ctx.clone();
        let limiter = limiter.clone();
        let span = tracing::info_span!("target", target = %target);
        set.spawn(
            async move {
                let result = process_target(&ctx, &limiter, &target).await;
                TaskResult { index, target, result }
            }
            .instrument(span),
        );
    }

    let mut downloads = Vec::with_capacity(total);
    while let Some(join_result) = set.join_next().await {
        match join_result {
            Ok(TaskResult { index, result: Ok(download), .. }) => {
                downloads.push((index, download));
            }
            Ok(TaskResult { target, result: Err(TargetError::Skipped(reason)), .. }) => {
                tracing::warn!("{}: {}", target, reason);
            }
            Ok(TaskResult { target, result: Err(TargetError::Api(e)), .. }) => {
                tracing::error!("{}: Failed to process: {:?}", target, e);
            }
            Err(e) => {
                tracing::error!("Failed to process target: {:?}", e);
            }
        }
    }
    downloads.sort_by_key(|(index, _)| *index);
    let manifest = Manifest { downloads: downloads.into_iter().map(|(_, d)| d).collect() };
    tracing::info!(
        "Done: {} successful downloads / {} total targets.",
        manifest.downloads.len(),
        total
    );
    if manifest.downloads.is_empty() {
        return Err(CollectError::NoSuccessfulTargets { total });
    }

    let path = ctx.config.manifest_path();
    write_manifest(&path, &manifest).await.map_err(CollectError::Manifest)?;
    tracing::info!("Wrote manifest to {}", path.display());
    Ok(CollectSummary { manifest, total })
}

/// Replaces the manifest at `path` without exposing a partially written file.
pub async fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, manifest.to_json()?)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

pub async fn read_manifest(path: &Path) -> Result<Manifest> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Manifest::parse(&data)
}
