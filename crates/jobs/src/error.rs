/// Why a single target was left out of the manifest.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("no check run named {0:?}")]
    NoCheckRun(String),
    #[error("check run {0} has no details URL")]
    NoDetailsUrl(u64),
    #[error("failed to extract run ID from details URL {0}")]
    NoRunId(String),
    #[error("job {job_id} did not succeed (conclusion: {})", .conclusion.as_deref().unwrap_or("none"))]
    JobFailed { job_id: u64, conclusion: Option<String> },
    #[error("job {job_id} did not complete after {attempts} attempts")]
    JobTimedOut { job_id: u64, attempts: u32 },
    #[error("no artifact named {0:?}")]
    NoArtifact(String),
    #[error("no download URL for artifact {0}")]
    NoDownloadUrl(u64),
    #[error("download failed with status {0}")]
    TransferFailed(u16),
    #[error("download response has no body")]
    EmptyBody,
}

/// Failure of one target's check → wait → download chain. Never affects other targets.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("skipped: {0}")]
    Skipped(#[from] SkipReason),
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

/// Failures that abort the whole collection run.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to enumerate targets: {0:#}")]
    Enumerate(anyhow::Error),
    #[error("no successful downloads out of {total} targets")]
    NoSuccessfulTargets { total: usize },
    #[error("failed to write manifest: {0:#}")]
    Manifest(anyhow::Error),
}
