use std::{
    fs::{self, File},
    io::{self, Seek},
    path::Path,
};

use anyhow::{Context, Result};
use preview_pages_core::{
    config::PreviewConfig,
    forge::{ByteStream, Forge},
    models::{DownloadResult, Target},
    util::size,
};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use zip::ZipArchive;

use crate::{SkipReason, TargetError};

/// Downloads the configured artifact of `run_id` and extracts it into the target's
/// directory under the destination root.
pub async fn fetch_artifact(
    forge: &dyn Forge,
    config: &PreviewConfig,
    target: &Target,
    run_id: u64,
) -> Result<DownloadResult, TargetError> {
    let artifacts = forge.list_run_artifacts(run_id).await?;
    let artifact = artifacts
        .iter()
        .find(|artifact| !artifact.expired && artifact.name == config.artifact_name)
        .ok_or_else(|| SkipReason::NoArtifact(config.artifact_name.clone()))?;

    tracing::info!("Fetching artifact URL from {}", artifact.archive_download_url);
    let url = forge
        .artifact_download_url(artifact.id)
        .await?
        .ok_or(SkipReason::NoDownloadUrl(artifact.id))?;

    tracing::debug!("Downloading artifact from {}", url);
    let response = forge.fetch_stream(&url).await?;
    if !response.is_success() {
        return Err(SkipReason::TransferFailed(response.status).into());
    }
    let body = response.body.ok_or(SkipReason::EmptyBody)?;

    let download = DownloadResult::new(target.clone());
    let destination = config.destination_for(&download.dir_name);
    tracing::info!("Extracting artifact to {}", destination.display());
    let stats = extract_zip_stream(body, &destination).await?;
    tracing::info!("Extracted {} files ({})", stats.files, size(stats.bytes));
    Ok(download)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub bytes: u64,
}

/// Extracts the zip archive arriving on `body` under `destination`.
///
/// Upload tools write entries with trailing data descriptors, so sizes are only known
/// from the central directory at the end of the archive. The body is spooled to an
/// anonymous temporary file as it arrives and read back from there.
pub async fn extract_zip_stream(body: ByteStream, destination: &Path) -> Result<ExtractStats> {
    tokio::fs::create_dir_all(destination)
        .await
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let spool = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .context("Spool task failed")?
        .context("Failed to create spool file")?;
    let mut spool = tokio::fs::File::from_std(spool);
    let mut reader = StreamReader::new(body);
    let received = tokio::io::copy(&mut reader, &mut spool)
        .await
        .context("Failed to download archive")?;
    spool.flush().await.context("Failed to write spool file")?;
    tracing::debug!("Received archive ({})", size(received));

    let spool = spool.into_std().await;
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip(spool, &destination))
        .await
        .context("Extraction task failed")?
}

fn extract_zip(mut spool: File, destination: &Path) -> Result<ExtractStats> {
    spool.rewind().context("Failed to rewind spool file")?;
    let mut archive = ZipArchive::new(spool).context("Failed to read archive")?;
    let mut stats = ExtractStats::default();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).context("Failed to read archive entry")?;
        let Some(path) = file.enclosed_name() else {
            tracing::warn!("Skipping archive entry with unsafe path {}", file.name());
            continue;
        };
        let out_path = destination.join(path);
        if file.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        stats.bytes += io::copy(&mut file, &mut out)
            .with_context(|| format!("Failed to extract {}", file.name()))?;
        stats.files += 1;
        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(stats)
}
