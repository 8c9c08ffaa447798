use std::path::PathBuf;

use anyhow::{Result, bail};
use argp::FromArgs;
use preview_pages_core::models::Manifest;
use preview_pages_jobs::{JobContext, read_manifest, reconcile_comments};

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Create or update the preview comment on every pull request in the manifest.
#[argp(subcommand, name = "comment")]
pub struct Args {
    #[argp(option, short = 'm', from_str_fn(native_path))]
    /// manifest file (default: configured manifest path)
    manifest: Option<PathBuf>,
}

pub async fn run(ctx: &JobContext, args: Args) -> Result<()> {
    let path = args.manifest.unwrap_or_else(|| ctx.config.manifest_path());
    let manifest = read_manifest(&path).await?;
    post_comments(ctx, &manifest).await
}

pub async fn post_comments(ctx: &JobContext, manifest: &Manifest) -> Result<()> {
    let summary = reconcile_comments(ctx, manifest).await;
    if summary.failed > 0 {
        bail!("Failed to update comments on {} pull requests", summary.failed);
    }
    Ok(())
}
