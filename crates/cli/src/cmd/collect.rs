use anyhow::Result;
use argp::FromArgs;
use preview_pages_jobs::{JobContext, collect};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Download the preview artifact of every branch and pull request and write the manifest.
#[argp(subcommand, name = "collect")]
pub struct Args {}

pub async fn run(ctx: &JobContext, _args: Args) -> Result<()> {
    let summary = collect(ctx).await?;
    tracing::info!(
        "Collected {} of {} targets into {}",
        summary.manifest.downloads.len(),
        summary.total,
        ctx.config.destination_dir.display()
    );
    Ok(())
}
