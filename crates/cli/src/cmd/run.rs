use anyhow::Result;
use argp::FromArgs;
use preview_pages_jobs::{JobContext, collect};

use crate::cmd::comment::post_comments;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Collect all previews, then update pull request comments from the new manifest.
#[argp(subcommand, name = "run")]
pub struct Args {}

pub async fn run(ctx: &JobContext, _args: Args) -> Result<()> {
    let summary = collect(ctx).await?;
    post_comments(ctx, &summary.manifest).await
}
