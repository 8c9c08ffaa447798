use anyhow::Result;
use preview_pages_core::{
    config::PreviewConfig,
    forge::{Forge, IssueComment},
    models::{Manifest, PullRequestTarget},
    util::short_sha,
};
use tracing::Instrument;

use crate::JobContext;

/// Final line of every tracking comment.
pub const COMMENT_MARKER: &str = "<!-- voicevox preview-pages info -->";

/// Markers identifying tracking comments, current first. Older entries are kept so
/// comments posted by earlier versions are updated instead of duplicated.
pub const COMMENT_MARKERS: &[&str] = &[COMMENT_MARKER, "<!-- voiccevox preview-pages info -->"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    fn record(&mut self, action: CommentAction) {
        match action {
            CommentAction::Created => self.created += 1,
            CommentAction::Updated => self.updated += 1,
            CommentAction::Unchanged => self.unchanged += 1,
        }
    }
}

pub fn generate_comment(
    config: &PreviewConfig,
    pull_request: &PullRequestTarget,
    dir_name: &str,
) -> String {
    let base = config.pages_url.as_str().trim_end_matches('/');
    [
        ":rocket: プレビュー用ページを作成しました :rocket:".to_string(),
        String::new(),
        format!(
            "- <a href=\"{base}/preview/{dir_name}/editor\" target=\"_blank\">:pencil: エディタ</a>"
        ),
        format!(
            "- <a href=\"{base}/preview/{dir_name}/storybook\" target=\"_blank\">:book: Storybook</a>"
        ),
        String::new(),
        format!(
            "更新時点でのコミットハッシュ：[`{}`](https://github.com/{}/commit/{})",
            short_sha(&pull_request.head_sha),
            pull_request.head_repo_full_name,
            pull_request.head_sha
        ),
        COMMENT_MARKER.to_string(),
    ]
    .join("\n")
}

fn has_marker(body: &str) -> bool {
    let body = body.trim_end();
    COMMENT_MARKERS.iter().any(|marker| body.ends_with(marker))
}

/// The comment previously posted by `bot_login`, recognized by a trailing marker.
pub fn find_tracking_comment<'a>(
    comments: &'a [IssueComment],
    bot_login: &str,
) -> Option<&'a IssueComment> {
    comments.iter().find(|comment| {
        comment.author.as_deref() == Some(bot_login)
            && comment.body.as_deref().is_some_and(has_marker)
    })
}

/// Creates, updates or leaves alone the tracking comment of one pull request.
pub async fn reconcile_comment(
    forge: &dyn Forge,
    config: &PreviewConfig,
    pull_request: &PullRequestTarget,
    dir_name: &str,
) -> Result<CommentAction> {
    tracing::info!("Fetching comments...");
    let comments = forge.list_issue_comments(pull_request.number).await?;
    let body = generate_comment(config, pull_request, dir_name);
    match find_tracking_comment(&comments, forge.bot_login()) {
        None => {
            tracing::info!("Adding deploy info...");
            forge.create_issue_comment(pull_request.number, &body).await?;
            Ok(CommentAction::Created)
        }
        Some(existing) if existing.body.as_deref() == Some(body.as_str()) => {
            tracing::info!("Deploy info is up to date");
            Ok(CommentAction::Unchanged)
        }
        Some(existing) => {
            tracing::info!("Updating deploy info...");
            forge.update_issue_comment(existing.id, &body).await?;
            Ok(CommentAction::Updated)
        }
    }
}

/// Reconciles every pull request in the manifest, one at a time.
///
/// A failure on one pull request is logged and counted; the rest are still processed.
pub async fn reconcile_comments(ctx: &JobContext, manifest: &Manifest) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    for (pull_request, dir_name) in manifest.pull_requests() {
        let span = tracing::info_span!("comment", pr = pull_request.number);
        let result = reconcile_comment(ctx.forge.as_ref(), &ctx.config, pull_request, dir_name)
            .instrument(span)
            .await;
        match result {
            Ok(action) => summary.record(action),
            Err(e) => {
                tracing::error!("PR #{}: Failed to update comment: {:?}", pull_request.number, e);
                summary.failed += 1;
            }
        }
    }
    tracing::info!(
        "Comments: {} created, {} updated, {} unchanged, {} failed.",
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.failed
    );
    summary
}
