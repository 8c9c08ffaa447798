mod error;
mod jobs;
#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use error::{CollectError, SkipReason, TargetError};
pub use jobs::{
    artifact::{ExtractStats, extract_zip_stream, fetch_artifact},
    check::{ResolvedCheck, parse_run_id, resolve_check},
    collect::{CollectSummary, collect, process_target, read_manifest, write_manifest},
    comments::{
        COMMENT_MARKER, COMMENT_MARKERS, CommentAction, ReconcileSummary, find_tracking_comment,
        generate_comment, reconcile_comment, reconcile_comments,
    },
    targets::enumerate_targets,
    waiter::{JobOutcome, PollLimiter, PollSettings, wait_for_job},
};
use preview_pages_core::{config::PreviewConfig, forge::Forge};

/// Shared context handed to every stage of a run.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<PreviewConfig>,
    pub forge: Arc<dyn Forge>,
}
