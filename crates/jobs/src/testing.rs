use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::{Cursor, Write},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use preview_pages_core::{
    forge::{
        Artifact, ByteStream, CheckRun, FetchedBody, Forge, IssueComment, JobStatus, RunStatus,
    },
    models::PullRequestTarget,
};
use zip::{ZipWriter, write::SimpleFileOptions};

pub const BOT_LOGIN: &str = "preview-pages[bot]";

#[derive(Default)]
pub struct FakeState {
    pub branches: Vec<String>,
    pub pull_requests: Vec<PullRequestTarget>,
    pub fail_pull_requests: bool,
    pub check_runs: HashMap<String, Vec<CheckRun>>,
    /// `(git_ref, check_name)` of every check run lookup.
    pub check_queries: Vec<(String, String)>,
    /// Refs whose check run lookup panics.
    pub panic_refs: HashSet<String>,
    /// Statuses returned by successive reads; the last one repeats.
    pub job_statuses: HashMap<u64, VecDeque<JobStatus>>,
    pub read_delay: Duration,
    pub artifacts: HashMap<u64, Vec<Artifact>>,
    pub download_urls: HashMap<u64, String>,
    pub downloads: HashMap<String, (u16, Option<Vec<u8>>)>,
    pub comments: HashMap<u64, Vec<IssueComment>>,
    pub fail_comments: HashSet<u64>,
    pub created: Vec<(u64, String)>,
    pub updated: Vec<(u64, String)>,
    job_reads: HashMap<u64, u32>,
    reads_in_flight: usize,
    max_reads_in_flight: usize,
    next_comment_id: u64,
}

#[derive(Default)]
pub struct FakeForge {
    state: Mutex<FakeState>,
}

impl FakeForge {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, FakeState> { self.state.lock().unwrap() }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R { f(&mut self.state()) }

    pub fn job_reads(&self, job_id: u64) -> u32 {
        self.state().job_reads.get(&job_id).copied().unwrap_or_default()
    }

    pub fn max_reads_in_flight(&self) -> usize { self.state().max_reads_in_flight }

    /// Registers a passing `build_preview_pages` check on `git_ref` whose run carries a
    /// `preview-pages` artifact containing `archive`. Job and run share `id`.
    pub fn add_successful_build(&self, git_ref: &str, id: u64, archive: Vec<u8>) {
        let url = format!("https://blob.example/{id}.zip");
        self.with_state(|state| {
            state.check_runs.entry(git_ref.to_string()).or_default().push(check_run(
                id,
                "build_preview_pages",
                Some(&format!("https://github.com/voicevox/voicevox/actions/runs/{id}/job/{id}")),
            ));
            state
                .job_statuses
                .insert(id, [job_status(RunStatus::Completed, Some("success"))].into());
            state.artifacts.insert(id, vec![Artifact {
                id,
                name: "preview-pages".to_string(),
                archive_download_url: format!("https://api.github.com/artifacts/{id}/zip"),
                expired: false,
            }]);
            state.download_urls.insert(id, url.clone());
            state.downloads.insert(url, (200, Some(archive)));
        });
    }
}

pub fn pull_request(number: u64) -> PullRequestTarget {
    PullRequestTarget {
        number,
        head_sha: "abcdef1234567890abcdef1234567890abcdef12".to_string(),
        head_repo_full_name: "contributor/voicevox".to_string(),
    }
}

pub fn check_run(id: u64, name: &str, details_url: Option<&str>) -> CheckRun {
    CheckRun {
        id,
        name: name.to_string(),
        details_url: details_url.map(str::to_string),
        status: RunStatus::Completed,
        conclusion: Some("success".to_string()),
    }
}

pub fn job_status(status: RunStatus, conclusion: Option<&str>) -> JobStatus {
    JobStatus { status, conclusion: conclusion.map(str::to_string) }
}

pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Builds a stored archive the way streaming writers do: every local header has the
/// data descriptor flag set with zero CRC and sizes, and the real values follow the data.
pub fn zip_bytes_with_descriptors(files: &[(&str, &str)]) -> Vec<u8> {
    const FLAGS: u16 = 0x0008;
    const DOS_DATE: u16 = (1 << 5) | 1;
    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, contents) in files {
        let offset = out.len() as u32;
        let crc = crc32(contents.as_bytes());
        let len = contents.len() as u32;

        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&FLAGS.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&DOS_DATE.to_le_bytes());
        out.extend_from_slice(&[0; 12]); // crc, compressed and uncompressed size
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(contents.as_bytes());
        out.extend_from_slice(&0x08074b50u32.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());

        central.extend_from_slice(&0x02014b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&FLAGS.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&DOS_DATE.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&len.to_le_bytes());
        central.extend_from_slice(&len.to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0; 12]); // extra, comment, disk, attributes
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }
    let central_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x06054b50u32.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB88320 } else { crc >> 1 };
        }
    }
    !crc
}

/// Splits `data` into `chunk_size` pieces to simulate a body arriving over the network.
pub fn byte_stream(data: Vec<u8>, chunk_size: usize) -> ByteStream {
    let chunks = data
        .chunks(chunk_size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect::<Vec<_>>();
    futures_util::stream::iter(chunks).boxed()
}

#[async_trait]
impl Forge for FakeForge {
    async fn list_branches(&self) -> Result<Vec<String>> { Ok(self.state().branches.clone()) }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequestTarget>> {
        let state = self.state();
        if state.fail_pull_requests {
            return Err(anyhow!("pull request listing failed"));
        }
        Ok(state.pull_requests.clone())
    }

    async fn check_runs_for_ref(&self, git_ref: &str, check_name: &str) -> Result<Vec<CheckRun>> {
        let should_panic = self.state().panic_refs.contains(git_ref);
        if should_panic {
            panic!("check run lookup for {git_ref} panicked");
        }
        let mut state = self.state();
        state.check_queries.push((git_ref.to_string(), check_name.to_string()));
        Ok(state
            .check_runs
            .get(git_ref)
            .into_iter()
            .flatten()
            .filter(|check_run| check_run.name == check_name)
            .cloned()
            .collect())
    }

    async fn job_status(&self, job_id: u64) -> Result<JobStatus> {
        let delay = {
            let mut state = self.state();
            state.reads_in_flight += 1;
            state.max_reads_in_flight = state.max_reads_in_flight.max(state.reads_in_flight);
            state.read_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.reads_in_flight -= 1;
        *state.job_reads.entry(job_id).or_default() += 1;
        let statuses =
            state.job_statuses.get_mut(&job_id).ok_or_else(|| anyhow!("job {job_id} not found"))?;
        let status = if statuses.len() > 1 { statuses.pop_front() } else { statuses.front().cloned() };
        status.ok_or_else(|| anyhow!("job {job_id} has no status"))
    }

    async fn list_run_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>> {
        Ok(self.state().artifacts.get(&run_id).cloned().unwrap_or_default())
    }

    async fn artifact_download_url(&self, artifact_id: u64) -> Result<Option<String>> {
        Ok(self.state().download_urls.get(&artifact_id).cloned())
    }

    async fn fetch_stream(&self, url: &str) -> Result<FetchedBody> {
        let (status, body) =
            self.state().downloads.get(url).cloned().ok_or_else(|| anyhow!("{url} not found"))?;
        Ok(FetchedBody { status, body: body.map(|data| byte_stream(data, 64)) })
    }

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        let state = self.state();
        if state.fail_comments.contains(&number) {
            return Err(anyhow!("comments for #{number} unavailable"));
        }
        Ok(state.comments.get(&number).cloned().unwrap_or_default())
    }

    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state();
        state.next_comment_id += 1;
        let id = 1000 + state.next_comment_id;
        state.comments.entry(number).or_default().push(IssueComment {
            id,
            author: Some(BOT_LOGIN.to_string()),
            body: Some(body.to_string()),
        });
        state.created.push((number, body.to_string()));
        Ok(())
    }

    async fn update_issue_comment(&self, comment_id: u64, body: &str) -> Result<()> {
        let mut state = self.state();
        let comment = state
            .comments
            .values_mut()
            .flatten()
            .find(|comment| comment.id == comment_id)
            .ok_or_else(|| anyhow!("comment {comment_id} not found"))?;
        comment.body = Some(body.to_string());
        state.updated.push((comment_id, body.to_string()));
        Ok(())
    }

    fn bot_login(&self) -> &str { BOT_LOGIN }
}
