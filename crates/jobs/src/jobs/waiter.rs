use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use preview_pages_core::{config::PollConfig, forge::Forge};
use tokio::{
    sync::{Semaphore, SemaphorePermit},
    time::sleep,
};

/// Bounds how many job status reads are in flight at once, across all targets.
///
/// Cloning shares the same slots.
#[derive(Clone)]
pub struct PollLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PollLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { semaphore: Arc::new(Semaphore::new(capacity)), capacity }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore.acquire().await.context("Poll limiter closed")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<&PollConfig> for PollSettings {
    fn from(value: &PollConfig) -> Self {
        Self { interval: value.interval(), max_attempts: value.max_attempts }
    }
}

/// Terminal state of a polled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { conclusion: Option<String> },
    TimedOut { attempts: u32 },
}

/// Polls `job_id` until it completes or `max_attempts` reads have reported it unfinished.
///
/// Each read holds one limiter slot; the slot is released before sleeping so a waiting
/// target never blocks reads for the others.
pub async fn wait_for_job(
    forge: &dyn Forge,
    limiter: &PollLimiter,
    job_id: u64,
    settings: &PollSettings,
) -> Result<JobOutcome> {
    for attempt in 1..=settings.max_attempts {
        let status = {
            let _permit = limiter.acquire().await?;
            forge.job_status(job_id).await?
        };
        if status.is_completed() {
            return Ok(if status.is_success() {
                JobOutcome::Succeeded
            } else {
                JobOutcome::Failed { conclusion: status.conclusion }
            });
        }
        if attempt < settings.max_attempts {
            tracing::info!(
                "Waiting for job #{} to complete... ({}/{})",
                job_id,
                attempt,
                settings.max_attempts
            );
            sleep(settings.interval).await;
        }
    }
    Ok(JobOutcome::TimedOut { attempts: settings.max_attempts })
}
