use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::directive::deadline_zone;
use super::dispatch::{Job, JobQueue};
use super::roster::TeamRoster;
use crate::errors::SubmitError;

const SWEEP_RETRY_ATTEMPTS: u32 = 20;
const SWEEP_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// A wall-clock time of day in the deadline zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// The first occurrence of `at` strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let zone = deadline_zone();
        let local = now.with_timezone(&zone);
        let mut day = local.date_naive();
        loop {
            if let Some(candidate) = day.and_time(self.at).and_local_timezone(zone).single() {
                let candidate = candidate.with_timezone(&Utc);
                if candidate > now {
                    return candidate;
                }
            }
            day = day.succ_opt().unwrap_or(day);
        }
    }
}

/// Submit a sweep job every day at the scheduled time.
pub fn spawn_daily_sweep(schedule: DailySchedule, queue: Arc<JobQueue>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = schedule.next_run_after(now);
            info!(next = %next.with_timezone(&deadline_zone()), "next deadline sweep scheduled");
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if !submit_with_retry(&queue, Job::Sweep, SWEEP_RETRY_ATTEMPTS, SWEEP_RETRY_BACKOFF)
                .await
            {
                warn!("scheduled sweep skipped until tomorrow");
            }
        }
    })
}

/// Submit `job`, waiting `backoff` between attempts while the queue is
/// full. Returns whether the job was queued.
pub async fn submit_with_retry(
    queue: &JobQueue,
    job: Job,
    attempts: u32,
    backoff: Duration,
) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match queue.submit(job.clone()) {
            Ok(()) => return true,
            Err(SubmitError::QueueFull) if attempt < attempts => {
                warn!(attempt, job = job.kind(), "job queue full, retrying in {:?}", backoff);
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                warn!(job = job.kind(), "job not queued: {}", e);
                return false;
            }
        }
    }
    false
}

/// Rebuild the team roster every `every`, starting one period from now.
pub fn spawn_roster_refresh(roster: Arc<TeamRoster>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = roster.rebuild_full().await {
                warn!("team roster refresh failed, keeping previous roster: {}", e);
            }
        }
    })
}
