//! Bounded worker pool for webhook-triggered work.
//!
//! The HTTP handler turns each accepted delivery into a `Job` and submits it
//! without waiting. A fixed number of workers pull jobs off one bounded
//! channel. When the channel is full, `submit` fails immediately so the
//! caller can answer 503 instead of queueing without limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::deadline::DeadlineEngine;
use super::models::{Card, Issue};
use super::transition::TransitionEngine;
use crate::errors::{BoardError, SubmitError};

#[derive(Debug, Clone)]
pub enum Job {
    IssueEdited(Issue),
    AssigneeChanged(Issue),
    CardTracked(Card),
    CardUntracked(Card),
    Sweep,
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::IssueEdited(_) => "issue_edited",
            Job::AssigneeChanged(_) => "assignee_changed",
            Job::CardTracked(_) => "card_tracked",
            Job::CardUntracked(_) => "card_untracked",
            Job::Sweep => "sweep",
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> Result<(), BoardError>;
}

/// Routes jobs to the deadline and transition engines.
pub struct BoardWorkflows {
    pub deadlines: Arc<DeadlineEngine>,
    pub transitions: Arc<TransitionEngine>,
}

#[async_trait]
impl JobHandler for BoardWorkflows {
    async fn handle(&self, job: Job) -> Result<(), BoardError> {
        match job {
            Job::IssueEdited(issue) => {
                self.deadlines.on_issue_edited(&issue, Utc::now()).await?;
            }
            Job::AssigneeChanged(issue) => {
                self.transitions.on_assignee_changed(&issue).await?;
            }
            Job::CardTracked(card) => {
                self.deadlines.on_card_tracked(&card, Utc::now()).await?;
            }
            Job::CardUntracked(card) => {
                self.deadlines.on_card_untracked(&card).await?;
            }
            Job::Sweep => {
                self.deadlines.sweep_all(Utc::now()).await;
            }
        }
        Ok(())
    }
}

pub struct JobQueue {
    tx: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    processed: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Spawn `workers` tasks sharing a channel of `capacity` jobs.
    pub fn start(handler: Arc<dyn JobHandler>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let processed = Arc::new(AtomicUsize::new(0));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let handler = handler.clone();
                let processed = processed.clone();
                tokio::spawn(async move {
                    loop {
                        // Only the receive is under the lock; handlers run in parallel.
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        let kind = job.kind();
                        match handler.handle(job).await {
                            Ok(()) | Err(BoardError::NotInTrackedColumns) => {
                                debug!(worker, job = kind, "job done");
                            }
                            Err(e) => warn!(worker, job = kind, "job abandoned: {}", e),
                        }
                        processed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: std::sync::Mutex::new(handles),
            processed,
        }
    }

    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or(SubmitError::ShuttingDown)?;
        tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                warn!(job = job.kind(), "job queue full, rejecting");
                SubmitError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => SubmitError::ShuttingDown,
        })
    }

    /// Number of jobs the workers have finished, successful or not.
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs, let the workers drain what is queued, and wait
    /// for them to exit.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().unwrap_or_else(|e| e.into_inner()).take());
        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("job worker panicked: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{Notify, Semaphore};

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        async fn handle(&self, job: Job) -> Result<(), BoardError> {
            self.seen.lock().unwrap().push(job.kind());
            Ok(())
        }
    }

    /// Blocks every job until the gate gets permits.
    struct Gated {
        started: Notify,
        gate: Semaphore,
    }

    #[async_trait]
    impl JobHandler for Gated {
        async fn handle(&self, _job: Job) -> Result<(), BoardError> {
            self.started.notify_one();
            self.gate.acquire().await.unwrap().forget();
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl JobHandler for Failing {
        async fn handle(&self, _job: Job) -> Result<(), BoardError> {
            Err(BoardError::Provider(anyhow::anyhow!("boom")))
        }
    }

    #[tokio::test]
    async fn test_jobs_are_handled_and_drained_on_shutdown() {
        let recorder = Arc::new(Recorder::default());
        let queue = JobQueue::start(recorder.clone(), 2, 16);

        queue.submit(Job::Sweep).unwrap();
        queue.submit(Job::Sweep).unwrap();
        queue.submit(Job::Sweep).unwrap();
        queue.shutdown().await;

        assert_eq!(queue.processed(), 3);
        assert_eq!(recorder.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let handler = Arc::new(Gated {
            started: Notify::new(),
            gate: Semaphore::new(0),
        });
        let queue = JobQueue::start(handler.clone(), 1, 1);

        queue.submit(Job::Sweep).unwrap();
        handler.started.notified().await;
        // The single worker is busy, so one job fits in the channel.
        queue.submit(Job::Sweep).unwrap();
        assert_eq!(queue.submit(Job::Sweep), Err(SubmitError::QueueFull));

        handler.gate.add_permits(2);
        queue.shutdown().await;
        assert_eq!(queue.processed(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let queue = JobQueue::start(Arc::new(Recorder::default()), 1, 4);
        queue.shutdown().await;
        assert_eq!(queue.submit(Job::Sweep), Err(SubmitError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_failed_jobs_still_count() {
        let queue = JobQueue::start(Arc::new(Failing), 1, 4);
        queue.submit(Job::Sweep).unwrap();
        queue.shutdown().await;
        assert_eq!(queue.processed(), 1);
    }

    #[test]
    fn test_job_kinds() {
        let card = Card {
            id: 1,
            content_url: None,
            column_id: None,
        };
        assert_eq!(Job::CardTracked(card.clone()).kind(), "card_tracked");
        assert_eq!(Job::CardUntracked(card).kind(), "card_untracked");
        assert_eq!(Job::Sweep.kind(), "sweep");
    }
}
