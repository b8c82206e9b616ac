//! Push Scheduler
//!
//! One recurring job per session. Each tick pulls the session's topic from the
//! data provider and pushes the result (or an error envelope) to the session.
//!
//! - Subscribing again cancels and replaces the previous job
//! - Tick execution is bounded by a shared worker semaphore, independent of
//!   the number of connections
//! - A job whose session is gone cancels itself before touching the socket

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::messages::Envelope;
use super::registry::{EvictionListener, SessionRegistry};
use super::session::{Session, SessionId, TopicKey};
use crate::provider::{MetricPoint, ProviderError, RealtimeDataProvider};

/// Configuration for the push scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of ticks allowed to run at the same time
    pub workers: usize,
    /// Upper bound on one data-provider call
    pub fetch_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

struct ScheduledJob {
    job_id: u64,
    topic: TopicKey,
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledJob {
    /// Cancel and wait for the task to finish its current step
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!(job_id = self.job_id, topic = %self.topic, "Push job panicked");
            }
        }
    }
}

/// Snapshot of a session's active job
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub topic: TopicKey,
    pub interval: Duration,
}

/// Per-session recurring push jobs
pub struct PushScheduler {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn RealtimeDataProvider>,
    workers: Arc<Semaphore>,
    jobs: Arc<Mutex<HashMap<SessionId, ScheduledJob>>>,
    next_job_id: AtomicU64,
    config: SchedulerConfig,
}

impl PushScheduler {
    /// Create a scheduler and register it for the registry's evictions
    pub fn new(
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn RealtimeDataProvider>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            registry.set_eviction_listener(this.clone());

            Self {
                registry,
                provider,
                workers: Arc::new(Semaphore::new(config.workers.max(1))),
                jobs: Arc::new(Mutex::new(HashMap::new())),
                next_job_id: AtomicU64::new(1),
                config,
            }
        })
    }

    /// Start pushing `topic` to `session` every `interval`
    ///
    /// Any previous job for the session is cancelled, and has stopped, by the
    /// time this returns. The first tick fires immediately.
    pub async fn schedule(&self, session: Arc<Session>, topic: TopicKey, interval: Duration) {
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let session_id = session.id().to_string();

        let previous = {
            let mut jobs = self.jobs.lock().await;
            let task = JobTask {
                job_id,
                session,
                topic: topic.clone(),
                interval,
                cancel: cancel.clone(),
                registry: Arc::clone(&self.registry),
                provider: Arc::clone(&self.provider),
                workers: Arc::clone(&self.workers),
                jobs: Arc::clone(&self.jobs),
                fetch_timeout: self.config.fetch_timeout,
            };
            let handle = tokio::spawn(task.run());

            jobs.insert(
                session_id.clone(),
                ScheduledJob {
                    job_id,
                    topic: topic.clone(),
                    interval,
                    cancel,
                    handle,
                },
            )
        };

        if let Some(previous) = previous {
            tracing::debug!(
                session_id = %session_id,
                topic = %previous.topic,
                "Replacing push job"
            );
            previous.stop().await;
        }

        tracing::info!(
            session_id = %session_id,
            job_id,
            topic = %topic,
            interval_secs = interval.as_secs(),
            "Push job started"
        );
    }

    /// Cancel the session's job, if any
    ///
    /// Returns the cancelled job's topic. Once this returns, the job will not
    /// write to the session again.
    pub async fn cancel(&self, session_id: &str) -> Option<TopicKey> {
        let job = self.jobs.lock().await.remove(session_id)?;
        let topic = job.topic.clone();
        job.stop().await;

        tracing::info!(session_id = %session_id, topic = %topic, "Push job cancelled");
        Some(topic)
    }

    /// The session's active job, if any
    pub async fn job_info(&self, session_id: &str) -> Option<JobInfo> {
        self.jobs.lock().await.get(session_id).map(|job| JobInfo {
            topic: job.topic.clone(),
            interval: job.interval,
        })
    }

    /// Number of live jobs
    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Cancel every job and wait for them to stop
    pub async fn shutdown(&self) {
        let jobs: Vec<ScheduledJob> = self.jobs.lock().await.drain().map(|(_, j)| j).collect();
        let count = jobs.len();

        for job in &jobs {
            job.cancel.cancel();
        }
        for job in jobs {
            job.stop().await;
        }

        tracing::info!(jobs = count, "Push scheduler stopped");
    }
}

#[async_trait]
impl EvictionListener for PushScheduler {
    /// Cancel the evicted session's job without waiting for it
    ///
    /// The failed write may have come from the job itself, so its task is
    /// signalled and detached rather than joined. The session is already
    /// closed, so the job cannot write again.
    async fn session_evicted(&self, session_id: &str) {
        let job = self.jobs.lock().await.remove(session_id);
        if let Some(job) = job {
            job.cancel.cancel();
            tracing::info!(
                session_id = %session_id,
                topic = %job.topic,
                "Push job cancelled after eviction"
            );
        }
    }
}

/// State moved into a job's task
struct JobTask {
    job_id: u64,
    session: Arc<Session>,
    topic: TopicKey,
    interval: Duration,
    cancel: CancellationToken,
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn RealtimeDataProvider>,
    workers: Arc<Semaphore>,
    jobs: Arc<Mutex<HashMap<SessionId, ScheduledJob>>>,
    fetch_timeout: Duration,
}

impl JobTask {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.session.is_open() {
                tracing::debug!(
                    session_id = %self.session.id(),
                    job_id = self.job_id,
                    "Session closed, push job stopping"
                );
                self.deregister().await;
                break;
            }

            if !self.tick().await {
                self.deregister().await;
                break;
            }
        }
    }

    /// One fetch-and-deliver cycle. Returns false when the job should stop.
    async fn tick(&self) -> bool {
        let Some(fetched) = self.fetch().await else {
            return false;
        };

        let envelope = match fetched {
            Ok(points) => match serde_json::to_value(&points) {
                Ok(data) => Envelope::realtime_data(&self.topic, data),
                Err(e) => {
                    Envelope::topic_error(&self.topic, format!("Failed to encode data: {}", e))
                }
            },
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session.id(),
                    topic = %self.topic,
                    error = %e,
                    "Realtime fetch failed"
                );
                Envelope::topic_error(&self.topic, e.to_string())
            }
        };

        if self.cancel.is_cancelled() || !self.session.is_open() {
            return false;
        }

        match self.registry.send_to_session(self.session.id(), &envelope).await {
            Ok(()) => {
                tracing::trace!(
                    session_id = %self.session.id(),
                    topic = %self.topic,
                    "Pushed realtime envelope"
                );
                true
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %self.session.id(),
                    error = %e,
                    "Push failed, job stopping"
                );
                false
            }
        }
    }

    /// Fetch under a worker slot. The slot is released before delivery, so a
    /// slow consumer only ever delays its own job.
    async fn fetch(&self) -> Option<Result<Vec<MetricPoint>, ProviderError>> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            permit = Arc::clone(&self.workers).acquire_owned() => permit.ok()?,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(
                self.fetch_timeout,
                self.provider.fetch_realtime(
                    &self.topic.company,
                    &self.topic.measurement,
                    &self.topic.gateway_id,
                ),
            ) => Some(result.unwrap_or(Err(ProviderError::Timeout))),
        }
    }

    /// Drop this job's entry unless it has already been replaced
    async fn deregister(&self) {
        let mut jobs = self.jobs.lock().await;
        if jobs
            .get(self.session.id())
            .is_some_and(|job| job.job_id == self.job_id)
        {
            jobs.remove(self.session.id());
        }
    }
}
