//! services/api/src/web/jobs.rs
//!
//! In-process background jobs. Submitting a job returns immediately; a fixed set
//! of worker tasks drains the queue and runs the story pipeline. Job state lives
//! in memory and is lost on restart. Finished jobs are dropped from the registry
//! once they are older than the configured retention.

use crate::web::story_task::StoryPipeline;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use storybook_core::ports::{PortError, PortResult};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Write and illustrate the pages of an already created story.
    GenerateStory { story_id: Uuid, theme: String },
    /// Narrate every page of a story that has no audio yet.
    NarrateStory { story_id: Uuid },
}

impl JobKind {
    pub fn story_id(&self) -> Uuid {
        match self {
            JobKind::GenerateStory { story_id, .. } | JobKind::NarrateStory { story_id } => {
                *story_id
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::GenerateStory { .. } => "generate_story",
            JobKind::NarrateStory { .. } => "narrate_story",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A point-in-time copy of a job's state.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Upstream calls that degraded while the job ran.
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

type Registry = Arc<RwLock<HashMap<Uuid, JobSnapshot>>>;

//=========================================================================================
// JobQueue
//=========================================================================================

pub struct JobQueue {
    registry: Registry,
    sender: mpsc::UnboundedSender<Uuid>,
    retention: Duration,
}

impl JobQueue {
    /// Spawns `workers` tasks that run jobs until `shutdown` is cancelled.
    ///
    /// Finished jobs stay queryable for `retention` after they finish.
    pub fn start(
        pipeline: StoryPipeline,
        workers: usize,
        retention: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = workers.max(1);
        for worker in 0..workers {
            tokio::spawn(worker_loop(
                worker,
                registry.clone(),
                receiver.clone(),
                pipeline.clone(),
                shutdown.clone(),
            ));
        }
        info!(workers, retention_secs = retention.as_secs(), "Job workers started");

        Self {
            registry,
            sender,
            retention,
        }
    }

    /// Registers a job as pending and hands it to the workers.
    pub async fn submit(&self, kind: JobKind) -> PortResult<JobSnapshot> {
        self.evict_expired().await;

        let job = JobSnapshot {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            warnings: Vec::new(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.registry.write().await.insert(job.id, job.clone());

        if self.sender.send(job.id).is_err() {
            self.finish(job.id, Err("job workers are not running".to_string()))
                .await;
            return Err(PortError::Unexpected(
                "Job workers are not running".to_string(),
            ));
        }

        info!(job_id = %job.id, kind = job.kind.name(), story_id = %job.kind.story_id(), "Job submitted");
        Ok(job)
    }

    pub async fn get(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.registry.read().await.get(&job_id).cloned()
    }

    /// Number of jobs currently held in the registry.
    pub async fn job_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Drops finished jobs whose retention has run out. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let mut jobs = self.registry.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !is_expired(job, now, self.retention));
        let evicted = before - jobs.len();
        if evicted > 0 {
            info!(evicted, remaining = jobs.len(), "Evicted finished jobs");
        }
        evicted
    }

    async fn finish(&self, job_id: Uuid, outcome: Result<Vec<String>, String>) {
        finish(&self.registry, job_id, outcome).await;
    }
}

fn is_expired(job: &JobSnapshot, now: DateTime<Utc>, retention: Duration) -> bool {
    if !job.status.is_finished() {
        return false;
    }
    job.finished_at
        .and_then(|finished_at| (now - finished_at).to_std().ok())
        .is_some_and(|age| age >= retention)
}

async fn finish(registry: &Registry, job_id: Uuid, outcome: Result<Vec<String>, String>) {
    if let Some(job) = registry.write().await.get_mut(&job_id) {
        match outcome {
            Ok(warnings) => {
                job.status = JobStatus::Completed;
                job.warnings = warnings;
            }
            Err(message) => {
                job.status = JobStatus::Failed;
                job.error = Some(message);
            }
        }
        job.finished_at = Some(Utc::now());
    }
}

async fn worker_loop(
    worker: usize,
    registry: Registry,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    pipeline: StoryPipeline,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            job_id = async { receiver.lock().await.recv().await } => job_id,
        };
        let Some(job_id) = next else {
            break;
        };

        let kind = {
            let mut jobs = registry.write().await;
            match jobs.get_mut(&job_id) {
                Some(job) => {
                    job.status = JobStatus::Running;
                    job.kind.clone()
                }
                None => continue,
            }
        };

        info!(worker, job_id = %job_id, kind = kind.name(), "Job started");
        let outcome = match &kind {
            JobKind::GenerateStory { story_id, theme } => {
                pipeline.populate_pages(*story_id, theme).await
            }
            JobKind::NarrateStory { story_id } => pipeline
                .narrate_story(*story_id)
                .await
                .map(|(_, warnings)| warnings),
        };

        match &outcome {
            Ok(warnings) if warnings.is_empty() => info!(job_id = %job_id, "Job completed"),
            Ok(warnings) => warn!(job_id = %job_id, warnings = warnings.len(), "Job completed with warnings"),
            Err(e) => error!(job_id = %job_id, "Job failed: {}", e),
        }
        finish(&registry, job_id, outcome.map_err(|e| e.to_string())).await;
    }
    info!(worker, "Job worker stopped");
}
