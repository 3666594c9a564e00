//! Job registry and lifecycle
//!
//! The registry maps job ids to [`JobHandle`]s and lives as long as the
//! process. Each handle guards its record with its own lock. The job's
//! pipeline task is the only writer; it clones the record, applies one
//! transition and swaps the whole record in under the write lock, so status
//! readers only ever see complete records in stage order.

use chrono::Utc;
use fw_common::events::{EventBus, FwEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::models::{AnalysisJob, AnalysisResult, DatePair, JobState, PipelineStage, TransitionError};
use crate::services::pipeline::AnalysisPipeline;

/// Shared access to one job record
#[derive(Clone)]
pub struct JobHandle {
    job_id: Uuid,
    record: Arc<RwLock<AnalysisJob>>,
    event_bus: EventBus,
}

impl JobHandle {
    fn new(job: AnalysisJob, event_bus: EventBus) -> Self {
        Self {
            job_id: job.job_id,
            record: Arc::new(RwLock::new(job)),
            event_bus,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Consistent copy of the current record
    pub async fn snapshot(&self) -> AnalysisJob {
        self.record.read().await.clone()
    }

    /// Apply one transition to a copy and publish it atomically
    async fn apply<F>(&self, transition: F) -> Result<AnalysisJob, AnalysisError>
    where
        F: FnOnce(&mut AnalysisJob) -> Result<(), TransitionError>,
    {
        let mut guard = self.record.write().await;
        let mut next = guard.clone();
        transition(&mut next).map_err(|e| {
            AnalysisError::Internal(format!("job {}: {}", self.job_id, e))
        })?;
        *guard = next.clone();
        Ok(next)
    }

    /// `queued → processing`
    pub async fn start(&self) -> Result<(), AnalysisError> {
        self.apply(AnalysisJob::start).await?;
        tracing::info!(job_id = %self.job_id, "Job processing");
        Ok(())
    }

    /// Record a finished stage and advance progress
    pub async fn stage_completed(&self, stage: PipelineStage) -> Result<(), AnalysisError> {
        let job = self.apply(|job| job.complete_stage(stage)).await?;
        tracing::info!(
            job_id = %self.job_id,
            stage = stage.as_str(),
            progress = job.progress,
            "Stage completed"
        );
        self.event_bus.emit_lossy(FwEvent::JobProgress {
            job_id: self.job_id,
            stage: stage.as_str().to_string(),
            progress: job.progress,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// `processing → completed`
    pub async fn complete(&self, result: Arc<AnalysisResult>) -> Result<(), AnalysisError> {
        self.apply(|job| job.complete(result)).await?;
        tracing::info!(job_id = %self.job_id, "Job completed");
        self.event_bus.emit_lossy(FwEvent::JobCompleted {
            job_id: self.job_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Move to `failed`, recording the error text verbatim
    pub async fn fail(&self, error: &AnalysisError) -> Result<(), AnalysisError> {
        let message = error.to_string();
        let job = self.apply(|job| job.fail(message.clone())).await?;
        tracing::error!(
            job_id = %self.job_id,
            progress = job.progress,
            error = %message,
            "Job failed"
        );
        self.event_bus.emit_lossy(FwEvent::JobFailed {
            job_id: self.job_id,
            error: message,
            progress: job.progress,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

/// Owner of all analysis jobs
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<Uuid, JobHandle>>>,
    pipeline: Arc<AnalysisPipeline>,
    event_bus: EventBus,
}

impl JobManager {
    pub fn new(pipeline: Arc<AnalysisPipeline>, event_bus: EventBus) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            pipeline,
            event_bus,
        }
    }

    pub fn pipeline(&self) -> &Arc<AnalysisPipeline> {
        &self.pipeline
    }

    /// Validate ISO dates and start a job
    ///
    /// Fails with `InvalidInput` (and creates nothing) when a date does not
    /// parse or `date_before` is not strictly earlier than `date_after`.
    pub async fn submit(&self, date_before: &str, date_after: &str) -> Result<Uuid, AnalysisError> {
        let before = parse_date("date_before", date_before)?;
        let after = parse_date("date_after", date_after)?;
        self.submit_dates(DatePair { before, after }).await
    }

    /// Start a job for already-parsed dates
    pub async fn submit_dates(&self, dates: DatePair) -> Result<Uuid, AnalysisError> {
        if dates.before >= dates.after {
            return Err(AnalysisError::InvalidInput(format!(
                "date_before ({}) must be earlier than date_after ({})",
                dates.before, dates.after
            )));
        }

        let job = AnalysisJob::new(dates);
        let job_id = job.job_id;
        let handle = JobHandle::new(job, self.event_bus.clone());
        self.jobs.write().await.insert(job_id, handle.clone());

        tracing::info!(
            job_id = %job_id,
            date_before = %dates.before,
            date_after = %dates.after,
            "Analysis job queued"
        );
        self.event_bus.emit_lossy(FwEvent::JobSubmitted {
            job_id,
            date_before: dates.before,
            date_after: dates.after,
            timestamp: Utc::now(),
        });

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            run_job(pipeline, handle, dates).await;
        });

        Ok(job_id)
    }

    async fn handle(&self, job_id: Uuid) -> Result<JobHandle, AnalysisError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(AnalysisError::NotFound(job_id))
    }

    /// Current state and progress of a job
    pub async fn status(&self, job_id: Uuid) -> Result<AnalysisJob, AnalysisError> {
        Ok(self.handle(job_id).await?.snapshot().await)
    }

    /// Results of a completed job
    ///
    /// `NotReady` for any other state, including `failed`.
    pub async fn results(&self, job_id: Uuid) -> Result<Arc<AnalysisResult>, AnalysisError> {
        let job = self.status(job_id).await?;
        match (job.state, job.result) {
            (JobState::Completed, Some(result)) => Ok(result),
            (state, _) => Err(AnalysisError::NotReady { job_id, state }),
        }
    }

    /// Jobs not yet completed or failed
    pub async fn active_jobs(&self) -> usize {
        let handles: Vec<JobHandle> = self.jobs.read().await.values().cloned().collect();
        let mut active = 0;
        for handle in handles {
            if !handle.snapshot().await.is_terminal() {
                active += 1;
            }
        }
        active
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

fn parse_date(field: &str, value: &str) -> Result<chrono::NaiveDate, AnalysisError> {
    if value.trim().is_empty() {
        return Err(AnalysisError::InvalidInput(format!("Missing {}", field)));
    }
    fw_common::dates::parse_iso_date(value)
        .map_err(|e| AnalysisError::InvalidInput(format!("{}: {}", field, e)))
}

/// Drive one job from `queued` to a terminal state
async fn run_job(pipeline: Arc<AnalysisPipeline>, handle: JobHandle, dates: DatePair) {
    let job_id = handle.job_id();

    if let Err(e) = handle.start().await {
        tracing::error!(job_id = %job_id, error = %e, "Could not start job");
        return;
    }

    // Inner task so a panicking stage still ends the job as failed
    let task = {
        let handle = handle.clone();
        tokio::spawn(async move { pipeline.execute(&handle, dates).await })
    };

    let outcome = match task.await {
        Ok(Ok(result)) => handle.complete(Arc::new(result)).await,
        Ok(Err(e)) => handle.fail(&e).await,
        Err(join_error) => {
            handle
                .fail(&AnalysisError::Internal(format!(
                    "pipeline task aborted: {}",
                    join_error
                )))
                .await
        }
    };

    if let Err(e) = outcome {
        tracing::error!(job_id = %job_id, error = %e, "Could not record job outcome");
    }
}
