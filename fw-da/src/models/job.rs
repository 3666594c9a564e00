//! Analysis job state machine
//!
//! `queued → processing → {completed | failed}`. Transitions are
//! one-directional and progress never decreases. Transition methods validate
//! before touching any field, so a rejected transition leaves the record
//! unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::explanation::Explanation;
use super::metrics::{Metrics, Patch};

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Retrieval,
    Clipping,
    Detection,
    Metrics,
    Visualization,
    Explanation,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Retrieval,
        PipelineStage::Clipping,
        PipelineStage::Detection,
        PipelineStage::Metrics,
        PipelineStage::Visualization,
        PipelineStage::Explanation,
    ];

    /// Share of overall progress contributed by the stage
    pub fn weight(&self) -> u8 {
        match self {
            PipelineStage::Retrieval => 30,
            PipelineStage::Clipping => 10,
            PipelineStage::Detection => 30,
            PipelineStage::Metrics => 10,
            PipelineStage::Visualization => 10,
            PipelineStage::Explanation => 10,
        }
    }

    /// Cumulative progress once this stage has finished
    pub fn progress_after(&self) -> u8 {
        Self::ALL
            .iter()
            .take_while(|s| *s <= self)
            .map(PipelineStage::weight)
            .sum()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Retrieval => "retrieval",
            PipelineStage::Clipping => "clipping",
            PipelineStage::Detection => "detection",
            PipelineStage::Metrics => "metrics",
            PipelineStage::Visualization => "visualization",
            PipelineStage::Explanation => "explanation",
        }
    }
}

/// Rejected state machine transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidState { from: JobState, to: JobState },

    #[error("stage {stage} would move progress backwards ({current} -> {requested})")]
    ProgressRegression {
        stage: &'static str,
        current: u8,
        requested: u8,
    },
}

/// Web paths of a job's rendered images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobImages {
    pub before: String,
    pub after: String,
    pub highlight: String,
}

impl JobImages {
    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            before: format!("/api/images/{}/before", job_id),
            after: format!("/api/images/{}/after", job_id),
            highlight: format!("/api/images/{}/highlight", job_id),
        }
    }
}

/// The dates an analysis compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePair {
    pub before: NaiveDate,
    pub after: NaiveDate,
}

/// Outputs of a completed analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub metrics: Metrics,
    /// Patches ordered by descending area
    pub patches: Vec<Patch>,
    pub explanation: Explanation,
    pub images: JobImages,
    pub dates: DatePair,
    #[serde(skip)]
    pub output_dir: PathBuf,
}

/// One analysis request and its progress
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub job_id: Uuid,
    pub state: JobState,
    /// 0-100, non-decreasing
    pub progress: u8,
    /// Last stage that finished
    pub stage: Option<PipelineStage>,
    pub dates: DatePair,
    pub result: Option<Arc<AnalysisResult>>,
    /// Present only when failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// Create a queued job
    pub fn new(dates: DatePair) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            state: JobState::Queued,
            progress: 0,
            stage: None,
            dates,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// `queued → processing`
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.require(JobState::Queued, JobState::Processing)?;
        self.state = JobState::Processing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a finished stage while processing
    pub fn complete_stage(&mut self, stage: PipelineStage) -> Result<(), TransitionError> {
        self.require(JobState::Processing, JobState::Processing)?;
        let requested = stage.progress_after();
        if requested < self.progress {
            return Err(TransitionError::ProgressRegression {
                stage: stage.as_str(),
                current: self.progress,
                requested,
            });
        }
        self.progress = requested;
        self.stage = Some(stage);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `processing → completed`
    pub fn complete(&mut self, result: Arc<AnalysisResult>) -> Result<(), TransitionError> {
        self.require(JobState::Processing, JobState::Completed)?;
        let now = Utc::now();
        self.state = JobState::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.updated_at = now;
        self.ended_at = Some(now);
        Ok(())
    }

    /// `queued | processing → failed`, progress frozen
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::InvalidState {
                from: self.state,
                to: JobState::Failed,
            });
        }
        let now = Utc::now();
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        self.ended_at = Some(now);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn require(&self, expected: JobState, to: JobState) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransitionError::InvalidState {
                from: self.state,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::explanation::Explanation;

    fn dates() -> DatePair {
        DatePair {
            before: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            after: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    fn result() -> Arc<AnalysisResult> {
        Arc::new(AnalysisResult {
            metrics: Metrics {
                total_area_m2: 0.0,
                total_area_hectares: 0.0,
                deforested_area_m2: 0.0,
                deforested_area_hectares: 0.0,
                forest_loss_percentage: 0.0,
                number_of_patches: 0,
                largest_patch_m2: 0.0,
                largest_patch_hectares: 0.0,
                intact_forest_m2: 0.0,
                intact_forest_hectares: 0.0,
                pixel_size_meters: 10.0,
                total_pixels: 0,
                deforested_pixels: 0,
                boundary_polygon_area_m2: None,
            },
            patches: Vec::new(),
            explanation: Explanation::unavailable("test", "not requested"),
            images: JobImages::for_job(Uuid::nil()),
            dates: dates(),
            output_dir: PathBuf::new(),
        })
    }

    #[test]
    fn test_stage_weights_sum_to_100() {
        assert_eq!(PipelineStage::Explanation.progress_after(), 100);
        assert_eq!(PipelineStage::Retrieval.progress_after(), 30);
        assert_eq!(PipelineStage::Clipping.progress_after(), 40);
        assert_eq!(PipelineStage::Detection.progress_after(), 70);
        assert_eq!(PipelineStage::Metrics.progress_after(), 80);
        assert_eq!(PipelineStage::Visualization.progress_after(), 90);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = AnalysisJob::new(dates());
        assert_eq!(job.state, JobState::Queued);
        job.start().unwrap();

        let mut last = job.progress;
        for stage in PipelineStage::ALL {
            job.complete_stage(stage).unwrap();
            assert!(job.progress >= last);
            last = job.progress;
        }

        job.complete(result()).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.ended_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = AnalysisJob::new(dates());
        job.start().unwrap();
        job.complete(result()).unwrap();

        assert!(job.fail("late error").is_err());
        assert!(job.start().is_err());
        assert!(job.complete_stage(PipelineStage::Metrics).is_err());
        assert_eq!(job.state, JobState::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_freezes_progress() {
        let mut job = AnalysisJob::new(dates());
        job.start().unwrap();
        job.complete_stage(PipelineStage::Retrieval).unwrap();
        job.fail("Inference failed: model offline").unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.progress, 30);
        assert_eq!(job.error.as_deref(), Some("Inference failed: model offline"));
        assert!(job.complete_stage(PipelineStage::Clipping).is_err());
        assert_eq!(job.progress, 30);
    }

    #[test]
    fn test_progress_cannot_regress() {
        let mut job = AnalysisJob::new(dates());
        job.start().unwrap();
        job.complete_stage(PipelineStage::Detection).unwrap();

        let err = job.complete_stage(PipelineStage::Clipping).unwrap_err();
        assert!(matches!(err, TransitionError::ProgressRegression { .. }));
        assert_eq!(job.progress, 70);
        assert_eq!(job.stage, Some(PipelineStage::Detection));
    }

    #[test]
    fn test_cannot_complete_from_queued() {
        let mut job = AnalysisJob::new(dates());
        assert!(job.complete(result()).is_err());
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(JobState::Processing).unwrap(),
            serde_json::json!("processing")
        );
    }
}
