//! Analysis pipeline
//!
//! Runs retrieve → clip → detect → metrics → visualize → explain for one job,
//! reporting each finished stage through the job's [`JobHandle`]. Collaborator
//! calls are awaited on the job's own task; CPU-bound stages run on the
//! blocking pool so status queries never wait on them.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::collaborators::{ImagerySource, InferenceEngine, NarrativeGenerator};
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, Boundary, DatePair, JobImages, PipelineStage};
use crate::services::boundary_clipper::clip;
use crate::services::change_detector::{align, ChangeDetector};
use crate::services::explainer::ExplanationRequester;
use crate::services::job_manager::JobHandle;
use crate::services::metrics_engine::{analyze, MetricsParams, PatchAnalysis};
use crate::services::output_store::{mask_npy, probability_npy, Artifact, OutputStore};
use crate::services::visualizer::{encode_png, true_colour, Visualizer};

/// Collaborators and settings shared by every job
pub struct AnalysisPipeline {
    imagery: Arc<dyn ImagerySource>,
    detector: ChangeDetector,
    explainer: ExplanationRequester,
    visualizer: Visualizer,
    boundary: Arc<Boundary>,
    params: MetricsParams,
    store: OutputStore,
}

impl AnalysisPipeline {
    pub fn new(
        imagery: Arc<dyn ImagerySource>,
        inference: Arc<dyn InferenceEngine>,
        narrator: Arc<dyn NarrativeGenerator>,
        boundary: Arc<Boundary>,
        params: MetricsParams,
        store: OutputStore,
    ) -> Self {
        Self {
            imagery,
            detector: ChangeDetector::new(inference),
            explainer: ExplanationRequester::new(narrator),
            visualizer: Visualizer::new(params.severity),
            boundary,
            params,
            store,
        }
    }

    /// Replace the explanation requester (e.g. to shorten its timeout)
    pub fn with_explainer(mut self, explainer: ExplanationRequester) -> Self {
        self.explainer = explainer;
        self
    }

    pub fn imagery(&self) -> &Arc<dyn ImagerySource> {
        &self.imagery
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn params(&self) -> &MetricsParams {
        &self.params
    }

    /// Run every stage for one job
    ///
    /// The first stage error is returned unchanged; the caller records it on
    /// the job. Explanation failures are absorbed into the result.
    pub async fn execute(
        &self,
        handle: &JobHandle,
        dates: DatePair,
    ) -> Result<AnalysisResult, AnalysisError> {
        let job_id = handle.job_id();
        let started = Instant::now();

        // Retrieval
        tracing::info!(job_id = %job_id, source = self.imagery.name(), "Retrieving imagery");
        let (before, after) = tokio::try_join!(
            self.imagery.fetch(dates.before),
            self.imagery.fetch(dates.after)
        )?;
        tracing::info!(
            job_id = %job_id,
            before_cloud_cover = ?before.cloud_cover(),
            after_cloud_cover = ?after.cloud_cover(),
            "Imagery retrieved"
        );
        handle.stage_completed(PipelineStage::Retrieval).await?;

        // Clipping
        let boundary = Arc::clone(&self.boundary);
        let (before, after) = blocking(PipelineStage::Clipping, move || {
            Ok((clip(&before, &boundary)?, clip(&after, &boundary)?))
        })
        .await?;
        handle.stage_completed(PipelineStage::Clipping).await?;

        // Detection
        tracing::info!(job_id = %job_id, engine = self.detector.engine_name(), "Detecting change");
        let detector = self.detector.clone();
        let (before, after, probability) = blocking(PipelineStage::Detection, move || {
            let (before, after) = if before.same_grid(&after) {
                (before, after)
            } else {
                let (b, a) = align(&before, &after)?;
                (b.into_owned(), a.into_owned())
            };
            let probability = detector.predict_aligned(&before, &after)?;
            Ok((before, after, probability))
        })
        .await?;
        handle.stage_completed(PipelineStage::Detection).await?;

        // Metrics
        let params = self.params;
        let transform = *before.transform();
        let polygon_area = self.boundary.area();
        let (probability, analysis) = blocking(PipelineStage::Metrics, move || {
            let mut analysis = analyze(
                &probability,
                transform.resolution_x,
                transform.resolution_y,
                &params,
            )?;
            analysis.metrics.boundary_polygon_area_m2 = Some(polygon_area);
            Ok((probability, analysis))
        })
        .await?;
        let PatchAnalysis {
            mask,
            patches,
            metrics,
        } = analysis;

        tracing::info!(
            job_id = %job_id,
            patches = metrics.number_of_patches,
            deforested_ha = metrics.deforested_area_hectares,
            loss_pct = metrics.forest_loss_percentage,
            "Metrics computed"
        );

        self.store
            .write(job_id, Artifact::Probability, &probability_npy(&probability))
            .await?;
        self.store
            .write(job_id, Artifact::Mask, &mask_npy(&mask))
            .await?;
        self.store
            .write_json(
                job_id,
                Artifact::Metrics,
                &json!({
                    "job_id": job_id,
                    "dates": dates,
                    "metrics": metrics,
                    "patches": patches,
                }),
            )
            .await?;
        handle.stage_completed(PipelineStage::Metrics).await?;

        // Visualization
        let visualizer = self.visualizer.clone();
        let boundary = Arc::clone(&self.boundary);
        let [before_png, after_png, highlight_png] =
            blocking(PipelineStage::Visualization, move || {
                let before_image = true_colour(&before)?;
                let after_image = true_colour(&after)?;
                let highlight = visualizer.render(
                    &before_image,
                    &after_image,
                    &probability,
                    &mask,
                    &boundary,
                    &transform,
                )?;
                Ok([
                    encode_png(&before_image)?,
                    encode_png(&after_image)?,
                    encode_png(&highlight)?,
                ])
            })
            .await?;

        self.store
            .write(job_id, Artifact::BeforeImage, &before_png)
            .await?;
        self.store
            .write(job_id, Artifact::AfterImage, &after_png)
            .await?;
        self.store
            .write(job_id, Artifact::HighlightImage, &highlight_png)
            .await?;
        handle.stage_completed(PipelineStage::Visualization).await?;

        // Explanation
        let explanation = self.explainer.explain(&metrics).await;
        self.store
            .write_json(job_id, Artifact::Explanation, &explanation)
            .await?;
        handle.stage_completed(PipelineStage::Explanation).await?;

        tracing::info!(
            job_id = %job_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        Ok(AnalysisResult {
            metrics,
            patches,
            explanation,
            images: JobImages::for_job(job_id),
            dates,
            output_dir: self.store.job_dir(job_id),
        })
    }
}

/// Run CPU-bound stage work on the blocking pool
async fn blocking<T, F>(stage: PipelineStage, work: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        AnalysisError::Internal(format!("{} stage task failed: {}", stage.as_str(), e))
    })?
}
