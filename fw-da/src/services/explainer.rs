//! Explanation requester
//!
//! Wraps a [`NarrativeGenerator`] so that failure never propagates: errors,
//! panics and timeouts become a degraded [`Explanation`] with status `error`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::collaborators::NarrativeGenerator;
use crate::error::AnalysisError;
use crate::models::{Explanation, Metrics};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct ExplanationRequester {
    generator: Arc<dyn NarrativeGenerator>,
    timeout: Duration,
}

impl ExplanationRequester {
    pub fn new(generator: Arc<dyn NarrativeGenerator>) -> Self {
        Self {
            generator,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Explanation for `metrics`; never fails
    pub async fn explain(&self, metrics: &Metrics) -> Explanation {
        let model = self.generator.model().to_string();

        let call = AssertUnwindSafe(self.generator.explain(metrics)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(AnalysisError::Explanation(format!(
                "narrative generator panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Err(_) => Err(AnalysisError::Explanation(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(narrative) => Explanation::success(narrative.text, narrative.confidence, model),
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "Narrative generation failed; continuing without it");
                Explanation::unavailable(model, e.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Narrative, TemplateNarrator};
    use crate::models::ExplanationStatus;
    use async_trait::async_trait;

    struct Broken;

    #[async_trait]
    impl NarrativeGenerator for Broken {
        fn model(&self) -> &str {
            "broken"
        }

        async fn explain(&self, _: &Metrics) -> Result<Narrative, AnalysisError> {
            Err(AnalysisError::Explanation("quota exceeded".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl NarrativeGenerator for Slow {
        fn model(&self) -> &str {
            "slow"
        }

        async fn explain(&self, _: &Metrics) -> Result<Narrative, AnalysisError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Narrative {
                text: "late".to_string(),
                confidence: 50,
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl NarrativeGenerator for Panicking {
        fn model(&self) -> &str {
            "panicking"
        }

        async fn explain(&self, _: &Metrics) -> Result<Narrative, AnalysisError> {
            panic!("response shape changed")
        }
    }

    fn metrics() -> Metrics {
        Metrics {
            total_area_m2: 10_000.0,
            total_area_hectares: 1.0,
            deforested_area_m2: 0.0,
            deforested_area_hectares: 0.0,
            forest_loss_percentage: 0.0,
            number_of_patches: 0,
            largest_patch_m2: 0.0,
            largest_patch_hectares: 0.0,
            intact_forest_m2: 10_000.0,
            intact_forest_hectares: 1.0,
            pixel_size_meters: 10.0,
            total_pixels: 100,
            deforested_pixels: 0,
            boundary_polygon_area_m2: None,
        }
    }

    #[tokio::test]
    async fn test_failure_degrades() {
        let requester = ExplanationRequester::new(Arc::new(Broken));
        let e = requester.explain(&metrics()).await;
        assert_eq!(e.status, ExplanationStatus::Error);
        assert_eq!(e.model, "broken");
        assert!(e.error.unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_panic_degrades() {
        let requester = ExplanationRequester::new(Arc::new(Panicking));
        let e = requester.explain(&metrics()).await;
        assert_eq!(e.status, ExplanationStatus::Error);
        assert_eq!(e.model, "panicking");
        assert!(e.error.unwrap().contains("response shape changed"));
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let requester =
            ExplanationRequester::new(Arc::new(Slow)).with_timeout(Duration::from_millis(20));
        let e = requester.explain(&metrics()).await;
        assert_eq!(e.status, ExplanationStatus::Error);
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let requester = ExplanationRequester::new(Arc::new(TemplateNarrator));
        let e = requester.explain(&metrics()).await;
        assert!(e.is_success());
        assert_eq!(e.model, "template");
        assert_eq!(e.confidence, 85);
    }
}
