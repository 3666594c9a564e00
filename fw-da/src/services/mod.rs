//! Analysis services

pub mod boundary_clipper;
pub mod change_detector;
pub mod explainer;
pub mod job_manager;
pub mod metrics_engine;
pub mod output_store;
pub mod pipeline;
pub mod visualizer;

pub use boundary_clipper::clip;
pub use change_detector::{align, ChangeDetector};
pub use explainer::ExplanationRequester;
pub use job_manager::{JobHandle, JobManager};
pub use metrics_engine::{analyze, MetricsParams, PatchAnalysis};
pub use output_store::{Artifact, OutputStore};
pub use pipeline::AnalysisPipeline;
pub use visualizer::Visualizer;
