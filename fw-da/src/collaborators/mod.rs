//! External capabilities consumed by the pipeline
//!
//! Each capability is a trait object so tests can inject deterministic
//! implementations.

pub mod imagery;
pub mod inference;
pub mod narrative;

pub use imagery::{AvailableDate, ImagerySource, SyntheticImagery};
pub use inference::{InferenceEngine, VegetationIndexModel};
pub use narrative::{GeminiNarrator, Narrative, NarrativeGenerator, TemplateNarrator};
