//! Narrative explanation attached to a completed analysis

use serde::{Deserialize, Serialize};

/// Default confidence when the narrative gives no usable score
pub const DEFAULT_CONFIDENCE: u8 = 75;

/// Outcome of the narrative request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationStatus {
    Success,
    Error,
}

/// Explanatory text and a 0-100 confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub text: String,
    pub confidence: u8,
    /// Generator that produced the text
    pub model: String,
    pub status: ExplanationStatus,
    /// Failure detail when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Explanation {
    pub fn success(text: impl Into<String>, confidence: u8, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.min(100),
            model: model.into(),
            status: ExplanationStatus::Success,
            error: None,
        }
    }

    /// Degraded placeholder used when the generator fails
    pub fn unavailable(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            text: "Explanation unavailable.".to_string(),
            confidence: 0,
            model: model.into(),
            status: ExplanationStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExplanationStatus::Success
    }
}
