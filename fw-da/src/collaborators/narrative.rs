//! Narrative generation capability
//!
//! [`GeminiNarrator`] asks the Gemini `generateContent` endpoint for a
//! forest-expert reading of the metrics. [`TemplateNarrator`] produces a
//! deterministic summary offline and is used when no API key is configured.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::AnalysisError;
use crate::models::{Metrics, DEFAULT_CONFIDENCE};

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Text and 0-100 confidence returned by a generator
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub text: String,
    pub confidence: u8,
}

/// Turns metrics into explanatory text
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Model identifier reported with the explanation
    fn model(&self) -> &str;

    async fn explain(&self, metrics: &Metrics) -> Result<Narrative, AnalysisError>;
}

/// Prompt sent to the language model
pub fn build_prompt(metrics: &Metrics) -> String {
    format!(
        "You are a forest monitoring expert analyzing deforestation detection results from satellite imagery analysis.

**Detection Metrics:**
- Total deforested area: {:.2} m² ({:.2} hectares)
- Forest loss percentage: {:.2}%
- Number of deforestation patches: {}
- Largest contiguous patch: {:.2} m² ({:.2} hectares)
- Intact forest remaining: {:.2} hectares
- Total forest area: {:.2} hectares

**Analysis Required:**
1. **Magnitude Assessment**: How much deforestation occurred? Is this significant?
2. **Spatial Distribution**: Based on the number and size of patches, are changes concentrated or dispersed?
3. **Pattern Analysis**: What do the patch characteristics suggest about the type of deforestation? Large contiguous patches may indicate planned clearing, many small patches gradual encroachment, linear patterns roads or logging.
4. **Human Activity Assessment**: Is this deforestation likely human-driven or natural? Explain your reasoning.
5. **Confidence Score**: Give a confidence score (0-100) based on the clarity of the patterns, the amount of loss detected and the consistency of the metrics.

**Guidelines:**
- Base your analysis ONLY on the provided metrics
- Do not speculate about causes not supported by the data
- Do not mention specific locations beyond what is in the data
- Keep the response concise (300-400 words) in a professional tone suitable for forest management stakeholders.",
        metrics.deforested_area_m2,
        metrics.deforested_area_hectares,
        metrics.forest_loss_percentage,
        metrics.number_of_patches,
        metrics.largest_patch_m2,
        metrics.largest_patch_hectares,
        metrics.intact_forest_hectares,
        metrics.total_area_hectares,
    )
}

fn confidence_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)confidence[:\s]+(\d+)",
            r"(\d+)/100",
            r"(\d+)%",
            r"(?i)score[:\s]+(\d+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Confidence score stated in model output
///
/// Patterns are tried in order (`confidence: N`, `N/100`, `N%`, `score: N`);
/// the first match of a pattern counts if it lies in 0..=100. Falls back to
/// [`DEFAULT_CONFIDENCE`].
pub fn extract_confidence(text: &str) -> u8 {
    confidence_patterns()
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find(|score| *score <= 100)
        .map(|score| score as u8)
        .unwrap_or(DEFAULT_CONFIDENCE)
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini REST client
pub struct GeminiNarrator {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiNarrator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, AnalysisError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AnalysisError::InvalidInput(
                "Gemini API key is empty".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AnalysisError::Explanation(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model: model.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl NarrativeGenerator for GeminiNarrator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn explain(&self, metrics: &Metrics) -> Result<Narrative, AnalysisError> {
        let prompt = build_prompt(metrics);
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: &prompt }],
            }],
        };

        tracing::debug!(model = %self.model, "Requesting narrative from Gemini");

        let response = self
            .http_client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Explanation(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Explanation(format!(
                "Gemini API error {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Explanation(format!("parse error: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AnalysisError::Explanation(
                "Gemini returned no text".to_string(),
            ));
        }

        let confidence = extract_confidence(&text);
        tracing::info!(model = %self.model, confidence, "Narrative generated");

        Ok(Narrative { text, confidence })
    }
}

/// Offline summary built from the metrics alone
#[derive(Debug, Clone, Default)]
pub struct TemplateNarrator;

impl TemplateNarrator {
    fn magnitude(loss_percentage: f64) -> &'static str {
        if loss_percentage < 1.0 {
            "minimal"
        } else if loss_percentage < 5.0 {
            "moderate"
        } else if loss_percentage < 15.0 {
            "significant"
        } else {
            "severe"
        }
    }
}

#[async_trait]
impl NarrativeGenerator for TemplateNarrator {
    fn model(&self) -> &str {
        "template"
    }

    async fn explain(&self, metrics: &Metrics) -> Result<Narrative, AnalysisError> {
        if metrics.number_of_patches == 0 {
            return Ok(Narrative {
                text: format!(
                    "No forest loss was detected across {:.2} hectares of monitored forest. \
                     The area appears intact between the two observation dates.",
                    metrics.total_area_hectares
                ),
                confidence: 85,
            });
        }

        let largest_share = if metrics.deforested_area_m2 > 0.0 {
            metrics.largest_patch_m2 / metrics.deforested_area_m2
        } else {
            0.0
        };

        let pattern = if largest_share >= 0.6 {
            "Most of the loss sits in one contiguous clearing, which is typical of planned clearing."
        } else if metrics.number_of_patches > 10 {
            "Loss is spread over many small patches, which suggests gradual encroachment."
        } else {
            "Loss is split across a few separate clearings."
        };

        let text = format!(
            "Forest loss is {} at {:.2}% of the monitored area: {:.2} hectares cleared in {} patch(es), \
             the largest covering {:.2} hectares. {} {:.2} hectares of forest remain intact.",
            Self::magnitude(metrics.forest_loss_percentage),
            metrics.forest_loss_percentage,
            metrics.deforested_area_hectares,
            metrics.number_of_patches,
            metrics.largest_patch_hectares,
            pattern,
            metrics.intact_forest_hectares,
        );

        let confidence = (60.0 + largest_share * 30.0).round().min(95.0) as u8;
        Ok(Narrative { text, confidence })
    }
}
