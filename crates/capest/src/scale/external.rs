//! External visual-reasoning scale estimator.
//!
//! The estimator sees the frame and the pixel-unit measurement and answers
//! with a [`ScaleEstimate`]. Its answer is advisory: the resolver only uses
//! it when `can_estimate` is set and `mm_per_px` is a positive number.

use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ScaleError;
use crate::pipeline::Units;

/// Structured answer of an external estimator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScaleEstimate {
    #[serde(default)]
    pub can_estimate: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub mm_per_px: Option<f64>,
    #[serde(default)]
    pub method: Option<String>,
    /// In `[0, 1]`. Out-of-range values are dropped while parsing.
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub assumptions: Option<Vec<String>>,
}

impl ScaleEstimate {
    /// The scale if the estimate is usable.
    pub fn usable_scale(&self) -> Option<f64> {
        self.mm_per_px
            .filter(|v| self.can_estimate && v.is_finite() && *v > 0.0)
    }
}

/// Accept numbers, numeric strings, and null.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?.filter(|c| (0.0..=1.0).contains(c)))
}

/// Pixel-unit measurement handed to the estimator as context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleQueryMeta {
    pub volume: f64,
    pub height: f64,
    pub units: Units,
    pub notes: String,
    pub rotation_applied_deg: f64,
    pub crop: [u32; 4],
}

/// What the estimator produced, kept for the result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EstimatorReport {
    // Must precede `Estimate`: an error object also fits the all-optional estimate.
    Failed { error: String },
    Estimate(ScaleEstimate),
}

/// A service that guesses a scale from a photograph.
pub trait VisualScaleEstimator: Send + Sync {
    fn estimate(&self, frame: &RgbImage, meta: &ScaleQueryMeta) -> Result<ScaleEstimate, ScaleError>;
}

/// Parse the estimator's JSON text.
///
/// A single-element array is unwrapped; `mm_per_px` may be a string.
pub fn parse_scale_response(text: &str) -> Result<ScaleEstimate, ScaleError> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let mut value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| ScaleError::MalformedResponse(format!("not JSON: {e}")))?;
    if let serde_json::Value::Array(items) = value {
        value = items
            .into_iter()
            .next()
            .ok_or_else(|| ScaleError::MalformedResponse("empty array".to_string()))?;
    }
    if !value.is_object() {
        return Err(ScaleError::MalformedResponse(format!(
            "expected an object, got {value}"
        )));
    }
    serde_json::from_value(value).map_err(|e| ScaleError::MalformedResponse(e.to_string()))
}

pub(crate) fn build_prompt(meta: &ScaleQueryMeta) -> String {
    let meta_json = serde_json::to_string_pretty(meta).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a metrology assistant. Estimate a plausible pixel-to-metric scale for the \
         container/bottle in the provided image.\n\
         Use the following metadata from a solid-of-revolution integration result:\n\
         {meta_json}\n\
         If you can identify any reference of known size in the image (ruler, coin, A4/letter \
         paper, cap standards, labels, ArUco), prefer that and output mm_per_px. If no reliable \
         reference is visible, provide your best estimate with assumptions; else set \
         can_estimate=false. Return only JSON with keys: can_estimate, mm_per_px, method, \
         confidence, rationale, assumptions."
    )
}

#[cfg(feature = "external")]
pub use gemini::GeminiScaleEstimator;

#[cfg(feature = "external")]
mod gemini {
    use std::time::Duration;

    use base64::Engine;
    use image::RgbImage;

    use super::{build_prompt, parse_scale_response, ScaleEstimate, ScaleQueryMeta, VisualScaleEstimator};
    use crate::config::ExternalConfig;
    use crate::error::ScaleError;
    use crate::frame::encode_png;

    /// Gemini `generateContent` client.
    #[derive(Debug, Clone)]
    pub struct GeminiScaleEstimator {
        config: ExternalConfig,
    }

    impl GeminiScaleEstimator {
        pub fn new(config: ExternalConfig) -> Self {
            Self { config }
        }

        fn url(&self) -> String {
            format!(
                "{}/models/{}:generateContent",
                self.config.endpoint.trim_end_matches('/'),
                self.config.model
            )
        }
    }

    /// Concatenated text parts of the first candidate.
    pub(super) fn candidate_text(body: &serde_json::Value) -> Option<String> {
        let parts = body
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        (!text.is_empty()).then_some(text)
    }

    impl VisualScaleEstimator for GeminiScaleEstimator {
        fn estimate(
            &self,
            frame: &RgbImage,
            meta: &ScaleQueryMeta,
        ) -> Result<ScaleEstimate, ScaleError> {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or(ScaleError::MissingCredential)?;

            let png = encode_png(frame)
                .map_err(|e| ScaleError::Transport(format!("frame encoding failed: {e}")))?;
            let body = serde_json::json!({
                "contents": [{
                    "parts": [
                        {
                            "inlineData": {
                                "mimeType": "image/png",
                                "data": base64::engine::general_purpose::STANDARD.encode(png),
                            }
                        },
                        { "text": build_prompt(meta) },
                    ]
                }],
                "generationConfig": { "responseMimeType": "application/json" },
            });

            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .build()
                .map_err(|e| ScaleError::Transport(format!("HTTP client init failed: {e}")))?;
            tracing::info!("querying external scale estimator ({})", self.config.model);
            let response = client
                .post(self.url())
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .map_err(|e| ScaleError::Transport(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().unwrap_or_default();
                return Err(ScaleError::Transport(format!(
                    "HTTP {status}: {}",
                    detail.chars().take(200).collect::<String>()
                )));
            }
            let json = response
                .json::<serde_json::Value>()
                .map_err(|e| ScaleError::MalformedResponse(format!("response body: {e}")))?;
            let text = candidate_text(&json)
                .ok_or_else(|| ScaleError::MalformedResponse("no candidate text".to_string()))?;
            parse_scale_response(&text)
        }
    }
}
