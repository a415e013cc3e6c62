//! Region detection: one page image in, a list of labelled boxes out.
//!
//! The model is instructed to emit a bare JSON array capped at 25 items.
//! Responses are parsed defensively; anything unusable yields an empty list
//! rather than an error.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::gemini::{Content, GeminiClient, GenerationConfig, Part, ThinkingConfig};

const DETECTION_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_DETECTION_PROMPT: &str = "Detect all figures, tables, diagrams, and notable images \
on this PDF page. Return bounding boxes and short descriptive labels for each.";

/// Most items accepted from one detection response.
const MAX_REGIONS_PER_PAGE: usize = 25;

/// One detected region: `box_2d` is `[y0, x0, y1, x1]` in raster pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub box_2d: [f64; 4],
    pub label: String,
}

enum DetectorInner {
    Remote {
        client: GeminiClient,
        system_instruction: String,
    },
    /// Scripted per-page region lists, consumed in call order (tests).
    Mock(Mutex<VecDeque<Vec<DetectedRegion>>>),
    Unconfigured,
}

/// Vision-detection client for figures/tables/diagrams on page rasters.
pub struct RegionDetector {
    inner: DetectorInner,
}

impl RegionDetector {
    pub fn new(
        api_key: Option<&str>,
        bounding_box_instructions: &str,
        spatial_instructions: Option<&str>,
    ) -> Self {
        let inner = match api_key {
            Some(key) => {
                let mut system_instruction = bounding_box_instructions.to_string();
                if let Some(spatial) = spatial_instructions {
                    system_instruction.push('\n');
                    system_instruction.push_str(spatial);
                }
                DetectorInner::Remote {
                    client: GeminiClient::new(key),
                    system_instruction,
                }
            }
            None => DetectorInner::Unconfigured,
        };
        Self { inner }
    }

    /// A detector replaying the given per-page results (tests). Pages beyond
    /// the script detect nothing.
    pub fn mock(pages: Vec<Vec<DetectedRegion>>) -> Self {
        Self {
            inner: DetectorInner::Mock(Mutex::new(pages.into())),
        }
    }

    /// Detect regions on one page image. A response the model mangles (bad
    /// JSON, not an array) produces an empty list; only transport failures
    /// surface as errors.
    pub async fn detect_regions(&self, image: &[u8]) -> Result<Vec<DetectedRegion>> {
        match &self.inner {
            DetectorInner::Remote {
                client,
                system_instruction,
            } => {
                let contents = [Content {
                    role: "user".to_string(),
                    parts: vec![Part::text(DEFAULT_DETECTION_PROMPT), Part::png(image)],
                }];
                let config = GenerationConfig {
                    temperature: Some(0.5),
                    thinking_config: Some(ThinkingConfig { thinking_budget: 0 }),
                };
                let response = client
                    .generate(
                        DETECTION_MODEL,
                        &contents,
                        Some(system_instruction.as_str()),
                        None,
                        Some(&config),
                    )
                    .await?;
                Ok(parse_detection_response(&response.text()))
            }
            DetectorInner::Mock(queue) => {
                let mut queue = queue.lock().expect("detector mock lock poisoned");
                Ok(queue.pop_front().unwrap_or_default())
            }
            DetectorInner::Unconfigured => {
                bail!("GEMINI_API_KEY is not set; cannot call the region detector")
            }
        }
    }
}

/// Parse the model's JSON array of `{box_2d, label}` items. Fences are
/// stripped; non-arrays and malformed items are skipped; at most
/// [`MAX_REGIONS_PER_PAGE`] items are returned.
fn parse_detection_response(text: &str) -> Vec<DetectedRegion> {
    let raw = text.replace("```json", "").replace("```", "");
    let raw = raw.trim();
    if raw.is_empty() {
        tracing::warn!("Detection returned empty text");
        return Vec::new();
    }

    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Detection response is not valid JSON");
            return Vec::new();
        }
    };
    let Value::Array(items) = parsed else {
        tracing::warn!("Detection response is not a JSON array");
        return Vec::new();
    };

    let mut regions = Vec::new();
    for item in items {
        let Value::Object(map) = item else { continue };
        let Some(label) = map.get("label").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(coords) = map.get("box_2d").and_then(|v| v.as_array()) else {
            continue;
        };
        if coords.len() != 4 {
            continue;
        }
        let mut box_2d = [0.0f64; 4];
        let mut valid = true;
        for (slot, coord) in box_2d.iter_mut().zip(coords) {
            match coord.as_f64() {
                Some(value) => *slot = value,
                None => {
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            continue;
        }
        regions.push(DetectedRegion {
            box_2d,
            label: label.to_string(),
        });
        if regions.len() >= MAX_REGIONS_PER_PAGE {
            break;
        }
    }
    tracing::debug!(regions = regions.len(), "Detection parsed");
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        let regions = parse_detection_response(
            r#"[{"box_2d": [10, 20, 110, 220], "label": "bar chart"}]"#,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].label, "bar chart");
        assert_eq!(regions[0].box_2d, [10.0, 20.0, 110.0, 220.0]);
    }

    #[test]
    fn strips_markdown_fences() {
        let regions = parse_detection_response(
            "```json\n[{\"box_2d\": [0, 0, 5, 5], \"label\": \"table\"}]\n```",
        );
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn rejects_non_array() {
        assert!(parse_detection_response(r#"{"label": "x"}"#).is_empty());
        assert!(parse_detection_response("not json at all").is_empty());
        assert!(parse_detection_response("").is_empty());
    }

    #[test]
    fn skips_items_missing_fields() {
        let regions = parse_detection_response(
            r#"[
                {"label": "no box"},
                {"box_2d": [1, 2, 3]},
                {"box_2d": [1, "a", 3, 4], "label": "bad coord"},
                {"box_2d": [1, 2, 3, 4], "label": "good"}
            ]"#,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].label, "good");
    }

    #[test]
    fn caps_at_twenty_five() {
        let items: Vec<String> = (0..40)
            .map(|i| format!(r#"{{"box_2d": [0, 0, 1, 1], "label": "r{i}"}}"#))
            .collect();
        let regions = parse_detection_response(&format!("[{}]", items.join(",")));
        assert_eq!(regions.len(), 25);
    }

    #[tokio::test]
    async fn mock_replays_pages_then_detects_nothing() {
        let detector = RegionDetector::mock(vec![vec![DetectedRegion {
            box_2d: [0.0, 0.0, 5.0, 5.0],
            label: "figure".into(),
        }]]);
        assert_eq!(detector.detect_regions(&[0u8]).await.unwrap().len(), 1);
        assert!(detector.detect_regions(&[0u8]).await.unwrap().is_empty());
    }
}
