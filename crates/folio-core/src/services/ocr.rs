//! Batched OCR through the Vision `images:annotate` endpoint.
//!
//! Callers own the batching; the recommended batch size is 12 and the
//! service ceiling is 16. Per-item failures are reported in the result and
//! never fail the whole batch.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

const VISION_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Hard ceiling on images per annotate call.
pub const OCR_BATCH_SIZE_MAX: usize = 16;

/// OCR output for one input image, at its original position.
#[derive(Debug, Clone)]
pub struct OcrItem {
    pub index: usize,
    pub text: String,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<ImageRequest<'a>>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: ImageContent,
    features: &'a [Feature],
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<ResponseError>,
}

#[derive(Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ResponseError {
    #[serde(default)]
    message: String,
}

enum OcrInner {
    Remote { http: reqwest::Client, api_key: String },
    /// Scripted per-image texts, consumed in call order (tests).
    Mock(Mutex<VecDeque<String>>),
    Unconfigured,
}

/// Vision OCR client.
pub struct OcrClient {
    inner: OcrInner,
}

impl OcrClient {
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        let inner = match api_key {
            Some(key) => OcrInner::Remote {
                http: reqwest::Client::new(),
                api_key: key.to_string(),
            },
            None => OcrInner::Unconfigured,
        };
        Self { inner }
    }

    /// A client that returns the given texts one per image, in call order.
    /// Once the script is exhausted, further images yield empty text.
    pub fn mock(texts: Vec<String>) -> Self {
        Self {
            inner: OcrInner::Mock(Mutex::new(texts.into())),
        }
    }

    /// Run document text detection over a batch of page images.
    /// Results preserve input order; per-item errors fill the `error` field.
    pub async fn batch_ocr(&self, images: &[Vec<u8>]) -> Result<Vec<OcrItem>> {
        if images.is_empty() {
            tracing::warn!("batch_ocr called with empty image list");
            return Ok(Vec::new());
        }
        if images.len() > OCR_BATCH_SIZE_MAX {
            bail!(
                "OCR batch of {} exceeds the service ceiling of {}",
                images.len(),
                OCR_BATCH_SIZE_MAX
            );
        }

        match &self.inner {
            OcrInner::Remote { http, api_key } => {
                let features = [Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }];
                let request = AnnotateRequest {
                    requests: images
                        .iter()
                        .map(|bytes| ImageRequest {
                            image: ImageContent {
                                content: BASE64.encode(bytes),
                            },
                            features: &features,
                        })
                        .collect(),
                };

                let response = http
                    .post(VISION_ANNOTATE_URL)
                    .header("x-goog-api-key", api_key)
                    .json(&request)
                    .send()
                    .await
                    .context("Vision annotate request failed")?;
                if !response.status().is_success() {
                    bail!("Vision API error: {}", response.status());
                }
                let body: AnnotateResponse = response
                    .json()
                    .await
                    .context("Failed to decode Vision response")?;

                let mut items = Vec::with_capacity(images.len());
                for (index, item) in body.responses.into_iter().enumerate() {
                    if let Some(error) = item.error.filter(|e| !e.message.is_empty()) {
                        tracing::warn!(index, error = %error.message, "OCR error for image");
                        items.push(OcrItem {
                            index,
                            text: String::new(),
                            error: Some(error.message),
                        });
                        continue;
                    }
                    items.push(OcrItem {
                        index,
                        text: item.full_text_annotation.map(|a| a.text).unwrap_or_default(),
                        error: None,
                    });
                }
                tracing::debug!(batch = images.len(), "OCR batch done");
                Ok(items)
            }
            OcrInner::Mock(queue) => {
                let mut queue = queue.lock().expect("ocr mock lock poisoned");
                Ok(images
                    .iter()
                    .enumerate()
                    .map(|(index, _)| OcrItem {
                        index,
                        text: queue.pop_front().unwrap_or_default(),
                        error: None,
                    })
                    .collect())
            }
            OcrInner::Unconfigured => {
                bail!("GOOGLE_API_KEY is not set; cannot call the Vision OCR service")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_preserves_input_order() {
        let client = OcrClient::mock(vec!["first".into(), "second".into()]);
        let items = client.batch_ocr(&[vec![1], vec![2], vec![3]]).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].text, "first");
        assert_eq!(items[1].text, "second");
        assert_eq!(items[2].text, "");
        assert_eq!(items[2].index, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let client = OcrClient::mock(vec![]);
        assert!(client.batch_ocr(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let client = OcrClient::mock(vec![]);
        let images = vec![vec![0u8]; OCR_BATCH_SIZE_MAX + 1];
        assert!(client.batch_ocr(&images).await.is_err());
    }

    #[tokio::test]
    async fn unconfigured_client_errors() {
        let client = OcrClient::from_api_key(None);
        assert!(client.batch_ocr(&[vec![0u8]]).await.is_err());
    }
}
