//! AI gateway interaction: build vision messages and call the model.
//!
//! This module turns a page-image URL into one chat-completion request
//! against an OpenAI-compatible gateway and parses the structured result. It
//! is intentionally thin — all prompt engineering lives in
//! [`crate::prompts`] so it can change without touching request or
//! error-classification logic here.
//!
//! ## Salvage Strategy
//!
//! Vision models are asked for bare JSON but frequently wrap it in prose or
//! markdown fences anyway. The parser looks for a fenced ```json block
//! first, then the substring between the first `{` and the last `}`, then
//! the raw content. A parse failure is *never* an error: the OCR variant
//! degrades to the raw text as `extracted_text`, the detection variant to
//! `pageType: unknown, confidence: 0`, and the pipeline keeps moving.

use crate::config::IndexerConfig;
use crate::error::GatewayError;
use crate::prompts;
use crate::records::{DetectionResult, PageExtraction, PageType};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ── Analyzer seam ────────────────────────────────────────────────────────

/// One call per page image. Implemented by [`GatewayClient`] for production;
/// tests substitute counting or scripted implementations.
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    /// OCR variant: extract text and metadata from a page image.
    async fn analyze_page(&self, image_url: &str) -> Result<PageExtraction, GatewayError>;

    /// Detection variant: classify a page image. `page_index` is only echoed
    /// back in the result.
    async fn classify_page(
        &self,
        image_url: &str,
        page_index: usize,
    ) -> Result<DetectionResult, GatewayError>;
}

// ── Wire structures ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Content<'a> {
    Text(&'a str),
    Parts(Vec<Part<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

// ── Client ───────────────────────────────────────────────────────────────

/// A client for the vision gateway. Stateless beyond the pooled HTTP
/// connection; clone freely.
#[derive(Clone, Debug)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: IndexerConfig,
}

impl GatewayClient {
    /// Create a client from a validated configuration.
    pub fn new(config: IndexerConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.api_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Issue one chat-completion call and return the raw assistant content.
    ///
    /// The image travels as a URL part — the gateway fetches it remotely, so
    /// the URL must be reachable from there (no local file upload).
    async fn chat(
        &self,
        system_prompt: &str,
        user_text: &str,
        image_url: &str,
        max_tokens: Option<u32>,
    ) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: Content::Text(system_prompt),
                },
                Message {
                    role: "user",
                    content: Content::Parts(vec![
                        Part::Text { text: user_text },
                        Part::ImageUrl {
                            image_url: ImageUrl { url: image_url },
                        },
                    ]),
                },
            ],
            max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.gateway_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("gateway answered {status}: {detail}");
            return Err(GatewayError::from_status(status.as_u16(), detail));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        debug!("gateway returned {} chars", content.len());
        Ok(content)
    }
}

#[async_trait]
impl PageAnalyzer for GatewayClient {
    async fn analyze_page(&self, image_url: &str) -> Result<PageExtraction, GatewayError> {
        let content = self
            .chat(
                prompts::OCR_SYSTEM_PROMPT,
                prompts::OCR_USER_PROMPT,
                image_url,
                Some(self.config.max_tokens),
            )
            .await?;
        Ok(parse_extraction(&content))
    }

    async fn classify_page(
        &self,
        image_url: &str,
        page_index: usize,
    ) -> Result<DetectionResult, GatewayError> {
        let content = self
            .chat(
                prompts::DETECT_SYSTEM_PROMPT,
                prompts::DETECT_USER_PROMPT,
                image_url,
                None,
            )
            .await?;
        Ok(parse_detection(&content, page_index))
    }
}

// ── Lenient parsing ──────────────────────────────────────────────────────

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("static fence pattern"));

/// Locate and parse the first plausible JSON object in free-form model
/// output: fenced block, then brace substring, then the whole string.
fn salvage_json(content: &str) -> Option<serde_json::Value> {
    let fenced = FENCED_JSON
        .captures(content)
        .map(|c| c[1].trim().to_string());
    let candidates = [
        fenced,
        brace_substring(content).map(str::to_string),
        Some(content.trim().to_string()),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|c| serde_json::from_str::<serde_json::Value>(&c).ok())
        .filter(serde_json::Value::is_object)
}

fn brace_substring(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Parse OCR output, degrading to the raw content on failure.
fn parse_extraction(content: &str) -> PageExtraction {
    match salvage_json(content)
        .and_then(|v| serde_json::from_value::<PageExtraction>(v).ok())
    {
        Some(extraction) => extraction,
        None => {
            warn!("unparseable OCR response, keeping raw text ({} chars)", content.len());
            PageExtraction {
                extracted_text: content.to_string(),
                ..Default::default()
            }
        }
    }
}

/// Parse detection output field by field so one bad field (an unexpected
/// `pageType` string, a confidence out of range) does not discard the rest.
fn parse_detection(content: &str, page_index: usize) -> DetectionResult {
    let Some(v) = salvage_json(content) else {
        warn!("unparseable detection response for page index {page_index}");
        return DetectionResult::unknown(page_index);
    };
    let detected_page_number = v
        .get("detectedPageNumber")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);
    let page_type = v
        .get("pageType")
        .cloned()
        .and_then(|x| serde_json::from_value::<PageType>(x).ok())
        .unwrap_or_default();
    let confidence = v
        .get("confidence")
        .and_then(|x| x.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    DetectionResult {
        page_index,
        detected_page_number,
        page_type,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salvages_json_from_markdown_fence() {
        let content = "Sure! Here's the result:\n```json\n{\"extracted_text\":\"hi\",\"topics\":[],\"keywords\":[],\"chapter_title\":null,\"summary\":\"s\"}\n```";
        let extraction = parse_extraction(content);
        assert_eq!(extraction.extracted_text, "hi");
        assert!(extraction.topics.is_empty());
        assert!(extraction.keywords.is_empty());
        assert_eq!(extraction.chapter_title, None);
        assert_eq!(extraction.summary, "s");
    }

    #[test]
    fn salvages_json_from_brace_substring() {
        let content = "The page contains: {\"extracted_text\": \"abc\", \"summary\": \"short\"} hope that helps";
        let extraction = parse_extraction(content);
        assert_eq!(extraction.extracted_text, "abc");
        assert_eq!(extraction.summary, "short");
    }

    #[test]
    fn unparseable_ocr_degrades_to_raw_text() {
        let extraction = parse_extraction("not json at all");
        assert_eq!(extraction.extracted_text, "not json at all");
        assert!(extraction.topics.is_empty());
        assert!(extraction.keywords.is_empty());
        assert_eq!(extraction.chapter_title, None);
        assert_eq!(extraction.summary, "");
    }

    #[test]
    fn fence_without_language_tag_still_parses() {
        let content = "```\n{\"summary\":\"plain fence\"}\n```";
        assert_eq!(parse_extraction(content).summary, "plain fence");
    }

    #[test]
    fn non_object_json_is_rejected() {
        // A bare number parses as JSON but is not an extraction.
        let extraction = parse_extraction("42");
        assert_eq!(extraction.extracted_text, "42");
    }

    #[test]
    fn detection_parses_full_result() {
        let content = "{\"detectedPageNumber\":\"12\",\"pageType\":\"numbered\",\"confidence\":0.95}";
        let r = parse_detection(content, 7);
        assert_eq!(r.page_index, 7);
        assert_eq!(r.detected_page_number.as_deref(), Some("12"));
        assert_eq!(r.page_type, PageType::Numbered);
        assert!((r.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn unparseable_detection_degrades_to_unknown() {
        let r = parse_detection("definitely prose", 3);
        assert_eq!(r, DetectionResult::unknown(3));
    }

    #[test]
    fn detection_tolerates_partial_fields() {
        let r = parse_detection("{\"pageType\":\"cover\"}", 0);
        assert_eq!(r.page_type, PageType::Cover);
        assert_eq!(r.detected_page_number, None);
        assert_eq!(r.confidence, 0.0);

        // Unknown enum string falls back without discarding confidence.
        let r = parse_detection("{\"pageType\":\"poster\",\"confidence\":2.5}", 0);
        assert_eq!(r.page_type, PageType::Unknown);
        assert_eq!(r.confidence, 1.0);
    }
}
