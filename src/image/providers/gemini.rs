//! Gemini (Google) card generator.

use crate::error::{sanitize_error_message, CardGenError, Result, ValidationError};
use crate::image::generator::CardGenerator;
use crate::image::types::{GeneratedCard, GenerationMetadata, GenerationRequest, ImageFormat};
use crate::prompt::card_prompt;
use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.5 Flash Image, preview endpoint.
    #[default]
    FlashImagePreview,
    /// Gemini 2.5 Flash Image, stable endpoint.
    FlashImage,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashImagePreview => "gemini-2.5-flash-image-preview",
            Self::FlashImage => "gemini-2.5-flash-image",
        }
    }
}

/// Builder for [`GeminiCardGenerator`].
#[derive(Debug, Clone, Default)]
pub struct GeminiCardGeneratorBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
}

impl GeminiCardGeneratorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API root (proxies, tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the generator, resolving the API key.
    pub fn build(self) -> Result<GeminiCardGenerator> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CardGenError::Config(
                    "API_KEY environment variable is not set and no API key provided".into(),
                )
            })?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(GeminiCardGenerator {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
            base_url,
        })
    }
}

/// Gemini card generator.
pub struct GeminiCardGenerator {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    base_url: String,
}

impl GeminiCardGenerator {
    /// Creates a new `GeminiCardGeneratorBuilder`.
    pub fn builder() -> GeminiCardGeneratorBuilder {
        GeminiCardGeneratorBuilder::new()
    }

    /// Returns the configured model.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    /// Generates a card and returns it as a `data:<mime>;base64,<payload>` URL.
    pub async fn generate_card(
        &self,
        image: &[u8],
        mime_type: &str,
        subject_name: &str,
    ) -> Result<String> {
        let format = ImageFormat::from_mime_type(mime_type)
            .ok_or_else(|| ValidationError::UnsupportedFormat(mime_type.to_string()))?;
        let request = GenerationRequest::new(subject_name, image.to_vec(), format)?;
        let card = self.generate(&request).await?;
        Ok(card.to_data_url())
    }

    fn model_url(&self) -> String {
        format!("{}/v1beta/models/{}", self.base_url, self.model.as_str())
    }

    async fn generate_impl(&self, request: &GenerationRequest) -> Result<GeneratedCard> {
        let start = Instant::now();
        let url = format!("{}:generateContent", self.model_url());
        let body = GeminiRequest::from_generation_request(request);

        tracing::debug!(
            model = self.model.as_str(),
            image_bytes = request.image().len(),
            mime_type = request.format().mime_type(),
            "sending card generation request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CardGenError::Upstream {
                status: Some(status.as_u16()),
                message: upstream_message(status, &text),
            });
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&text)?;
        let (inline_data, texts) = extract_image(gemini_response)?;

        let data = decode_image_data(&inline_data.data)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            duration_ms,
            bytes = data.len(),
            mime_type = %inline_data.mime_type,
            text_parts = texts.len(),
            "received generated card"
        );

        Ok(GeneratedCard::new(
            data,
            inline_data.mime_type,
            request.subject_name(),
            GenerationMetadata {
                model: Some(self.model.as_str().to_string()),
                duration_ms: Some(duration_ms),
                text: texts,
            },
        ))
    }
}

/// Picks the first part carrying inline image data from the first candidate.
///
/// Text parts seen before the image are returned alongside it. A prompt
/// block, an empty candidate list and an image-less candidate all mean the
/// same thing to callers: no image came back.
fn extract_image(response: GeminiResponse) -> Result<(InlineData, Vec<String>)> {
    let block_reason = response
        .prompt_feedback
        .and_then(|f| f.block_reason_message.or(f.block_reason));
    if let Some(reason) = block_reason {
        return Err(CardGenError::NoImageReturned {
            reason: Some(reason),
        });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(CardGenError::NoImageReturned { reason: None })?;

    let mut texts = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(inline_data) = part.inline_data {
            return Ok((inline_data, texts));
        }
        if let Some(text) = part.text {
            texts.push(text);
        }
    }

    for text in &texts {
        tracing::debug!(%text, "model replied with text only");
    }

    Err(CardGenError::NoImageReturned {
        reason: candidate.finish_reason.filter(|r| r != "STOP"),
    })
}

/// Decodes the image payload, tolerating missing padding and stray trailing
/// bits. Anything else is an upstream failure.
fn decode_image_data(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_BASE64
        .decode(&cleaned)
        .map_err(|e| CardGenError::Upstream {
            status: None,
            message: format!("API returned invalid image data: {e}"),
        })
}

/// Prefers the API's own `error.message`, else the sanitized body.
fn upstream_message(status: reqwest::StatusCode, text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<GeminiErrorBody>(text) {
        let message = sanitize_error_message(&body.error.message);
        if !message.is_empty() {
            return message;
        }
    }

    let sanitized = sanitize_error_message(text);
    if sanitized.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {sanitized}")
    }
}

#[async_trait]
impl CardGenerator for GeminiCardGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCard> {
        self.generate_impl(request).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.model_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(CardGenError::Upstream {
            status: Some(status.as_u16()),
            message: upstream_message(status, &text),
        })
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn from_generation_request(req: &GenerationRequest) -> Self {
        let parts = vec![
            GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: req.format().mime_type().to_string(),
                    data: req.image_base64(),
                },
            },
            GeminiRequestPart::Text {
                text: card_prompt(req.subject_name()),
            },
        ];

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash-image-preview:generateContent";

    fn generator(server: &MockServer) -> GeminiCardGenerator {
        GeminiCardGenerator::builder()
            .api_key("test-key")
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    fn image_response(mime: &str, data: &str) -> Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [{ "inlineData": { "mimeType": mime, "data": data } }]
                },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(
            GeminiModel::FlashImagePreview.as_str(),
            "gemini-2.5-flash-image-preview"
        );
        assert_eq!(GeminiModel::FlashImage.as_str(), "gemini-2.5-flash-image");
        assert_eq!(GeminiModel::default(), GeminiModel::FlashImagePreview);
    }

    #[test]
    fn test_builder_trims_base_url() {
        let generator = GeminiCardGenerator::builder()
            .api_key("test-key")
            .model(GeminiModel::FlashImage)
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(
            generator.model_url(),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash-image"
        );
    }

    #[test]
    fn test_builder_rejects_blank_key() {
        let err = GeminiCardGenerator::builder()
            .api_key("   ")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, CardGenError::Config(_)));
    }

    #[test]
    fn test_request_construction() {
        let req = GenerationRequest::new("Ada", vec![1, 2, 3], ImageFormat::Jpeg).unwrap();
        let json = serde_json::to_value(GeminiRequest::from_generation_request(&req)).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inline_data"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        assert!(parts[1]["text"]
            .as_str()
            .unwrap()
            .contains("Happy Birthday Ada"));
        assert_eq!(
            json["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn test_extract_skips_text_parts() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your card!" },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "BBBB" } }
                    ]
                }
            }]
        }))
        .unwrap();

        let (inline, texts) = extract_image(resp).unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "AAAA");
        assert_eq!(texts, vec!["Here is your card!".to_string()]);
    }

    #[test]
    fn test_extract_safety_finish_reason() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "IMAGE_SAFETY" }]
        }))
        .unwrap();

        match extract_image(resp) {
            Err(CardGenError::NoImageReturned { reason }) => {
                assert_eq!(reason.as_deref(), Some("IMAGE_SAFETY"));
            }
            other => panic!("expected NoImageReturned, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_empty_candidates() {
        let resp: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            extract_image(resp),
            Err(CardGenError::NoImageReturned { reason: None })
        ));
    }

    #[test]
    fn test_upstream_message_fallbacks() {
        let status = reqwest::StatusCode::BAD_GATEWAY;
        assert_eq!(upstream_message(status, ""), "HTTP 502 Bad Gateway");
        assert_eq!(
            upstream_message(status, "upstream\n   down"),
            "HTTP 502 Bad Gateway: upstream down"
        );

        let long = "x".repeat(1000);
        assert!(upstream_message(status, &long).ends_with("..."));
    }

    #[test]
    fn test_upstream_message_redacts_key() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        let body = r#"{"error":{"message":"bad request for ?key=AIzaSySecret123"}}"#;
        let msg = upstream_message(status, body);
        assert!(!msg.contains("AIzaSySecret123"));
        assert!(msg.contains("key=[REDACTED]"));
    }

    #[test]
    fn test_decode_image_data_is_lenient() {
        // Non-canonical trailing bits and missing padding both decode
        assert_eq!(decode_image_data("AAB=").unwrap(), vec![0, 0]);
        assert_eq!(decode_image_data("AQI").unwrap(), vec![1, 2]);
        assert_eq!(decode_image_data("AQ\nID").unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_generate_card_returns_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(image_response("image/png", "AAAA")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = generator(&server)
            .generate_card(&[0xFF, 0xD8, 0xFF], "image/jpeg", "Grace Hopper")
            .await
            .unwrap();
        assert_eq!(url, "data:image/png;base64,AAAA");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["inline_data"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inline_data"]["data"], "/9j/");
        assert!(parts[1]["text"]
            .as_str()
            .unwrap()
            .contains("\"Happy Birthday Grace Hopper\""));
    }

    #[tokio::test]
    async fn test_generate_collects_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "text": "Happy birthday!" },
                            { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let req = GenerationRequest::new(" Ada ", vec![1], ImageFormat::Png).unwrap();
        let card = generator(&server).generate(&req).await.unwrap();
        assert_eq!(card.data, vec![1, 2, 3]);
        assert_eq!(card.subject_name, "Ada");
        assert_eq!(card.metadata.text, vec!["Happy birthday!".to_string()]);
        assert_eq!(
            card.metadata.model.as_deref(),
            Some("gemini-2.5-flash-image-preview")
        );
    }

    #[tokio::test]
    async fn test_no_image_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "I can't help with that." }] },
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate_card(&[1, 2, 3], "image/png", "Ada")
            .await
            .unwrap_err();
        assert!(matches!(err, CardGenError::NoImageReturned { reason: None }));
        let msg = err.to_string();
        assert!(msg.contains("did not return an image"));
        assert!(msg.contains("safety"));
    }

    #[tokio::test]
    async fn test_prompt_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [],
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate_card(&[1, 2, 3], "image/png", "Ada")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CardGenError::NoImageReturned { reason: Some(ref r) } if r == "SAFETY"
        ));
    }

    #[tokio::test]
    async fn test_upstream_error_embeds_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "quota exceeded",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate_card(&[1, 2, 3], "image/png", "Ada")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate_card(&[1, 2, 3], "image/png", "Ada")
            .await
            .unwrap_err();
        assert!(matches!(err, CardGenError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn test_invalid_base64_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(image_response("image/png", "%%%")),
            )
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate_card(&[1, 2, 3], "image/png", "Ada")
            .await
            .unwrap_err();
        assert!(matches!(err, CardGenError::Upstream { status: None, .. }));
        assert!(err
            .to_string()
            .starts_with("Failed to generate card: API returned invalid image data"));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let generator = GeminiCardGenerator::builder()
            .api_key("test-key")
            .base_url("http://127.0.0.1:1")
            .build()
            .unwrap();

        let err = generator
            .generate_card(&[1, 2, 3], "image/png", "Ada")
            .await
            .unwrap_err();
        assert!(matches!(err, CardGenError::Upstream { status: None, .. }));
        assert!(err.to_string().starts_with("Failed to generate card: "));
    }

    #[tokio::test]
    async fn test_validation_happens_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let generator = generator(&server);
        let err = generator
            .generate_card(&[1, 2, 3], "image/gif", "Ada")
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = generator
            .generate_card(&[1, 2, 3], "image/png", "  ")
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models/gemini-2.5-flash-image-preview"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "models/x" })))
            .mount(&server)
            .await;
        assert!(generator(&server).health_check().await.is_ok());

        let denied = GeminiCardGenerator::builder()
            .api_key("wrong-key")
            .base_url(server.uri())
            .build()
            .unwrap();
        // Unmatched requests get a 404 from the mock server
        let err = denied.health_check().await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
