//! Gemini API連携
//!
//! 画像をBase64のinline_dataとして送信し、最初の候補のテキストを返す。

use crate::error::{CatalogError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini APIリクエスト
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini APIレスポンス
#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

fn build_request(prompt: &str, image: &[u8], mime_type: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: prompt.to_string(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: base64::engine::general_purpose::STANDARD.encode(image),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig { temperature: 0.1 },
    }
}

fn first_text(response: GeminiResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| CatalogError::ApiParse("Gemini: 空のレスポンス".into()))
}

/// Gemini API 呼び出し
pub(super) async fn generate(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    prompt: &str,
    image: &[u8],
    mime_type: &str,
) -> Result<String> {
    let url = format!("{}/{}:generateContent", GEMINI_API_BASE, model);
    let request = build_request(prompt, image, mime_type);

    debug!(model, image_bytes = image.len(), "Gemini API呼び出し");

    let response = client
        .post(&url)
        .query(&[("key", api_key)])
        .json(&request)
        .send()
        .await
        .map_err(|e| CatalogError::ApiCall(format!("Gemini: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CatalogError::ApiCall(format!(
            "Gemini API error {}: {}",
            status,
            body.chars().take(300).collect::<String>()
        )));
    }

    let parsed: GeminiResponse = response
        .json()
        .await
        .map_err(|e| CatalogError::ApiParse(format!("Gemini: {}", e)))?;

    first_text(parsed)
}
