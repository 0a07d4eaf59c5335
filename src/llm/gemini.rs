//! Google Gemini `generateContent` client

use super::types::{LlmRequest, LlmResponse};
use super::{LlmService, RequestFailed};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Gemini service implementation.
///
/// Key and URL are optional so a misconfigured process still runs; every
/// request then fails through the normal failure path.
pub struct GeminiService {
    client: Client,
    api_key: Option<String>,
    api_url: Option<String>,
}

impl GeminiService {
    pub fn new(api_key: Option<String>, api_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
        }
    }

    pub(super) fn translate_request(request: &LlmRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Some(request.prompt.clone()),
                }],
            }],
        }
    }

    /// Reply text lives at `candidates[0].content.parts[0].text`.
    pub(super) fn normalize_response(resp: GeminiResponse) -> Result<LlmResponse, RequestFailed> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| RequestFailed::malformed("No candidates in response"))?;

        let content = candidate
            .content
            .ok_or_else(|| RequestFailed::malformed("First candidate has no content"))?;

        let part = content
            .parts
            .into_iter()
            .next()
            .ok_or_else(|| RequestFailed::malformed("First candidate has no parts"))?;

        let text = part
            .text
            .ok_or_else(|| RequestFailed::malformed("First part has no text"))?;

        if text.trim().is_empty() {
            return Err(RequestFailed::malformed("First part text is empty"));
        }

        Ok(LlmResponse::new(text))
    }
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        let (Some(api_key), Some(api_url)) = (&self.api_key, &self.api_url) else {
            return Err(RequestFailed::not_configured(
                "GEMINI_API_KEY and GEMINI_API_URL must both be set",
            ));
        };

        let gemini_request = Self::translate_request(request);

        let response = self
            .client
            .post(api_url)
            .query(&[("key", api_key)])
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key in its query string
                let e = e.without_url();
                if e.is_timeout() {
                    RequestFailed::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    RequestFailed::network(format!("Connection failed: {e}"))
                } else {
                    RequestFailed::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                RequestFailed::network(format!("Failed to read response: {}", e.without_url()))
            })?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<GeminiErrorResponse>(&body) {
                return Err(RequestFailed::status(format!(
                    "HTTP {status}: {}",
                    error_resp.error.message
                )));
            }
            return Err(RequestFailed::status(format!("HTTP {status}: {body}")));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            RequestFailed::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(gemini_response)
    }

    fn service_id(&self) -> &str {
        "gemini"
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
pub(super) struct GeminiRequest {
    pub(super) contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct GeminiContent {
    #[serde(default)]
    pub(super) parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GeminiResponse {
    #[serde(default)]
    pub(super) candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GeminiCandidate {
    #[serde(default)]
    pub(super) content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
