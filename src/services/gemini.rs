// src/services/gemini.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::upstream::{ChatBackend, ChatSession, SessionHandle, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone, Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part { text: Some(text.to_string()) }],
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Gemini `generateContent` client. Cheap to clone; sessions share its
/// connection pool.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn generate(&self, model: &str, contents: &[Content]) -> Result<String, UpstreamError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest { contents })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(UpstreamError::Api { status, message });
        }

        let body: GenerateContentResponse = response.json().await?;
        extract_text(body)
    }
}

fn extract_text(body: GenerateContentResponse) -> Result<String, UpstreamError> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(UpstreamError::EmptyReply);
    }
    Ok(text)
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn start_chat(&self, model: &str) -> Result<SessionHandle, UpstreamError> {
        if model.trim().is_empty() || model.contains('/') {
            return Err(UpstreamError::InvalidModel(model.to_string()));
        }
        Ok(Arc::new(GeminiChat {
            client: self.clone(),
            model: model.to_string(),
            history: Mutex::new(Vec::new()),
        }))
    }
}

/// A multi-turn chat. The history lock is held across the request so turns
/// from the same user are appended in order.
pub struct GeminiChat {
    client: GeminiClient,
    model: String,
    history: Mutex<Vec<Content>>,
}

#[async_trait]
impl ChatSession for GeminiChat {
    async fn send_message(&self, text: &str) -> Result<String, UpstreamError> {
        let mut history = self.history.lock().await;

        let mut contents = history.clone();
        contents.push(Content::text("user", text));

        let reply = self.client.generate(&self.model, &contents).await?;

        contents.push(Content::text("model", &reply));
        *history = contents;
        debug!(model = %self.model, turns = history.len(), "gemini turn recorded");

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let body = parse(
            r#"{"candidates":[
                {"content":{"role":"model","parts":[{"text":"hi "},{"text":"there"}]}},
                {"content":{"role":"model","parts":[{"text":"ignored"}]}}
            ]}"#,
        );
        assert_eq!(extract_text(body).unwrap(), "hi there");
    }

    #[test]
    fn no_candidates_is_an_error() {
        let body = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(matches!(extract_text(body), Err(UpstreamError::EmptyReply)));
    }

    #[tokio::test]
    async fn rejects_blank_model() {
        let client = GeminiClient::new("key", DEFAULT_BASE_URL);
        let err = client.start_chat("  ").await.err().unwrap();
        assert!(matches!(err, UpstreamError::InvalidModel(_)));
    }
}
