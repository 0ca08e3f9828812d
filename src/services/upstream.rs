// src/services/upstream.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the conversational-AI provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("model returned no text")]
    EmptyReply,

    #[error("invalid model name: {0:?}")]
    InvalidModel(String),
}

/// One conversation with the provider. Prior turns are kept by the
/// implementation so each message is answered in context.
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<String, UpstreamError>;
}

pub type SessionHandle = Arc<dyn ChatSession>;

/// Starts new conversations against a given model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn start_chat(&self, model: &str) -> Result<SessionHandle, UpstreamError>;
}
