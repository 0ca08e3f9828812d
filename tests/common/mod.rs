#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use gemini_chat_gateway::services::upstream::{
    ChatBackend, ChatSession, SessionHandle, UpstreamError,
};
use reqwest::StatusCode;

/// Upstream stand-in that records every session it starts and every message
/// sent, tagged with the id of the session that received it.
#[derive(Default)]
pub struct StubBackend {
    pub reply: String,
    pub fail_create: bool,
    /// Fail only the first `fail_first` creation attempts.
    pub fail_first: usize,
    pub attempts: AtomicUsize,
    pub fail_send: bool,
    pub create_delay: Duration,
    pub send_delay: Duration,
    pub models: Mutex<Vec<String>>,
    pub started: AtomicUsize,
    pub sent: Arc<Mutex<Vec<(usize, String)>>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self { reply: reply.to_string(), ..Default::default() }
    }

    pub fn created(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(usize, String)> {
        self.sent.lock().unwrap().clone()
    }
}

fn quota_error() -> UpstreamError {
    UpstreamError::Api {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "quota exhausted".to_string(),
    }
}

#[async_trait]
impl ChatBackend for StubBackend {
    async fn start_chat(&self, model: &str) -> Result<SessionHandle, UpstreamError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_create || attempt < self.fail_first {
            return Err(quota_error());
        }
        self.models.lock().unwrap().push(model.to_string());
        let id = self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubSession {
            id,
            reply: self.reply.clone(),
            fail: self.fail_send,
            delay: self.send_delay,
            calls: Arc::clone(&self.sent),
        }))
    }
}

struct StubSession {
    id: usize,
    reply: String,
    fail: bool,
    delay: Duration,
    calls: Arc<Mutex<Vec<(usize, String)>>>,
}

#[async_trait]
impl ChatSession for StubSession {
    async fn send_message(&self, text: &str) -> Result<String, UpstreamError> {
        self.calls.lock().unwrap().push((self.id, text.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(quota_error());
        }
        Ok(self.reply.clone())
    }
}
