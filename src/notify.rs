//!
//! src/notify.rs
//!
//! Posts run outcomes to an incoming webhook. Best effort: failures are
//! logged and dropped, never retried.
//!

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header};
use serde::Serialize;

use crate::config::{HttpConfig, NotifyConfig};
use crate::errors::PipelineError;
use crate::fetch::base_client;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: &'a str,
}

#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    http: Client,
    cfg: NotifyConfig,
}

impl WebhookNotifier {
    pub fn new(http_config: &HttpConfig, cfg: &NotifyConfig) -> Result<Self, PipelineError> {
        Ok( Self { http: base_client(http_config)?, cfg: cfg.clone() } )
    }

    /// POST {"text": message}
    pub fn request(&self, message: &str) -> Result<RequestBuilder, PipelineError> {
        let body = serde_json::to_vec(&WebhookBody { text: message })?;
        Ok(self.http
            .post(self.cfg.webhook_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let request = match self.request(message) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "notify.build.failed");
                return;
            }
        };
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(message, "notify.sent");
            }
            Ok(response) => {
                tracing::warn!(status = response.status().as_u16(), "notify.rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "notify.failed");
            }
        }
    }
}

/// Keeps every message in memory instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
