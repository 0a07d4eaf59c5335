//! Completion service abstraction
//!
//! The controller talks to the generative-language API through the
//! [`LlmService`] trait so tests can substitute stub services.

mod config;
mod error;
mod gemini;
mod types;


pub use config::LlmConfig;
pub use error::{FailureKind, RequestFailed};
pub use gemini::GeminiService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a single-turn completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed>;

    /// Identifier used in logs
    fn service_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        (**self).complete(request).await
    }

    fn service_id(&self) -> &str {
        (**self).service_id()
    }
}

/// Build the production service from configuration, wrapped with logging
pub fn service_from_config(config: &LlmConfig) -> Arc<dyn LlmService> {
    let gemini = GeminiService::new(config.api_key.clone(), config.api_url.clone());
    Arc::new(LoggingService::new(Arc::new(gemini)))
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    service_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let service_id = inner.service_id().to_string();
        Self { inner, service_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, RequestFailed> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    service = %self.service_id,
                    duration_ms = %duration.as_millis(),
                    prompt_chars = request.prompt.chars().count(),
                    reply_chars = response.text.chars().count(),
                    "Completion request succeeded"
                );
            }
            // Missing configuration is already reported at startup
            Err(e) if e.kind == FailureKind::NotConfigured => {
                tracing::warn!(
                    service = %self.service_id,
                    error = %e.message,
                    "Completion service not configured"
                );
            }
            Err(e) => {
                tracing::error!(
                    service = %self.service_id,
                    duration_ms = %duration.as_millis(),
                    kind = %e.kind,
                    error = %e.message,
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn service_id(&self) -> &str {
        &self.service_id
    }
}
