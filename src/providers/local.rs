//! Local model provider via an Ollama-style generate API.
//!
//! No credentials required; useful as the last rung of a fallback chain
//! before degraded analysis.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::chat_api;
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::{AnalysisKind, ProviderResponse};
use crate::providers::{ProviderClient, ProviderKind};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

pub struct LocalProvider {
    settings: ProviderSettings,
    client: Client,
}

impl LocalProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let client = chat_api::build_http_client(&settings);
        Self { settings, client }
    }
}

#[async_trait]
impl ProviderClient for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn is_available(&self) -> bool {
        self.settings.enabled
    }

    async fn submit(
        &self,
        prompt: &str,
        _kind: AnalysisKind,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };

        let url = format!(
            "{}/api/generate",
            self.settings.endpoint.trim_end_matches('/')
        );
        debug!("local: sending generate request to {}", url);

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let retry_after = chat_api::parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(chat_api::error_for_status(status, &body, retry_after));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(ProviderResponse {
            text: parsed.response,
            prompt_tokens: parsed.prompt_eval_count,
            completion_tokens: parsed.eval_count,
            latency_ms: start.elapsed().as_millis() as u64,
            provider: self.kind(),
        })
    }
}
