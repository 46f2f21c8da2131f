//! Shared infrastructure for chat-completions style providers
//! (DeepSeek, OpenAI-compatible).
//!
//! Both speak the same wire format; only endpoint, credentials and
//! error nuances differ.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::ProviderResponse;
use crate::providers::ProviderKind;

const SYSTEM_PROMPT: &str = "You are an assistant specialized in document \
analysis. Always respond with exactly the JSON structure requested, with \
no additional commentary.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Build an HTTP client with the provider's per-call timeout.
pub(super) fn build_http_client(settings: &ProviderSettings) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Map an HTTP error status to the provider error taxonomy.
pub(super) fn error_for_status(status: StatusCode, body: &str, retry_after: Option<u64>) -> ProviderError {
    match status.as_u16() {
        // Rate limits and exhausted credit both mean "stop asking".
        402 | 429 => ProviderError::QuotaExceeded {
            retry_after_secs: retry_after,
        },
        s if s >= 500 => ProviderError::Transient(format!("HTTP {}: {}", status, body)),
        _ => ProviderError::InvalidResponse(format!("HTTP {}: {}", status, body)),
    }
}

/// Parse a Retry-After header value in seconds.
pub(super) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Send a chat-completions request and read back the first choice.
pub(super) async fn send_chat(
    provider: ProviderKind,
    client: &Client,
    settings: &ProviderSettings,
    prompt: &str,
) -> Result<ProviderResponse, ProviderError> {
    let request = ChatRequest {
        model: &settings.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };

    let url = format!(
        "{}/v1/chat/completions",
        settings.endpoint.trim_end_matches('/')
    );
    debug!("{}: sending chat request to {}", provider, url);

    let start = Instant::now();
    let mut builder = client.post(&url).json(&request);
    if let Some(key) = settings.api_key.as_deref() {
        builder = builder.bearer_auth(key);
    }
    let resp = builder
        .send()
        .await
        .map_err(|e| ProviderError::Transient(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        return Err(error_for_status(status, &body, retry_after));
    }

    let parsed: ChatResponse = resp
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    let latency_ms = start.elapsed().as_millis() as u64;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?;

    Ok(ProviderResponse {
        text: choice.message.content,
        prompt_tokens: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
        completion_tokens: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
        latency_ms,
        provider,
    })
}
