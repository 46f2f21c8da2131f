//! Provider abstraction for model-backed analysis.
//!
//! A provider is an opaque capability: prompt text in, structured
//! response or failure out. The orchestrator never inspects
//! provider-internal state. The set of implementations is closed and
//! constructed through an explicit registry, no dynamic discovery.

mod chat_api;
mod deepseek;
mod local;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::ProviderError;
use crate::models::{AnalysisKind, ProviderResponse};

pub use deepseek::DeepSeekProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;

/// Available provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// DeepSeek chat-completions API.
    DeepSeek,
    /// Any OpenAI-compatible endpoint (OpenAI, Groq, Together.ai).
    OpenAi,
    /// Local model via an Ollama-style generate API.
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Local => "local",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deepseek" => Some(ProviderKind::DeepSeek),
            "openai" | "groq" | "together" => Some(ProviderKind::OpenAi),
            "local" | "ollama" => Some(ProviderKind::Local),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Polymorphic capability over external model providers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which provider this client reaches.
    fn kind(&self) -> ProviderKind;

    /// Whether the client is usable (enabled, credentials present).
    fn is_available(&self) -> bool;

    /// Submit a prompt and return the model response.
    async fn submit(
        &self,
        prompt: &str,
        kind: AnalysisKind,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Construct a client for one provider from configuration.
pub fn create_provider(kind: ProviderKind, config: &AnalysisConfig) -> Arc<dyn ProviderClient> {
    let settings = config.provider_settings(kind).clone();
    match kind {
        ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::new(settings)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(settings)),
        ProviderKind::Local => Arc::new(LocalProvider::new(settings)),
    }
}

/// Build the ordered provider chain from the configured priority list,
/// dropping providers that are not usable.
pub fn build_provider_chain(config: &AnalysisConfig) -> Vec<Arc<dyn ProviderClient>> {
    let mut chain: Vec<Arc<dyn ProviderClient>> = Vec::new();

    for &kind in &config.provider_priority {
        let provider = create_provider(kind, config);
        if provider.is_available() {
            debug!("provider chain: added {}", kind);
            chain.push(provider);
        } else {
            debug!("provider chain: {} not available", kind);
        }
    }

    if chain.is_empty() {
        warn!("provider chain is empty; all analyses will be degraded");
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [ProviderKind::DeepSeek, ProviderKind::OpenAi, ProviderKind::Local] {
            assert_eq!(ProviderKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::from_str("groq"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::from_str("ollama"), Some(ProviderKind::Local));
        assert_eq!(ProviderKind::from_str("bogus"), None);
    }

    #[test]
    fn test_chain_skips_unavailable_providers() {
        // No API keys in the default config, so only the local provider
        // (which needs none) survives.
        let config = AnalysisConfig::default();
        let chain = build_provider_chain(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].kind(), ProviderKind::Local);
    }
}
