//! DeepSeek provider client.

use async_trait::async_trait;
use reqwest::Client;

use super::chat_api;
use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::{AnalysisKind, ProviderResponse};
use crate::providers::{ProviderClient, ProviderKind};

/// Client for the DeepSeek chat-completions API.
pub struct DeepSeekProvider {
    settings: ProviderSettings,
    client: Client,
}

impl DeepSeekProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let client = chat_api::build_http_client(&settings);
        Self { settings, client }
    }
}

#[async_trait]
impl ProviderClient for DeepSeekProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    fn is_available(&self) -> bool {
        self.settings.enabled && self.settings.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn submit(
        &self,
        prompt: &str,
        _kind: AnalysisKind,
    ) -> Result<ProviderResponse, ProviderError> {
        chat_api::send_chat(self.kind(), &self.client, &self.settings, prompt).await
    }
}
