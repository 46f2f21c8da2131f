//! Configuration surface for the analysis core.
//!
//! All knobs are plain data supplied by an external settings loader;
//! the core holds no other implicit global state. Environment overrides
//! follow the usual convention: explicit config wins, then env vars,
//! then defaults.

use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;

/// Settings for one provider endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds. Distinct from any document-level
    /// budget, which callers enforce externally between chunks.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum characters of content included in a prompt.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_content_chars() -> usize {
    8000
}

impl ProviderSettings {
    pub(crate) fn deepseek_default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.deepseek.com".to_string(),
            api_key: None,
            model: "deepseek-chat".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_content_chars: 8000,
        }
    }

    pub(crate) fn openai_default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1000,
            temperature: default_temperature(),
            timeout_secs: 45,
            max_content_chars: 6000,
        }
    }

    pub(crate) fn local_default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            model: "llama3:8b".to_string(),
            max_tokens: 512,
            temperature: default_temperature(),
            // Local models are slow; allow a generous timeout.
            timeout_secs: 300,
            max_content_chars: 4000,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

/// Batch processing and memory-adaptation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum chunk size in characters before splitting kicks in.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Characters shared between consecutive chunks so entities and
    /// relations straddling a boundary are not lost.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Floor for adaptive shrinking; the chunk size is halved down to
    /// this, never below and never back up within one document.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    /// RSS growth across one chunk that triggers a shrink, in bytes.
    #[serde(default = "default_memory_growth_threshold")]
    pub memory_growth_threshold_bytes: u64,
}

fn default_max_batch_size() -> usize {
    5000
}

fn default_overlap() -> usize {
    500
}

fn default_min_batch_size() -> usize {
    1000
}

fn default_memory_growth_threshold() -> u64 {
    64 * 1024 * 1024
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            overlap: default_overlap(),
            min_batch_size: default_min_batch_size(),
            memory_growth_threshold_bytes: default_memory_growth_threshold(),
        }
    }
}

/// Semantic analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Content window sent with intent/relation/topic prompts.
    #[serde(default = "default_context_window")]
    pub context_window_size: usize,
    /// Entities per relation-extraction call, to keep prompts within
    /// provider limits.
    #[serde(default = "default_entities_per_batch")]
    pub max_entities_per_batch: usize,
    /// Relations below this confidence are dropped.
    #[serde(default = "default_relation_threshold")]
    pub relation_threshold: f32,
}

fn default_context_window() -> usize {
    2000
}

fn default_entities_per_batch() -> usize {
    15
}

fn default_relation_threshold() -> f32 {
    0.6
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            context_window_size: default_context_window(),
            max_entities_per_batch: default_entities_per_batch(),
            relation_threshold: default_relation_threshold(),
        }
    }
}

/// Top-level configuration for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Static provider order, used as the fallback ranking when quality
    /// history is empty and as the tie-break otherwise.
    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<ProviderKind>,
    #[serde(default = "ProviderSettings::deepseek_default")]
    pub deepseek: ProviderSettings,
    #[serde(default = "ProviderSettings::openai_default")]
    pub openai: ProviderSettings,
    #[serde(default = "ProviderSettings::local_default")]
    pub local: ProviderSettings,
    /// Retries per provider on transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Minimum quality score for an attempt to be accepted outright.
    #[serde(default = "default_quality_threshold")]
    pub quality_acceptance_threshold: f32,
    /// Entries kept per (provider, kind) in the quality history.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
}

fn default_provider_priority() -> Vec<ProviderKind> {
    vec![
        ProviderKind::DeepSeek,
        ProviderKind::OpenAi,
        ProviderKind::Local,
    ]
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_quality_threshold() -> f32 {
    0.7
}

fn default_history_capacity() -> usize {
    100
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider_priority: default_provider_priority(),
            deepseek: ProviderSettings::deepseek_default(),
            openai: ProviderSettings::openai_default(),
            local: ProviderSettings::local_default(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            quality_acceptance_threshold: default_quality_threshold(),
            history_capacity: default_history_capacity(),
            batch: BatchConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `DEEPSEEK_API_KEY`, `DEEPSEEK_BASE_URL`, `DEEPSEEK_MODEL`
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`
    /// - `DOCUMIND_LOCAL_ENDPOINT`, `DOCUMIND_LOCAL_MODEL`
    /// - `DOCUMIND_PROVIDER_PRIORITY`: comma-separated provider names
    /// - `DOCUMIND_MAX_BATCH_SIZE`, `DOCUMIND_BATCH_OVERLAP`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DEEPSEEK_API_KEY") {
            self.deepseek.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("DEEPSEEK_BASE_URL") {
            self.deepseek.endpoint = val;
        }
        if let Ok(val) = std::env::var("DEEPSEEK_MODEL") {
            self.deepseek.model = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("OPENAI_BASE_URL") {
            self.openai.endpoint = val;
        }
        if let Ok(val) = std::env::var("OPENAI_MODEL") {
            self.openai.model = val;
        }
        if let Ok(val) = std::env::var("DOCUMIND_LOCAL_ENDPOINT") {
            self.local.endpoint = val;
        }
        if let Ok(val) = std::env::var("DOCUMIND_LOCAL_MODEL") {
            self.local.model = val;
        }
        if let Ok(val) = std::env::var("DOCUMIND_PROVIDER_PRIORITY") {
            let parsed: Vec<ProviderKind> = val
                .split(',')
                .filter_map(|s| ProviderKind::from_str(s.trim()))
                .collect();
            if !parsed.is_empty() {
                self.provider_priority = parsed;
            }
        }
        if let Ok(val) = std::env::var("DOCUMIND_MAX_BATCH_SIZE") {
            if let Ok(n) = val.parse() {
                self.batch.max_batch_size = n;
            }
        }
        if let Ok(val) = std::env::var("DOCUMIND_BATCH_OVERLAP") {
            if let Ok(n) = val.parse() {
                self.batch.overlap = n;
            }
        }
        self
    }

    /// Settings for a specific provider.
    pub fn provider_settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::DeepSeek => &self.deepseek,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Local => &self.local,
        }
    }
}
