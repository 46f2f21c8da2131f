//! Shared test doubles: scripted providers and memory samplers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use documind::config::AnalysisConfig;
use documind::error::ProviderError;
use documind::memory::MemorySampler;
use documind::models::{AnalysisKind, ProviderResponse};
use documind::optimizer::{PromptOptimizer, QualityHistory};
use documind::orchestrator::FallbackOrchestrator;
use documind::providers::{ProviderClient, ProviderKind};

/// A provider that replays a script of responses, then repeats an
/// optional steady-state response once the script runs out.
pub struct MockProvider {
    kind: ProviderKind,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    steady: Option<String>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn scripted(
        kind: ProviderKind,
        script: Vec<Result<String, ProviderError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into()),
            steady: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Always answers with the same response.
    pub fn steady(kind: ProviderKind, response: &str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            steady: Some(response.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn submit(
        &self,
        _prompt: &str,
        _kind: AnalysisKind,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front();
        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(err)) => return Err(err),
            None => match &self.steady {
                Some(text) => text.clone(),
                None => {
                    return Err(ProviderError::InvalidResponse(
                        "script exhausted".to_string(),
                    ))
                }
            },
        };

        Ok(ProviderResponse {
            text,
            prompt_tokens: Some(100),
            completion_tokens: Some(50),
            latency_ms: 5,
            provider: self.kind,
        })
    }
}

/// Memory sampler that grows by a fixed step on every reading.
pub struct GrowingSampler {
    next: AtomicU64,
    step: u64,
}

impl GrowingSampler {
    pub fn new(step: u64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU64::new(0),
            step,
        })
    }
}

impl MemorySampler for GrowingSampler {
    fn rss_bytes(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Memory sampler replaying fixed readings, repeating the last one.
pub struct ScriptedSampler {
    readings: Mutex<VecDeque<u64>>,
    last: AtomicU64,
}

impl ScriptedSampler {
    pub fn new(readings: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            readings: Mutex::new(readings.into()),
            last: AtomicU64::new(0),
        })
    }
}

impl MemorySampler for ScriptedSampler {
    fn rss_bytes(&self) -> u64 {
        match self.readings.lock().expect("readings lock poisoned").pop_front() {
            Some(value) => {
                self.last.store(value, Ordering::SeqCst);
                value
            }
            None => self.last.load(Ordering::SeqCst),
        }
    }
}

/// Small retry delays so failure paths stay fast under test. Also
/// installs a subscriber so `RUST_LOG` works during test runs.
pub fn fast_config() -> AnalysisConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut config = AnalysisConfig::default();
    config.retry_delay_ms = 1;
    config
}

pub fn orchestrator_over(
    providers: Vec<Arc<dyn ProviderClient>>,
    config: AnalysisConfig,
) -> FallbackOrchestrator {
    let config = Arc::new(config);
    let history = Arc::new(QualityHistory::new(config.history_capacity));
    let optimizer = PromptOptimizer::new(history, Arc::clone(&config));
    FallbackOrchestrator::new(providers, optimizer, config)
}

/// A complete, well-structured full-analysis response that clears the
/// quality threshold.
pub fn good_full_analysis() -> String {
    serde_json::json!({
        "summary": "Quarterly budget report covering spending and revenue.",
        "keywords": ["budget", "spending", "revenue", "fiscal", "quarterly"],
        "entities": [
            {"type": "ORG", "value": "Treasury", "relevance": 0.9},
            {"type": "ORG", "value": "Senate", "relevance": 0.7},
            {"type": "DATE", "value": "2025", "relevance": 0.6}
        ],
        "main_topic": "public budget",
        "document_type": "report",
        "purpose": "inform"
    })
    .to_string()
}
