//! Top-level analysis pipeline.
//!
//! Wires the cache, batch processor, fallback orchestrator and
//! semantic analyzer into one entry point. Construction takes a
//! configuration and builds the provider chain from it; tests inject
//! their own providers instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::batch::{cluster_related_entities, BatchProcessor};
use crate::cache::{cache_key, ResultCache};
use crate::cancel::CancelFlag;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::models::{AnalysisKind, AnalysisRequest, AnalysisResult};
use crate::optimizer::{PromptOptimizer, QualityHistory};
use crate::orchestrator::FallbackOrchestrator;
use crate::providers::{build_provider_chain, ProviderClient, ProviderKind};
use crate::semantic::SemanticAnalyzer;

pub struct AnalysisPipeline {
    orchestrator: Arc<FallbackOrchestrator>,
    batch: BatchProcessor,
    semantic: SemanticAnalyzer,
    cache: ResultCache,
    provider_lineup: Vec<ProviderKind>,
}

impl AnalysisPipeline {
    /// Build a pipeline with the provider chain the configuration
    /// enables.
    pub fn new(config: AnalysisConfig) -> Self {
        let providers = build_provider_chain(&config);
        Self::with_providers(config, providers, None)
    }

    /// Build a pipeline over explicit providers. `cache_ttl` of None
    /// keeps cached results until `clear_cache`.
    pub fn with_providers(
        config: AnalysisConfig,
        providers: Vec<Arc<dyn ProviderClient>>,
        cache_ttl: Option<Duration>,
    ) -> Self {
        let config = Arc::new(config);
        let history = Arc::new(QualityHistory::new(config.history_capacity));
        let optimizer = PromptOptimizer::new(history, Arc::clone(&config));

        let provider_lineup: Vec<ProviderKind> = providers.iter().map(|p| p.kind()).collect();
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            providers,
            optimizer,
            Arc::clone(&config),
        ));

        info!("analysis pipeline ready, providers: {:?}", provider_lineup);
        Self {
            batch: BatchProcessor::new(Arc::clone(&orchestrator), config.batch.clone()),
            semantic: SemanticAnalyzer::new(Arc::clone(&orchestrator), config.semantic.clone()),
            orchestrator,
            cache: ResultCache::new(cache_ttl),
            provider_lineup,
        }
    }

    /// Analyze a document, consulting the cache first. Full analyses
    /// are enriched with intent, relations, topics and entity clusters.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelFlag,
    ) -> Result<Arc<AnalysisResult>, AnalysisError> {
        if request.content.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest("empty content".to_string()));
        }

        let key = cache_key(&request.content, request.kind, &self.provider_lineup);
        self.cache
            .get_or_compute(&key, || self.run(request, cancel))
            .await
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelFlag,
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut result = self
            .batch
            .process(
                &request.content,
                &request.metadata,
                request.kind,
                request.provider_hint,
                cancel,
            )
            .await?;

        if request.kind == AnalysisKind::FullAnalysis && !result.degraded {
            self.enrich(&mut result, request, cancel).await?;
        }

        Ok(result)
    }

    /// Semantic enrichment pass for full analyses. Each stage is
    /// best-effort except for cancellation.
    async fn enrich(
        &self,
        result: &mut AnalysisResult,
        request: &AnalysisRequest,
        cancel: &CancelFlag,
    ) -> Result<(), AnalysisError> {
        debug!("enriching full analysis with semantic passes");

        result.intent = Some(
            self.semantic
                .analyze_document_intent(&request.content, &request.metadata, cancel)
                .await?,
        );

        if !result.entities.is_empty() {
            result.relations = self
                .semantic
                .extract_semantic_relations(
                    &request.content,
                    &result.entities,
                    &request.metadata,
                    cancel,
                )
                .await?;
            result.topics = self
                .semantic
                .extract_contextual_topics(
                    &request.content,
                    &result.entities,
                    &request.metadata,
                    cancel,
                )
                .await?;
            result.clusters = cluster_related_entities(&result.entities, &result.relations);
        }

        Ok(())
    }

    /// The current best provider for a kind by recorded quality.
    pub fn preferred_provider(&self, kind: AnalysisKind) -> Option<ProviderKind> {
        self.orchestrator
            .optimizer()
            .get_best_provider_for_analysis(kind)
            .ok()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }
}
