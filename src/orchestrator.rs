//! Provider fallback orchestration.
//!
//! Tries providers in quality order with bounded retries and falls back
//! to a degraded local analysis when everything fails, so a call always
//! returns a result. Attempt outcomes are explicit values consumed by a
//! loop, not control flow by error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::AnalysisConfig;
use crate::degraded;
use crate::error::AnalysisError;
use crate::models::{
    AnalysisKind, AnalysisResult, ContextualTopic, DocumentIntent, DocumentMetadata, Entity,
    PromptPlan, SemanticRelation,
};
use crate::optimizer::{extract_json, PromptOptimizer};
use crate::providers::{ProviderClient, ProviderKind};

/// Outcome of all attempts against one provider.
enum AttemptOutcome {
    /// Quality met the acceptance threshold.
    Accepted(Box<AnalysisResult>),
    /// Response arrived but scored below the threshold; kept as a
    /// candidate in case no provider does better.
    LowQuality { score: f32, result: Box<AnalysisResult> },
    /// All attempts failed (transient retries exhausted, quota, or an
    /// unreadable response).
    Failed,
}

/// Orders providers by historical quality and drives the retry and
/// fallback loop.
pub struct FallbackOrchestrator {
    providers: Vec<Arc<dyn ProviderClient>>,
    optimizer: PromptOptimizer,
    config: Arc<AnalysisConfig>,
}

impl FallbackOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn ProviderClient>>,
        optimizer: PromptOptimizer,
        config: Arc<AnalysisConfig>,
    ) -> Self {
        info!("fallback orchestrator initialized with {} providers", providers.len());
        Self {
            providers,
            optimizer,
            config,
        }
    }

    pub fn optimizer(&self) -> &PromptOptimizer {
        &self.optimizer
    }

    /// Analyze content with automatic provider fallback.
    ///
    /// Always returns a result - possibly degraded - except for invalid
    /// input or cancellation.
    pub async fn analyze(
        &self,
        content: &str,
        metadata: &DocumentMetadata,
        kind: AnalysisKind,
        provider_hint: Option<ProviderKind>,
        cancel: &CancelFlag,
    ) -> Result<AnalysisResult, AnalysisError> {
        if content.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest("empty content".to_string()));
        }

        let ordered = self.order_providers(kind, provider_hint);
        let mut best_soft: Option<(f32, Box<AnalysisResult>)> = None;

        for provider in &ordered {
            let plan = self
                .optimizer
                .build_optimized_prompt(content, metadata, provider.kind(), kind)?;

            match self.try_provider(provider.as_ref(), &plan, cancel).await? {
                AttemptOutcome::Accepted(result) => return Ok(*result),
                AttemptOutcome::LowQuality { score, result } => {
                    debug!(
                        "{} produced low-quality {} result (score {:.2}), trying next provider",
                        provider.kind(),
                        kind,
                        score
                    );
                    let keep = best_soft.as_ref().map_or(true, |(best, _)| score > *best);
                    if keep {
                        best_soft = Some((score, result));
                    }
                }
                AttemptOutcome::Failed => {}
            }
        }

        if let Some((score, result)) = best_soft {
            info!(
                "no provider met the quality threshold; using best attempt (score {:.2})",
                score
            );
            return Ok(*result);
        }

        Ok(degraded::analyze(content, kind))
    }

    /// Run one provider with bounded retries on transient failures.
    async fn try_provider(
        &self,
        provider: &dyn ProviderClient,
        plan: &PromptPlan,
        cancel: &CancelFlag,
    ) -> Result<AttemptOutcome, AnalysisError> {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            let start = Instant::now();
            match provider.submit(&plan.text, plan.kind).await {
                Ok(response) => {
                    let metrics =
                        self.optimizer
                            .evaluate_response(plan, &response.text, response.latency_ms);
                    let mut result = parse_model_output(plan.kind, &response.text);
                    result.provider = Some(provider.kind());
                    let score = metrics.score();
                    result.quality = Some(metrics);

                    if score >= self.config.quality_acceptance_threshold {
                        return Ok(AttemptOutcome::Accepted(Box::new(result)));
                    }
                    return Ok(AttemptOutcome::LowQuality {
                        score,
                        result: Box::new(result),
                    });
                }
                Err(err) if err.is_transient() && attempt < max_retries => {
                    let delay = backoff_delay(attempt, self.config.retry_delay_ms);
                    warn!(
                        "{} transient failure (attempt {}/{}), retrying in {:?}: {}",
                        provider.kind(),
                        attempt + 1,
                        max_retries + 1,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!("{} failed for {}: {}", provider.kind(), plan.kind, err);
                    self.optimizer.record_failure(
                        provider.kind(),
                        plan.kind,
                        start.elapsed().as_millis() as u64,
                    );
                    return Ok(AttemptOutcome::Failed);
                }
            }
        }
    }

    /// Build the attempt order: hint first when available, then ranked
    /// by historical quality, then the configured static order.
    fn order_providers(
        &self,
        kind: AnalysisKind,
        hint: Option<ProviderKind>,
    ) -> Vec<Arc<dyn ProviderClient>> {
        let history = self.optimizer.history();

        let mut ordered: Vec<Arc<dyn ProviderClient>> = self.providers.clone();
        // Neutral prior for providers with no recorded history keeps
        // them ahead of known-bad ones but behind proven ones.
        ordered.sort_by(|a, b| {
            let score_a = history.ewma_score(a.kind(), kind).unwrap_or(0.5);
            let score_b = history.ewma_score(b.kind(), kind).unwrap_or(0.5);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(hinted) = hint {
            if let Some(pos) = ordered.iter().position(|p| p.kind() == hinted) {
                let preferred = ordered.remove(pos);
                ordered.insert(0, preferred);
            }
        }

        ordered
    }
}

/// Exponential backoff: base delay doubled per attempt.
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

/// Interpret a model response as an analysis result. Structured fields
/// are pulled from JSON when present; otherwise the raw text becomes
/// the summary so even an unstructured answer is usable.
pub(crate) fn parse_model_output(kind: AnalysisKind, text: &str) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    let parsed = if kind == AnalysisKind::Summary {
        None
    } else {
        extract_json(text)
    };

    let Some(object) = parsed.as_ref().and_then(|v| v.as_object()) else {
        result.summary = text.trim().to_string();
        return result;
    };

    if let Some(summary) = object.get("summary").and_then(|v| v.as_str()) {
        result.summary = summary.to_string();
    }
    if let Some(keywords) = object.get("keywords").and_then(|v| v.as_array()) {
        result.keywords = keywords
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    if let Some(entities) = object.get("entities").cloned() {
        result.entities = serde_json::from_value::<Vec<Entity>>(entities).unwrap_or_default();
    }
    if let Some(relations) = object.get("relations").and_then(|v| v.as_array()) {
        // Malformed entries are skipped, not fatal.
        result.relations = relations
            .iter()
            .filter_map(|v| serde_json::from_value::<SemanticRelation>(v.clone()).ok())
            .collect();
    }
    if let Some(contexts) = object.get("contexts").and_then(|v| v.as_array()) {
        result.topics = contexts
            .iter()
            .filter_map(|v| serde_json::from_value::<ContextualTopic>(v.clone()).ok())
            .collect();
    }
    if let Some(intent) = object.get("intent") {
        result.intent = Some(parse_intent(intent, object));
    }
    result.main_topic = object
        .get("main_topic")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    result.document_type = object
        .get("document_type")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    result.purpose = object
        .get("purpose")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    result
}

fn parse_intent(
    intent: &serde_json::Value,
    object: &serde_json::Map<String, serde_json::Value>,
) -> DocumentIntent {
    let mut parsed = DocumentIntent::unknown();

    if let Some(primary) = intent.get("primary").and_then(|v| v.as_str()) {
        parsed.primary_intent = primary.to_string();
    }
    if let Some(confidence) = intent.get("confidence").and_then(|v| v.as_f64()) {
        parsed.confidence = confidence as f32;
    }
    if let Some(secondary) = intent.get("secondary").and_then(|v| v.as_array()) {
        parsed.secondary_intents = secondary
            .iter()
            .filter_map(|item| {
                let label = item.get("type")?.as_str()?.to_string();
                let confidence = item.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5);
                Some((label, confidence as f32))
            })
            .collect();
    }
    if let Some(audience) = object.get("target_audience").and_then(|v| v.as_str()) {
        parsed.target_audience = audience.to_string();
    }
    parsed.call_to_action = object
        .get("call_to_action")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    parsed
}
