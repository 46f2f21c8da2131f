//! Prompt optimization and response quality tracking.
//!
//! The optimizer renders provider-tuned prompts from the template
//! catalog, scores responses against per-kind expectations, and keeps a
//! bounded rolling history of quality per (provider, kind) that the
//! orchestrator uses to rank providers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::error::{NoHistoryError, TemplateError};
use crate::models::{AnalysisKind, DocumentMetadata, PromptPlan, QualityMetrics};
use crate::prompts::{PromptTemplateCatalog, TemplateVars};
use crate::providers::ProviderKind;

/// Weight of the newest sample in the exponentially-weighted average.
const EWMA_ALPHA: f32 = 0.3;

/// Bounded quality history keyed by (provider, analysis kind).
///
/// Explicitly owned and injectable so tests can substitute an isolated
/// instance; shared across concurrent calls behind a lock. Readers may
/// observe a slightly stale ranking, which is acceptable.
pub struct QualityHistory {
    capacity: usize,
    entries: RwLock<HashMap<(ProviderKind, AnalysisKind), VecDeque<QualityMetrics>>>,
}

impl QualityHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Append one entry, evicting the oldest once the bound is hit.
    pub fn record(&self, metrics: QualityMetrics) {
        let mut entries = self.entries.write().expect("quality history lock poisoned");
        let ring = entries
            .entry((metrics.provider, metrics.kind))
            .or_default();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(metrics);
    }

    /// Exponentially-weighted average score for one provider and kind,
    /// oldest to newest so recent outcomes dominate.
    pub fn ewma_score(&self, provider: ProviderKind, kind: AnalysisKind) -> Option<f32> {
        let entries = self.entries.read().expect("quality history lock poisoned");
        let ring = entries.get(&(provider, kind))?;
        let mut score: Option<f32> = None;
        for metrics in ring {
            score = Some(match score {
                None => metrics.score(),
                Some(prev) => EWMA_ALPHA * metrics.score() + (1.0 - EWMA_ALPHA) * prev,
            });
        }
        score
    }

    /// Timestamp of the most recent successful entry (score above zero).
    fn last_success(&self, provider: ProviderKind, kind: AnalysisKind) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().expect("quality history lock poisoned");
        entries
            .get(&(provider, kind))?
            .iter()
            .rev()
            .find(|m| m.score() > 0.0)
            .map(|m| m.timestamp)
    }

    /// Provider with the best weighted score for a kind. Ties break on
    /// the most recent success.
    pub fn best_provider(&self, kind: AnalysisKind) -> Result<ProviderKind, NoHistoryError> {
        let providers: Vec<ProviderKind> = {
            let entries = self.entries.read().expect("quality history lock poisoned");
            entries
                .keys()
                .filter(|(_, k)| *k == kind)
                .map(|(p, _)| *p)
                .collect()
        };

        let mut best: Option<(ProviderKind, f32, Option<DateTime<Utc>>)> = None;
        for provider in providers {
            let Some(score) = self.ewma_score(provider, kind) else {
                continue;
            };
            let success = self.last_success(provider, kind);
            let better = match &best {
                None => true,
                Some((_, best_score, best_success)) => {
                    score > *best_score
                        || ((score - best_score).abs() < f32::EPSILON && success > *best_success)
                }
            };
            if better {
                best = Some((provider, score, success));
            }
        }

        best.map(|(p, _, _)| p).ok_or(NoHistoryError(kind))
    }

    /// Number of recorded entries for one (provider, kind) pair.
    pub fn len(&self, provider: ProviderKind, kind: AnalysisKind) -> usize {
        let entries = self.entries.read().expect("quality history lock poisoned");
        entries.get(&(provider, kind)).map_or(0, |r| r.len())
    }
}

/// Builds provider-tuned prompts and scores responses.
pub struct PromptOptimizer {
    catalog: PromptTemplateCatalog,
    history: Arc<QualityHistory>,
    config: Arc<AnalysisConfig>,
}

impl PromptOptimizer {
    pub fn new(history: Arc<QualityHistory>, config: Arc<AnalysisConfig>) -> Self {
        Self {
            catalog: PromptTemplateCatalog::new(),
            history,
            config,
        }
    }

    pub fn history(&self) -> &Arc<QualityHistory> {
        &self.history
    }

    /// Build a provider-tuned prompt. Deterministic given the same
    /// history snapshot.
    pub fn build_optimized_prompt(
        &self,
        content: &str,
        metadata: &DocumentMetadata,
        provider: ProviderKind,
        kind: AnalysisKind,
    ) -> Result<PromptPlan, TemplateError> {
        let settings = self.config.provider_settings(provider);
        let truncated = truncate_at_word_boundary(content, settings.max_content_chars);

        let mut vars = TemplateVars::new();
        vars.insert("content", truncated);
        if let Some(info) = document_info(metadata, kind)? {
            vars.insert("document_info", info);
        }

        let rendered = self.catalog.render(kind, &vars)?;
        let mut text = rendered.text;

        // JSON-output kinds get provider-specific strictness suffixes.
        if kind != AnalysisKind::Summary {
            match provider {
                ProviderKind::DeepSeek => {
                    text.push_str(
                        "\n\nRespond with a single valid JSON object and no additional text.",
                    );
                }
                ProviderKind::Local => {
                    text.push_str(
                        "\n\nBe concise. Respond with a single valid JSON object and nothing else.",
                    );
                }
                ProviderKind::OpenAi => {}
            }

            // A provider with a weak track record for this kind gets an
            // extra format reminder.
            if let Some(score) = self.history.ewma_score(provider, kind) {
                if score < self.config.quality_acceptance_threshold {
                    text.push_str(
                        "\n\nDouble-check that the output is valid JSON matching the requested structure exactly.",
                    );
                }
            }
        }

        Ok(PromptPlan {
            kind,
            provider,
            text,
            template_version: rendered.version,
        })
    }

    /// Score a response against per-kind expectations and append the
    /// result to the history.
    pub fn evaluate_response(
        &self,
        plan: &PromptPlan,
        response_text: &str,
        processing_time_ms: u64,
    ) -> QualityMetrics {
        let (completeness, confidence) = score_response(plan.kind, response_text);
        let metrics = QualityMetrics {
            provider: plan.provider,
            kind: plan.kind,
            completeness,
            confidence,
            processing_time_ms,
            timestamp: Utc::now(),
        };

        info!(
            "prompt evaluation: provider={} kind={} completeness={:.2} confidence={:.2}",
            plan.provider, plan.kind, completeness, confidence
        );
        self.history.record(metrics.clone());
        metrics
    }

    /// Record a failed attempt so rankings reflect availability.
    pub fn record_failure(
        &self,
        provider: ProviderKind,
        kind: AnalysisKind,
        processing_time_ms: u64,
    ) {
        debug!("recording failed attempt: provider={} kind={}", provider, kind);
        self.history.record(QualityMetrics {
            provider,
            kind,
            completeness: 0.0,
            confidence: 0.0,
            processing_time_ms,
            timestamp: Utc::now(),
        });
    }

    /// Provider with the highest weighted quality for a kind.
    pub fn get_best_provider_for_analysis(
        &self,
        kind: AnalysisKind,
    ) -> Result<ProviderKind, NoHistoryError> {
        self.history.best_provider(kind)
    }
}

/// Build the document context line for a prompt. FullAnalysis requires
/// file name and MIME type; other kinds fall back to the template
/// default when metadata is absent.
fn document_info(
    metadata: &DocumentMetadata,
    kind: AnalysisKind,
) -> Result<Option<String>, TemplateError> {
    let required = kind == AnalysisKind::FullAnalysis;

    let (file_name, mime_type) = match (&metadata.file_name, &metadata.mime_type) {
        (Some(name), Some(mime)) => (name.as_str(), mime.as_str()),
        (None, _) if required => return Err(TemplateError::MissingVariable("file_name".into())),
        (_, None) if required => return Err(TemplateError::MissingVariable("mime_type".into())),
        _ => return Ok(None),
    };

    Ok(Some(format!(
        "File: {} ({}, {} bytes)\n\n",
        file_name,
        mime_type,
        metadata.size_bytes.unwrap_or(0)
    )))
}

/// Truncate content to a character budget without cutting mid-word,
/// marking the cut so the model knows text is missing.
fn truncate_at_word_boundary(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        return content.to_string();
    }

    let mut cut: String = content.chars().take(limit).collect();
    if let Some(last_space) = cut.rfind(' ') {
        // Only back off to the space when it is near the end.
        if last_space > limit * 9 / 10 {
            cut.truncate(last_space);
        }
    }
    cut.push_str("... [content truncated]");
    cut
}

/// Pull a JSON object out of a model response, tolerating markdown
/// fences and surrounding prose.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Output fields a well-formed response must carry, per kind.
fn expected_fields(kind: AnalysisKind) -> &'static [&'static str] {
    match kind {
        AnalysisKind::FullAnalysis => &[
            "summary",
            "keywords",
            "entities",
            "main_topic",
            "document_type",
            "purpose",
        ],
        AnalysisKind::Summary => &[],
        AnalysisKind::Classification => &["document_type", "main_topic"],
        AnalysisKind::EntityExtraction => &["entities"],
        AnalysisKind::Intent => &["intent", "target_audience"],
        AnalysisKind::RelationExtraction => &["relations", "contexts"],
    }
}

/// Compute (completeness, confidence) for a response.
fn score_response(kind: AnalysisKind, response_text: &str) -> (f32, f32) {
    // Summaries are prose; anything non-trivial counts, with confidence
    // scaled by length up to a modest cap.
    if kind == AnalysisKind::Summary {
        let trimmed = response_text.trim();
        if trimmed.is_empty() {
            return (0.0, 0.0);
        }
        let confidence = (trimmed.len() as f32 / 200.0).min(0.9);
        return (1.0, confidence);
    }

    let Some(parsed) = extract_json(response_text) else {
        return (0.0, 0.0);
    };
    let Some(object) = parsed.as_object() else {
        return (0.0, 0.0);
    };

    let expected = expected_fields(kind);
    let present = expected.iter().filter(|f| object.contains_key(**f)).count();
    let completeness = if expected.is_empty() {
        1.0
    } else {
        present as f32 / expected.len() as f32
    };

    let mut structure_quality = 1.0_f32;
    for field in ["keywords", "entities", "relations", "contexts"] {
        if let Some(value) = object.get(field) {
            if !value.is_array() {
                structure_quality *= 0.8;
            }
        }
    }

    let mut confidence = completeness * structure_quality * 0.9;
    if object
        .get("keywords")
        .and_then(|v| v.as_array())
        .is_some_and(|a| a.len() >= 5)
    {
        confidence += 0.05;
    }
    if object
        .get("entities")
        .and_then(|v| v.as_array())
        .is_some_and(|a| a.len() >= 3)
    {
        confidence += 0.05;
    }

    (completeness, confidence.min(1.0))
}
