//! Semantic enrichment: intent, entity relations, contextual topics.
//!
//! Builds focused excerpts around entity mentions instead of resending
//! whole documents, batching entities so prompts stay inside provider
//! content limits. Enrichment is best-effort: a failed pass degrades to
//! an empty or unknown result instead of failing the analysis.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::config::SemanticConfig;
use crate::error::AnalysisError;
use crate::models::{
    AnalysisKind, ContextualTopic, DocumentIntent, DocumentMetadata, Entity, SemanticRelation,
};
use crate::orchestrator::FallbackOrchestrator;

pub struct SemanticAnalyzer {
    orchestrator: Arc<FallbackOrchestrator>,
    config: SemanticConfig,
}

impl SemanticAnalyzer {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>, config: SemanticConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Classify the document's intent. Provider failures degrade to an
    /// unknown intent rather than erroring, since intent is enrichment.
    pub async fn analyze_document_intent(
        &self,
        content: &str,
        metadata: &DocumentMetadata,
        cancel: &CancelFlag,
    ) -> Result<DocumentIntent, AnalysisError> {
        match self
            .orchestrator
            .analyze(content, metadata, AnalysisKind::Intent, None, cancel)
            .await
        {
            Ok(result) => Ok(result.intent.unwrap_or_else(DocumentIntent::unknown)),
            Err(AnalysisError::Cancelled) => Err(AnalysisError::Cancelled),
            Err(err) => {
                warn!("intent analysis failed, reporting unknown intent: {}", err);
                Ok(DocumentIntent::unknown())
            }
        }
    }

    /// Extract relations between the given entities, batching them and
    /// prompting over context excerpts around their mentions. Relations
    /// below the confidence threshold are dropped.
    pub async fn extract_semantic_relations(
        &self,
        content: &str,
        entities: &[Entity],
        metadata: &DocumentMetadata,
        cancel: &CancelFlag,
    ) -> Result<Vec<SemanticRelation>, AnalysisError> {
        let mut relations = Vec::new();

        for batch in entities.chunks(self.config.max_entities_per_batch.max(1)) {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            let excerpt = self.context_excerpt(content, batch);
            if excerpt.trim().is_empty() {
                continue;
            }

            match self
                .orchestrator
                .analyze(
                    &excerpt,
                    metadata,
                    AnalysisKind::RelationExtraction,
                    None,
                    cancel,
                )
                .await
            {
                Ok(result) => {
                    let before = relations.len();
                    relations.extend(
                        result
                            .relations
                            .into_iter()
                            .filter(|r| r.confidence >= self.config.relation_threshold),
                    );
                    debug!(
                        "relation batch of {} entities yielded {} relations",
                        batch.len(),
                        relations.len() - before
                    );
                }
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(err) => {
                    warn!("relation extraction batch failed, skipping: {}", err);
                }
            }
        }

        Ok(relations)
    }

    /// Extract contextual topic descriptions for the given entities.
    /// Uses the same excerpt batching as relation extraction.
    pub async fn extract_contextual_topics(
        &self,
        content: &str,
        entities: &[Entity],
        metadata: &DocumentMetadata,
        cancel: &CancelFlag,
    ) -> Result<Vec<ContextualTopic>, AnalysisError> {
        let mut topics = Vec::new();

        for batch in entities.chunks(self.config.max_entities_per_batch.max(1)) {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            let excerpt = self.context_excerpt(content, batch);
            if excerpt.trim().is_empty() {
                continue;
            }

            match self
                .orchestrator
                .analyze(
                    &excerpt,
                    metadata,
                    AnalysisKind::RelationExtraction,
                    None,
                    cancel,
                )
                .await
            {
                Ok(result) => {
                    topics.extend(
                        result
                            .topics
                            .into_iter()
                            .filter(|t| !t.entity.trim().is_empty()),
                    );
                }
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(err) => {
                    warn!("contextual topic batch failed, skipping: {}", err);
                }
            }
        }

        Ok(topics)
    }

    /// Join context windows around the first mention of each entity in
    /// the batch. Windows that overlap are merged by the sort order;
    /// entities never mentioned verbatim contribute nothing.
    fn context_excerpt(&self, content: &str, batch: &[Entity]) -> String {
        let lowered = content.to_lowercase();
        let half_window = self.config.context_window_size / 2;

        let mut windows: Vec<(usize, usize)> = Vec::new();
        for entity in batch {
            let needle = entity.normalized();
            if needle.is_empty() {
                continue;
            }
            if let Some(pos) = lowered.find(&needle) {
                let start = floor_char_boundary(content, pos.saturating_sub(half_window));
                let end = ceil_char_boundary(
                    content,
                    (pos + needle.len() + half_window).min(content.len()),
                );
                windows.push((start, end));
            }
        }

        windows.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (start, end) in windows {
            match merged.last_mut() {
                Some((_, last_end)) if start <= *last_end => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }

        merged
            .iter()
            .map(|&(start, end)| content[start..end].trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
