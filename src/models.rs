//! Core data model for document analysis.
//!
//! `AnalysisRequest` comes in from the caller (content already extracted
//! by an external file processor), `AnalysisResult` goes out to an
//! external repository layer. Everything in between (`PromptPlan`,
//! `ProviderResponse`, `Chunk`) is transient and scoped to one call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderKind;

/// Kinds of analysis the pipeline can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Summary,
    Classification,
    EntityExtraction,
    FullAnalysis,
    Intent,
    RelationExtraction,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::Classification => "classification",
            AnalysisKind::EntityExtraction => "entity_extraction",
            AnalysisKind::FullAnalysis => "full_analysis",
            AnalysisKind::Intent => "intent",
            AnalysisKind::RelationExtraction => "relation_extraction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "summary" => Some(AnalysisKind::Summary),
            "classification" => Some(AnalysisKind::Classification),
            "entity_extraction" | "entities" => Some(AnalysisKind::EntityExtraction),
            "full_analysis" | "full" => Some(AnalysisKind::FullAnalysis),
            "intent" => Some(AnalysisKind::Intent),
            "relation_extraction" | "relations" => Some(AnalysisKind::RelationExtraction),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata about the source document. All fields are optional; prompt
/// templates that require one fail with `TemplateError` when it is
/// absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
}

impl DocumentMetadata {
    pub fn new(file_name: &str, mime_type: &str, size_bytes: u64) -> Self {
        Self {
            file_name: Some(file_name.to_string()),
            mime_type: Some(mime_type.to_string()),
            size_bytes: Some(size_bytes),
        }
    }
}

/// A request to analyze one document. Immutable once created.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub kind: AnalysisKind,
    /// Preferred provider, tried first when available.
    pub provider_hint: Option<ProviderKind>,
}

impl AnalysisRequest {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata, kind: AnalysisKind) -> Self {
        Self {
            content: content.into(),
            metadata,
            kind,
            provider_hint: None,
        }
    }

    pub fn with_provider_hint(mut self, provider: ProviderKind) -> Self {
        self.provider_hint = Some(provider);
        self
    }
}

/// A rendered, provider-tuned prompt for a single attempt.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub kind: AnalysisKind,
    pub provider: ProviderKind,
    pub text: String,
    pub template_version: u32,
}

/// Raw response from one provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency_ms: u64,
    pub provider: ProviderKind,
}

/// Quality scores for one evaluated attempt. Appended to the bounded
/// history keyed by (provider, kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub provider: ProviderKind,
    pub kind: AnalysisKind,
    /// Fraction of expected output fields present (0-1).
    pub completeness: f32,
    /// Structural confidence heuristic (0-1).
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl QualityMetrics {
    /// Scalar quality used for provider ranking.
    pub fn score(&self) -> f32 {
        (self.completeness + self.confidence) / 2.0
    }
}

/// An entity detected in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Entity category (PERSON, ORG, LOCATION, DATE, OTHER).
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub relevance: f32,
}

impl Entity {
    pub fn new(kind: &str, value: &str, relevance: f32) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.to_string(),
            relevance,
        }
    }

    /// Identity used for de-duplication and clustering.
    pub fn normalized(&self) -> String {
        self.value.trim().to_lowercase()
    }

    /// Merge key combining category and normalized value.
    pub fn merge_key(&self) -> String {
        format!("{}:{}", self.kind.trim().to_uppercase(), self.normalized())
    }
}

/// One bounded slice of document content. Produced fresh per batch
/// invocation; byte offsets are always char boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub overlap_with_previous: usize,
}

/// Detected intent or purpose of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIntent {
    pub primary_intent: String,
    pub confidence: f32,
    #[serde(default)]
    pub secondary_intents: Vec<(String, f32)>,
    pub target_audience: String,
    #[serde(default)]
    pub call_to_action: Option<String>,
}

impl DocumentIntent {
    /// Placeholder returned when intent analysis fails soft.
    pub fn unknown() -> Self {
        Self {
            primary_intent: "unknown".to_string(),
            confidence: 0.0,
            secondary_intents: Vec::new(),
            target_audience: "general".to_string(),
            call_to_action: None,
        }
    }
}

/// A directed semantic relation between two entities. Cycles are valid
/// and stored independently; no de-duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticRelation {
    pub source: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub target: String,
    pub confidence: f32,
}

/// Contextual description of a topic or concept in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualTopic {
    pub entity: String,
    #[serde(rename = "type")]
    pub context_type: String,
    pub description: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub importance: f32,
}

/// A connected component of entities under the relation graph. Ids are
/// assigned in entity discovery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCluster {
    pub id: usize,
    pub entities: Vec<String>,
}

/// Final merged analysis artifact handed to the persistence
/// collaborator. Shared read-only once cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub keywords: Vec<String>,
    pub entities: Vec<Entity>,
    pub main_topic: Option<String>,
    pub document_type: Option<String>,
    pub purpose: Option<String>,
    pub intent: Option<DocumentIntent>,
    pub relations: Vec<SemanticRelation>,
    pub topics: Vec<ContextualTopic>,
    pub clusters: Vec<EntityCluster>,
    /// Provider that produced the accepted attempt, if any.
    pub provider: Option<ProviderKind>,
    /// True when no model call succeeded and the result came from the
    /// local heuristic analysis. Callers must check this flag.
    pub degraded: bool,
    pub quality: Option<QualityMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            AnalysisKind::Summary,
            AnalysisKind::Classification,
            AnalysisKind::EntityExtraction,
            AnalysisKind::FullAnalysis,
            AnalysisKind::Intent,
            AnalysisKind::RelationExtraction,
        ] {
            assert_eq!(AnalysisKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(AnalysisKind::from_str("bogus"), None);
    }

    #[test]
    fn test_entity_merge_key() {
        let a = Entity::new("PERSON", "  Ada Lovelace ", 0.9);
        let b = Entity::new("person", "ada lovelace", 0.4);
        assert_eq!(a.merge_key(), b.merge_key());
    }
}
