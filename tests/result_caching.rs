//! Pipeline-level caching and full-analysis enrichment.

mod common;

use std::sync::Arc;

use documind::cancel::CancelFlag;
use documind::models::{AnalysisKind, AnalysisRequest, DocumentMetadata};
use documind::pipeline::AnalysisPipeline;
use documind::providers::{ProviderClient, ProviderKind};

use common::{fast_config, MockProvider};

const PROSE_SUMMARY: &str = "The quarterly report details departmental spending, \
revenue projections, and staffing changes across the fiscal year, with \
particular attention to infrastructure maintenance and procurement reform.";

fn pipeline_over(provider: Arc<MockProvider>) -> AnalysisPipeline {
    AnalysisPipeline::with_providers(
        fast_config(),
        vec![provider as Arc<dyn ProviderClient>],
        None,
    )
}

fn summary_request(content: &str) -> AnalysisRequest {
    AnalysisRequest::new(
        content,
        DocumentMetadata::new("doc.txt", "text/plain", 512),
        AnalysisKind::Summary,
    )
}

#[tokio::test]
async fn concurrent_requests_share_one_computation() {
    let provider = MockProvider::steady(ProviderKind::Local, PROSE_SUMMARY);
    let pipeline = pipeline_over(provider.clone());
    let request = summary_request("the document body");
    let cancel = CancelFlag::new();

    let calls = (0..50).map(|_| pipeline.analyze(&request, &cancel));
    let results = futures::future::join_all(calls).await;

    for result in &results {
        assert_eq!(result.as_ref().unwrap().summary, PROSE_SUMMARY);
    }
    assert_eq!(provider.calls(), 1);
    assert_eq!(pipeline.cached_results(), 1);
}

#[tokio::test]
async fn different_kinds_are_cached_separately() {
    let provider = MockProvider::steady(ProviderKind::Local, PROSE_SUMMARY);
    let pipeline = pipeline_over(provider.clone());
    let cancel = CancelFlag::new();

    let summary = summary_request("the document body");
    let mut classification = summary_request("the document body");
    classification.kind = AnalysisKind::Classification;

    pipeline.analyze(&summary, &cancel).await.unwrap();
    pipeline.analyze(&classification, &cancel).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(pipeline.cached_results(), 2);
}

#[tokio::test]
async fn clearing_the_cache_forces_recomputation() {
    let provider = MockProvider::steady(ProviderKind::Local, PROSE_SUMMARY);
    let pipeline = pipeline_over(provider.clone());
    let request = summary_request("the document body");
    let cancel = CancelFlag::new();

    pipeline.analyze(&request, &cancel).await.unwrap();
    pipeline.clear_cache();
    pipeline.analyze(&request, &cancel).await.unwrap();

    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn degraded_results_are_still_cached() {
    // No providers at all: the pipeline falls back to local keyword
    // analysis and caches that.
    let pipeline = AnalysisPipeline::with_providers(fast_config(), Vec::new(), None);
    let request = summary_request("treasury spending figures published for public review");
    let cancel = CancelFlag::new();

    let first = pipeline.analyze(&request, &cancel).await.unwrap();
    assert!(first.degraded);

    let second = pipeline.analyze(&request, &cancel).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn full_analysis_runs_semantic_enrichment() {
    let full = serde_json::json!({
        "summary": "Treasury and Senate negotiate the 2025 budget.",
        "keywords": ["budget", "treasury", "senate", "fiscal", "negotiation"],
        "entities": [
            {"type": "ORG", "value": "Treasury", "relevance": 0.9},
            {"type": "ORG", "value": "Senate", "relevance": 0.8},
            {"type": "DATE", "value": "2025", "relevance": 0.5}
        ],
        "main_topic": "budget negotiation",
        "document_type": "report",
        "purpose": "inform"
    })
    .to_string();
    let intent = serde_json::json!({
        "intent": {
            "primary": "informative",
            "confidence": 0.85,
            "secondary": [{"type": "persuasive", "confidence": 0.3}]
        },
        "target_audience": "legislators",
        "call_to_action": null
    })
    .to_string();
    let relations = serde_json::json!({
        "relations": [
            {"source": "Treasury", "type": "negotiates with", "target": "Senate", "confidence": 0.9},
            {"source": "Senate", "type": "mentioned near", "target": "2025", "confidence": 0.4}
        ],
        "contexts": [
            {
                "entity": "budget negotiation",
                "type": "PROCESS",
                "description": "annual appropriation process",
                "references": ["the 2025 budget"],
                "importance": 0.8
            }
        ]
    })
    .to_string();

    // Call order: chunk analysis, intent, relations, contextual topics.
    let provider = MockProvider::scripted(
        ProviderKind::Local,
        vec![
            Ok(full),
            Ok(intent),
            Ok(relations.clone()),
            Ok(relations),
        ],
    );
    let pipeline = pipeline_over(provider.clone());

    let request = AnalysisRequest::new(
        "The Treasury and the Senate are negotiating the 2025 budget allocations.",
        DocumentMetadata::new("budget.txt", "text/plain", 2048),
        AnalysisKind::FullAnalysis,
    );
    let result = pipeline.analyze(&request, &CancelFlag::new()).await.unwrap();

    assert_eq!(provider.calls(), 4);

    let intent = result.intent.as_ref().unwrap();
    assert_eq!(intent.primary_intent, "informative");
    assert_eq!(intent.target_audience, "legislators");

    // The low-confidence relation is filtered by the 0.6 threshold.
    assert_eq!(result.relations.len(), 1);
    assert_eq!(result.relations[0].target, "Senate");

    assert_eq!(result.topics.len(), 1);
    assert_eq!(result.topics[0].context_type, "PROCESS");

    // Treasury and Senate cluster through their relation; the date
    // stays a singleton.
    assert_eq!(result.clusters.len(), 2);
    assert_eq!(result.clusters[0].entities, vec!["senate", "treasury"]);
    assert_eq!(result.clusters[1].entities, vec!["2025"]);
}
