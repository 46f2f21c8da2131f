//! End-to-end behavior of the fallback orchestrator with scripted
//! providers.

mod common;

use std::sync::Arc;

use documind::cancel::CancelFlag;
use documind::error::{AnalysisError, ProviderError};
use documind::models::{AnalysisKind, DocumentMetadata, QualityMetrics};
use documind::providers::{ProviderClient, ProviderKind};

use common::{fast_config, good_full_analysis, orchestrator_over, MockProvider};

fn metadata() -> DocumentMetadata {
    DocumentMetadata::new("report.pdf", "application/pdf", 1024)
}

#[tokio::test]
async fn transient_failures_retry_then_fall_back() {
    // DeepSeek fails every attempt; OpenAI answers on the first try.
    let deepseek = MockProvider::scripted(
        ProviderKind::DeepSeek,
        vec![
            Err(ProviderError::Transient("503".to_string())),
            Err(ProviderError::Transient("503".to_string())),
            Err(ProviderError::Transient("503".to_string())),
        ],
    );
    let openai = MockProvider::steady(ProviderKind::OpenAi, &good_full_analysis());

    let orchestrator = orchestrator_over(
        vec![deepseek.clone() as Arc<dyn ProviderClient>, openai.clone()],
        fast_config(),
    );

    let result = orchestrator
        .analyze(
            "the budget text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            Some(ProviderKind::DeepSeek),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.provider, Some(ProviderKind::OpenAi));
    assert!(!result.degraded);
    // Initial attempt plus max_retries.
    assert_eq!(deepseek.calls(), 3);
    assert_eq!(openai.calls(), 1);
}

#[tokio::test]
async fn quota_exhaustion_skips_to_next_provider_without_retrying() {
    let deepseek = MockProvider::scripted(
        ProviderKind::DeepSeek,
        vec![Err(ProviderError::QuotaExceeded {
            retry_after_secs: Some(3600),
        })],
    );
    let openai = MockProvider::steady(ProviderKind::OpenAi, &good_full_analysis());

    let orchestrator = orchestrator_over(
        vec![deepseek.clone() as Arc<dyn ProviderClient>, openai.clone()],
        fast_config(),
    );

    let result = orchestrator
        .analyze(
            "text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            Some(ProviderKind::DeepSeek),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.provider, Some(ProviderKind::OpenAi));
    assert_eq!(deepseek.calls(), 1);
}

#[tokio::test]
async fn all_providers_failing_yields_degraded_result() {
    let deepseek = MockProvider::scripted(ProviderKind::DeepSeek, vec![]);
    let local = MockProvider::scripted(ProviderKind::Local, vec![]);

    let orchestrator = orchestrator_over(vec![deepseek as Arc<dyn ProviderClient>, local], fast_config());

    let result = orchestrator
        .analyze(
            "The treasury department published spending figures for review",
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert!(result.degraded);
    assert!(result.provider.is_none());
    assert!(!result.summary.is_empty());
    assert!(result.keywords.contains(&"treasury".to_string()));
}

#[tokio::test]
async fn low_quality_responses_keep_best_attempt() {
    // Both providers answer, but below the acceptance threshold. The
    // better-scoring answer wins over the degraded fallback.
    let sparse = r#"{"summary": "s"}"#;
    let richer = r#"{"summary": "s", "keywords": ["a"], "entities": [], "main_topic": "t"}"#;
    let deepseek = MockProvider::steady(ProviderKind::DeepSeek, sparse);
    let openai = MockProvider::steady(ProviderKind::OpenAi, richer);

    let orchestrator = orchestrator_over(
        vec![deepseek as Arc<dyn ProviderClient>, openai],
        fast_config(),
    );

    let result = orchestrator
        .analyze(
            "text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert!(!result.degraded);
    assert_eq!(result.provider, Some(ProviderKind::OpenAi));
    assert_eq!(result.main_topic.as_deref(), Some("t"));
}

#[tokio::test]
async fn history_ranking_orders_providers() {
    let deepseek = MockProvider::steady(ProviderKind::DeepSeek, &good_full_analysis());
    let openai = MockProvider::steady(ProviderKind::OpenAi, &good_full_analysis());

    let orchestrator = orchestrator_over(
        vec![deepseek.clone() as Arc<dyn ProviderClient>, openai.clone()],
        fast_config(),
    );

    // Seed history: OpenAI consistently strong, DeepSeek consistently
    // weak for this kind.
    let history = orchestrator.optimizer().history();
    for _ in 0..5 {
        history.record(QualityMetrics {
            provider: ProviderKind::OpenAi,
            kind: AnalysisKind::FullAnalysis,
            completeness: 0.9,
            confidence: 0.9,
            processing_time_ms: 10,
            timestamp: chrono::Utc::now(),
        });
        history.record(QualityMetrics {
            provider: ProviderKind::DeepSeek,
            kind: AnalysisKind::FullAnalysis,
            completeness: 0.3,
            confidence: 0.3,
            processing_time_ms: 10,
            timestamp: chrono::Utc::now(),
        });
    }

    let result = orchestrator
        .analyze(
            "text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.provider, Some(ProviderKind::OpenAi));
    assert_eq!(deepseek.calls(), 0);
}

#[tokio::test]
async fn provider_hint_overrides_ranking() {
    let deepseek = MockProvider::steady(ProviderKind::DeepSeek, &good_full_analysis());
    let openai = MockProvider::steady(ProviderKind::OpenAi, &good_full_analysis());

    let orchestrator = orchestrator_over(
        vec![deepseek.clone() as Arc<dyn ProviderClient>, openai.clone()],
        fast_config(),
    );

    let result = orchestrator
        .analyze(
            "text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            Some(ProviderKind::OpenAi),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.provider, Some(ProviderKind::OpenAi));
    assert_eq!(deepseek.calls(), 0);
}

#[tokio::test]
async fn cancellation_stops_before_any_attempt() {
    let deepseek = MockProvider::steady(ProviderKind::DeepSeek, &good_full_analysis());

    let orchestrator = orchestrator_over(vec![deepseek.clone() as Arc<dyn ProviderClient>], fast_config());

    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = orchestrator
        .analyze(
            "text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Cancelled));
    assert_eq!(deepseek.calls(), 0);
}

#[tokio::test]
async fn empty_content_is_rejected() {
    let orchestrator = orchestrator_over(Vec::new(), fast_config());

    let err = orchestrator
        .analyze(
            "   ",
            &metadata(),
            AnalysisKind::Summary,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::InvalidRequest(_)));
}

#[tokio::test]
async fn failures_are_recorded_in_quality_history() {
    let deepseek = MockProvider::scripted(
        ProviderKind::DeepSeek,
        vec![Err(ProviderError::InvalidResponse("garbage".to_string()))],
    );
    let openai = MockProvider::steady(ProviderKind::OpenAi, &good_full_analysis());

    let orchestrator = orchestrator_over(
        vec![deepseek as Arc<dyn ProviderClient>, openai],
        fast_config(),
    );

    orchestrator
        .analyze(
            "text",
            &metadata(),
            AnalysisKind::FullAnalysis,
            Some(ProviderKind::DeepSeek),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    let history = orchestrator.optimizer().history();
    assert_eq!(
        history.ewma_score(ProviderKind::DeepSeek, AnalysisKind::FullAnalysis),
        Some(0.0)
    );
}
