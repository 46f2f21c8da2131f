//! Chunked processing of large documents under memory pressure.

mod common;

use std::sync::Arc;

use documind::batch::BatchProcessor;
use documind::cancel::CancelFlag;
use documind::config::{AnalysisConfig, BatchConfig};
use documind::error::AnalysisError;
use documind::memory::MemoryMonitor;
use documind::models::{AnalysisKind, DocumentMetadata};
use documind::providers::{ProviderClient, ProviderKind};

use common::{fast_config, good_full_analysis, orchestrator_over, GrowingSampler, MockProvider,
    ScriptedSampler};

fn metadata() -> DocumentMetadata {
    DocumentMetadata::new("large.txt", "text/plain", 4096)
}

fn batch_config(max: usize, min: usize, overlap: usize, threshold: u64) -> BatchConfig {
    BatchConfig {
        max_batch_size: max,
        min_batch_size: min,
        overlap,
        memory_growth_threshold_bytes: threshold,
    }
}

fn processor(
    provider: Arc<MockProvider>,
    batch: BatchConfig,
    monitor: MemoryMonitor,
) -> BatchProcessor {
    let mut config: AnalysisConfig = fast_config();
    config.batch = batch.clone();
    let orchestrator = Arc::new(orchestrator_over(
        vec![provider as Arc<dyn ProviderClient>],
        config,
    ));
    BatchProcessor::with_monitor(orchestrator, batch, monitor)
}

#[tokio::test]
async fn small_documents_are_a_single_provider_call() {
    let provider = MockProvider::steady(ProviderKind::Local, &good_full_analysis());
    let batch = batch_config(5000, 1000, 500, u64::MAX);
    let processor = processor(provider.clone(), batch, MemoryMonitor::new());

    let result = processor
        .process(
            "a short document",
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(result.provider, Some(ProviderKind::Local));
}

#[tokio::test]
async fn large_documents_are_chunked_and_merged() {
    let provider = MockProvider::steady(ProviderKind::Local, &good_full_analysis());
    let batch = batch_config(100, 50, 20, u64::MAX);
    let processor = processor(provider.clone(), batch, MemoryMonitor::new());

    let content = "x".repeat(250);
    let result = processor
        .process(
            &content,
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert!(provider.calls() >= 3);
    assert!(!result.degraded);
    // Identical chunk responses merge into one deduplicated set.
    assert_eq!(result.entities.len(), 3);
    assert_eq!(result.keywords.len(), 5);
}

#[tokio::test]
async fn overlap_larger_than_chunk_size_still_terminates() {
    let provider = MockProvider::steady(ProviderKind::Local, &good_full_analysis());
    // A misconfigured overlap used to pin the cursor in place.
    let batch = batch_config(50, 20, 60, u64::MAX);
    let processor = processor(provider.clone(), batch, MemoryMonitor::new());

    let content = "x".repeat(200);
    let result = processor
        .process(
            &content,
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert!(!result.degraded);
    assert!(provider.calls() >= 4);
    assert!(provider.calls() <= 200);
}

#[tokio::test]
async fn memory_growth_shrinks_subsequent_chunks() {
    let provider = MockProvider::steady(ProviderKind::Local, &good_full_analysis());
    // First chunk observes a 1000-byte jump, later chunks are flat.
    let sampler = ScriptedSampler::new(vec![0, 1000]);
    let batch = batch_config(200, 50, 20, 100);
    let processor = processor(
        provider.clone(),
        batch,
        MemoryMonitor::with_sampler(sampler),
    );

    let content = "x".repeat(400);
    processor
        .process(
            &content,
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    // Without adaptation: chunks of 200 with overlap 20 cover 400 chars
    // in 3 calls. Halving to 100 after the first chunk forces more.
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn sustained_growth_at_minimum_size_aborts() {
    let provider = MockProvider::steady(ProviderKind::Local, &good_full_analysis());
    // Every reading jumps 10 MiB, so each chunk breaches the threshold
    // and the chunk size can never shrink below its starting minimum.
    let sampler = GrowingSampler::new(10 * 1024 * 1024);
    let batch = batch_config(100, 100, 20, 1024);
    let processor = processor(
        provider.clone(),
        batch,
        MemoryMonitor::with_sampler(sampler),
    );

    let content = "x".repeat(2000);
    let err = processor
        .process(
            &content,
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::ResourceExhausted(_)));
    // Three strikes before giving up.
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn cancellation_stops_at_chunk_boundary() {
    let provider = MockProvider::steady(ProviderKind::Local, &good_full_analysis());
    let batch = batch_config(100, 50, 20, u64::MAX);
    let processor = processor(provider.clone(), batch, MemoryMonitor::new());

    let cancel = CancelFlag::new();
    cancel.cancel();

    let content = "x".repeat(400);
    let err = processor
        .process(
            &content,
            &metadata(),
            AnalysisKind::FullAnalysis,
            None,
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Cancelled));
    assert_eq!(provider.calls(), 0);
}
