//! documind: resilient document analysis over interchangeable LLM
//! providers.
//!
//! The crate turns raw document text into structured analysis results
//! (summaries, classifications, entities, intent, semantic relations)
//! while tolerating provider outages. A fallback orchestrator tries
//! providers in quality order with bounded retries, prompts are tuned
//! per provider from a scored response history, large documents are
//! chunked adaptively under memory pressure, and results are cached by
//! content hash. When every provider fails, a local keyword analysis
//! still produces a usable, clearly marked result.
//!
//! [`AnalysisPipeline`] is the main entry point; the individual layers
//! are public for callers that need finer control.

pub mod batch;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod degraded;
pub mod error;
pub mod memory;
pub mod models;
pub mod optimizer;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod semantic;

pub use cancel::CancelFlag;
pub use config::{AnalysisConfig, BatchConfig, ProviderSettings, SemanticConfig};
pub use error::{AnalysisError, ProviderError};
pub use models::{
    AnalysisKind, AnalysisRequest, AnalysisResult, DocumentIntent, DocumentMetadata, Entity,
    EntityCluster, QualityMetrics,
};
pub use orchestrator::FallbackOrchestrator;
pub use pipeline::AnalysisPipeline;
pub use providers::{build_provider_chain, ProviderClient, ProviderKind};
