//! Memory-adaptive document chunking.
//!
//! Large documents are cut into overlapping chunks and analyzed
//! sequentially. Chunk boundaries snap to natural breaks (paragraph,
//! then sentence, then whitespace) and the chunk size shrinks when
//! process memory grows too fast between chunks. Chunks are cut
//! lazily so a mid-run shrink applies to the remaining text.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::BatchConfig;
use crate::error::AnalysisError;
use crate::memory::MemoryMonitor;
use crate::models::{
    AnalysisKind, AnalysisResult, Chunk, DocumentMetadata, Entity, EntityCluster, SemanticRelation,
};
use crate::orchestrator::FallbackOrchestrator;
use crate::providers::ProviderKind;

const MERGED_KEYWORD_CAP: usize = 15;
const EXHAUSTION_STRIKES: u32 = 3;

pub struct BatchProcessor {
    orchestrator: Arc<FallbackOrchestrator>,
    monitor: MemoryMonitor,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>, config: BatchConfig) -> Self {
        Self::with_monitor(orchestrator, config, MemoryMonitor::new())
    }

    pub fn with_monitor(
        orchestrator: Arc<FallbackOrchestrator>,
        config: BatchConfig,
        monitor: MemoryMonitor,
    ) -> Self {
        Self {
            orchestrator,
            monitor,
            config,
        }
    }

    /// Analyze a document, chunking it when it exceeds the batch size.
    ///
    /// Small documents go straight through as a single provider call.
    pub async fn process(
        &self,
        content: &str,
        metadata: &DocumentMetadata,
        kind: AnalysisKind,
        provider_hint: Option<ProviderKind>,
        cancel: &CancelFlag,
    ) -> Result<AnalysisResult, AnalysisError> {
        if content.chars().count() <= self.config.max_batch_size {
            return self
                .orchestrator
                .analyze(content, metadata, kind, provider_hint, cancel)
                .await;
        }

        let mut cutter = ChunkCutter::new(content, &self.config);
        let mut results: Vec<AnalysisResult> = Vec::new();
        let mut strikes = 0u32;

        while let Some((chunk, text)) = cutter.next_chunk() {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }

            debug!(
                "processing chunk {} ({}..{}, overlap {})",
                chunk.index, chunk.start, chunk.end, chunk.overlap_with_previous
            );

            let before = self.monitor.snapshot();
            let result = self
                .orchestrator
                .analyze(text, metadata, kind, provider_hint, cancel)
                .await?;
            results.push(result);

            let sample = self.monitor.measure_since(before);
            if sample.growth_bytes() > self.config.memory_growth_threshold_bytes {
                if cutter.shrink(self.config.min_batch_size) {
                    strikes = 0;
                    warn!(
                        "memory grew {} bytes during chunk {}, shrinking chunk size to {}",
                        sample.growth_bytes(),
                        chunk.index,
                        cutter.chunk_size()
                    );
                } else {
                    strikes += 1;
                    warn!(
                        "memory grew {} bytes at minimum chunk size ({}/{})",
                        sample.growth_bytes(),
                        strikes,
                        EXHAUSTION_STRIKES
                    );
                    if strikes >= EXHAUSTION_STRIKES {
                        return Err(AnalysisError::ResourceExhausted(format!(
                            "memory growth exceeded {} bytes for {} consecutive chunks at minimum chunk size",
                            self.config.memory_growth_threshold_bytes, EXHAUSTION_STRIKES
                        )));
                    }
                }
            } else {
                strikes = 0;
            }
        }

        info!("merging {} chunk results", results.len());
        Ok(merge_results(results))
    }
}

/// Lazily cuts chunks from the remaining text so the chunk size can
/// shrink between cuts. The size only ever decreases.
struct ChunkCutter<'a> {
    chars: Vec<char>,
    content: &'a str,
    cursor: usize,
    chunk_size: usize,
    overlap: usize,
    index: usize,
}

impl<'a> ChunkCutter<'a> {
    fn new(content: &'a str, config: &BatchConfig) -> Self {
        Self {
            chars: content.chars().collect(),
            content,
            cursor: 0,
            chunk_size: config.max_batch_size.max(1),
            overlap: config.overlap,
            index: 0,
        }
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Halve the chunk size, clamped at the floor. Returns false when
    /// already at the floor.
    fn shrink(&mut self, floor: usize) -> bool {
        let next = (self.chunk_size / 2).max(floor);
        if next < self.chunk_size {
            self.chunk_size = next;
            true
        } else {
            false
        }
    }

    /// Cut the next chunk, snapping the end to a natural boundary. The
    /// cursor always advances: the effective overlap is clamped below
    /// the current chunk size, and a snapped boundary that falls inside
    /// the overlap region is discarded in favor of the hard cut.
    fn next_chunk(&mut self) -> Option<(Chunk, &'a str)> {
        if self.cursor >= self.chars.len() {
            return None;
        }

        let overlap = if self.index == 0 {
            0
        } else {
            self.overlap.min(self.chunk_size - 1)
        };
        let start = self.cursor.saturating_sub(overlap);
        let tentative_end = (start + self.chunk_size).min(self.chars.len());
        let mut end = if tentative_end == self.chars.len() {
            tentative_end
        } else {
            snap_boundary(&self.chars, start, tentative_end)
        };
        if end <= self.cursor {
            end = tentative_end;
        }
        debug_assert!(end > self.cursor);

        let byte_start = char_to_byte(self.content, start);
        let byte_end = char_to_byte(self.content, end);
        let chunk = Chunk {
            index: self.index,
            start,
            end,
            overlap_with_previous: self.cursor.saturating_sub(start),
        };

        self.index += 1;
        self.cursor = end;
        Some((chunk, &self.content[byte_start..byte_end]))
    }
}

/// Find a cut point at or before `end`, preferring a paragraph break,
/// then a sentence end, then any whitespace. Falls back to the hard
/// cut when no boundary lands in the second half of the chunk.
fn snap_boundary(chars: &[char], start: usize, end: usize) -> usize {
    let floor = start + (end - start) / 2;

    if let Some(pos) = rfind_seq(chars, floor, end, &['\n', '\n']) {
        return pos;
    }
    for punct in ['.', '!', '?'] {
        if let Some(pos) = rfind_seq(chars, floor, end, &[punct, ' ']) {
            return pos;
        }
    }
    for pos in (floor..end).rev() {
        if chars[pos].is_whitespace() {
            return pos + 1;
        }
    }
    end
}

/// Rightmost occurrence of a two-char sequence in [floor, end),
/// returning the index just past it.
fn rfind_seq(chars: &[char], floor: usize, end: usize, seq: &[char; 2]) -> Option<usize> {
    if end < 2 {
        return None;
    }
    for pos in (floor..end - 1).rev() {
        if chars[pos] == seq[0] && chars[pos + 1] == seq[1] {
            return Some(pos + 2);
        }
    }
    None
}

fn char_to_byte(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map_or(s.len(), |(byte, _)| byte)
}

/// Merge per-chunk results into one document-level result.
pub(crate) fn merge_results(results: Vec<AnalysisResult>) -> AnalysisResult {
    let mut merged = AnalysisResult::default();
    if results.is_empty() {
        merged.degraded = true;
        return merged;
    }

    merged.degraded = results.iter().all(|r| r.degraded);
    merged.provider = results.iter().find_map(|r| r.provider);
    merged.main_topic = results.iter().find_map(|r| r.main_topic.clone());
    merged.document_type = results.iter().find_map(|r| r.document_type.clone());
    merged.purpose = results.iter().find_map(|r| r.purpose.clone());
    merged.intent = results.iter().find_map(|r| r.intent.clone());
    merged.quality = results
        .iter()
        .filter_map(|r| r.quality.clone())
        .max_by(|a, b| a.score().total_cmp(&b.score()));

    let mut seen_keywords = HashSet::new();
    let mut entities: HashMap<String, Entity> = HashMap::new();

    for result in results {
        merged.summary = join_summaries(&merged.summary, &result.summary);

        for keyword in result.keywords {
            let key = keyword.to_lowercase();
            if merged.keywords.len() < MERGED_KEYWORD_CAP && seen_keywords.insert(key) {
                merged.keywords.push(keyword);
            }
        }

        for entity in result.entities {
            entities
                .entry(entity.merge_key())
                .and_modify(|existing| {
                    if entity.relevance > existing.relevance {
                        existing.relevance = entity.relevance;
                    }
                })
                .or_insert(entity);
        }

        merged.relations.extend(result.relations);
        merged.topics.extend(result.topics);
        merged.clusters.extend(result.clusters);
    }

    merged.entities = entities.into_values().collect();
    merged
        .entities
        .sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    merged
}

/// Append a chunk summary, dropping text the previous summary already
/// ends with. Only exact suffix/prefix matches are deduplicated.
fn join_summaries(acc: &str, next: &str) -> String {
    let next = next.trim();
    if next.is_empty() {
        return acc.to_string();
    }
    if acc.is_empty() {
        return next.to_string();
    }

    let max_overlap = acc.len().min(next.len());
    let mut overlap = 0;
    for len in (1..=max_overlap).rev() {
        if acc.is_char_boundary(acc.len() - len)
            && next.is_char_boundary(len)
            && acc.ends_with(&next[..len])
        {
            overlap = len;
            break;
        }
    }

    let remainder = next[overlap..].trim_start();
    if remainder.is_empty() {
        return acc.to_string();
    }
    format!("{} {}", acc, remainder)
}

/// Group entities into undirected connected components over the
/// relation graph. Entities with no relations form singleton clusters.
pub fn cluster_related_entities(
    entities: &[Entity],
    relations: &[SemanticRelation],
) -> Vec<EntityCluster> {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for entity in entities {
        adjacency.entry(entity.normalized()).or_default();
    }
    for relation in relations {
        let source = relation.source.trim().to_lowercase();
        let target = relation.target.trim().to_lowercase();
        adjacency.entry(source.clone()).or_default().push(target.clone());
        adjacency.entry(target).or_default().push(source);
    }

    // Iterate entities in input order so cluster ids are stable.
    let mut visited: HashSet<String> = HashSet::new();
    let mut clusters = Vec::new();

    for entity in entities {
        let root = entity.normalized();
        if visited.contains(&root) {
            continue;
        }

        let mut members = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            if let Some(neighbors) = adjacency.get(&node) {
                stack.extend(neighbors.iter().cloned());
            }
            members.push(node);
        }

        members.sort();
        clusters.push(EntityCluster {
            id: clusters.len(),
            entities: members,
        });
    }

    clusters
}
