use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::doc_processor::Chunk;
use crate::embedding::{check_count, cosine_similarity, Embedder, EmbeddingProvider};
use crate::error::{AppError, Result};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Immutable in-memory nearest-neighbour index over one document's chunks.
///
/// The embedder used to build the index is kept so that queries are embedded
/// by the same provider and model.
pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("chunks", &self.entries.len())
            .field("provider", &self.embedder.provider())
            .finish()
    }
}

impl VectorIndex {
    /// Embed every chunk and build the index. Nothing is kept on failure.
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(AppError::EmptyIndex);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;
        check_count(embedder.provider(), chunks.len(), embeddings.len())?;

        info!(
            "Built vector index over {} chunks with {} embeddings",
            chunks.len(),
            embedder.provider()
        );
        Ok(Self {
            entries: chunks.into_iter().zip(embeddings).collect(),
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.embedder.provider()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }

    /// The `k` chunks most similar to `query`, nearest first. Equal scores keep
    /// document order. `k` of zero is treated as one.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let results = self.search_similar(&query_embedding, k);
        debug!("Retrieved {} of {} chunks", results.len(), self.len());
        Ok(results)
    }

    /// Search for the most relevant chunks given a query embedding
    pub fn search_similar(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, emb))| (i, cosine_similarity(query_embedding, emb)))
            .collect();

        // stable: ties stay in chunk order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k.max(1));

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].0.clone(),
                score,
            })
            .collect()
    }
}
