use crate::bm25::{Bm25Index, ChunkId};
use crate::embedding::EmbeddingProvider;
use orbit_core::{EmbeddedChunk, OrbitError, OrbitResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// RRF smoothing constant. Fixed by the fusion formula, not configurable.
const RRF_K: f32 = 60.0;

/// Default number of candidates pulled from each of the vector and
/// lexical result lists before fusion (§4.7).
const DEFAULT_FETCH_M: usize = 20;

/// One fused search hit, with enough detail for explainability: which of
/// the two underlying lists it appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Owner (skill name or document id) this chunk belongs to.
    pub owner_id: String,
    /// Position of the chunk within its owner.
    pub chunk_index: u32,
    /// The chunk's raw text.
    pub chunk_text: String,
    /// Fused RRF score, descending.
    pub score: f32,
    /// Whether this chunk appeared in the vector candidate list.
    pub in_vector: bool,
    /// Whether this chunk appeared in the BM25 candidate list.
    pub in_lexical: bool,
}

/// Hybrid search (C7): fuses dense vector retrieval with BM25 lexical
/// retrieval via Reciprocal Rank Fusion.
///
/// `score(d) = Σ 1 / (K + rank_in_list(d))`, summed only over the lists
/// `d` actually appears in — a chunk present in just one list is scored
/// by that single term, never padded with a sentinel rank for the list
/// it's absent from. Ties are broken deterministically by
/// `(owner_id, chunk_index)` so fused results are stable across runs.
pub struct OrbitSearch {
    embedder: Arc<dyn EmbeddingProvider>,
    bm25: RwLock<Bm25Index>,
    chunks: RwLock<HashMap<ChunkId, EmbeddedChunk>>,
}

impl OrbitSearch {
    /// Build an index over the given embedder. The embedder's
    /// [`EmbeddingProvider::dimension`] becomes `D`: every inserted chunk's
    /// embedding must match it exactly.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            bm25: RwLock::new(Bm25Index::new()),
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Embed `chunk_text` and insert the chunk into both the vector and
    /// lexical indexes. Rejects a pre-embedded chunk whose vector length
    /// disagrees with this index's fixed dimension.
    pub async fn insert(&self, mut chunk: EmbeddedChunk) -> OrbitResult<()> {
        if chunk.embedding.is_empty() {
            chunk.embedding = self.embedder.embed(&chunk.chunk_text).await?;
        }
        self.validate_dimension(&chunk.embedding)?;

        let id: ChunkId = (chunk.owner_id.clone(), chunk.chunk_index);
        self.bm25.write().await.add_chunk(id.clone(), &chunk.chunk_text);
        self.chunks.write().await.insert(id, chunk);
        Ok(())
    }

    /// Remove every chunk belonging to `owner_id` from the index, e.g.
    /// when a skill is superseded.
    pub async fn remove_owner(&self, owner_id: &str) {
        let mut chunks = self.chunks.write().await;
        let mut bm25 = self.bm25.write().await;
        let stale: Vec<ChunkId> = chunks
            .keys()
            .filter(|(owner, _)| owner == owner_id)
            .cloned()
            .collect();
        for id in stale {
            chunks.remove(&id);
            bm25.remove_chunk(&id);
        }
    }

    /// Number of chunks currently indexed.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// True if the index holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Search for the top `top_k` chunks fusing vector and lexical
    /// candidate lists by RRF. Returns an empty result against an empty
    /// corpus rather than erroring.
    pub async fn search(&self, query: &str, top_k: usize) -> OrbitResult<Vec<SearchHit>> {
        if self.is_empty().await {
            return Ok(Vec::new());
        }

        let fetch_m = DEFAULT_FETCH_M.max(top_k);

        let query_embedding = self.embedder.embed(query).await?;
        self.validate_dimension(&query_embedding)?;

        let vector_candidates = self.vector_search(&query_embedding, fetch_m).await;
        let lexical_candidates = self.bm25.read().await.search(query, fetch_m);

        let mut vector_rank: HashMap<ChunkId, usize> = HashMap::new();
        for (rank, (id, _score)) in vector_candidates.iter().enumerate() {
            vector_rank.insert(id.clone(), rank + 1);
        }
        let mut lexical_rank: HashMap<ChunkId, usize> = HashMap::new();
        for (rank, (id, _score)) in lexical_candidates.iter().enumerate() {
            lexical_rank.insert(id.clone(), rank + 1);
        }

        let mut ids: Vec<ChunkId> = vector_rank.keys().cloned().collect();
        for id in lexical_rank.keys() {
            if !vector_rank.contains_key(id) {
                ids.push(id.clone());
            }
        }

        let chunks = self.chunks.read().await;
        let mut hits: Vec<SearchHit> = Vec::with_capacity(ids.len());
        for id in ids {
            let mut score = 0.0f32;
            let in_vector = vector_rank.contains_key(&id);
            let in_lexical = lexical_rank.contains_key(&id);
            if let Some(rank) = vector_rank.get(&id) {
                score += 1.0 / (RRF_K + *rank as f32);
            }
            if let Some(rank) = lexical_rank.get(&id) {
                score += 1.0 / (RRF_K + *rank as f32);
            }
            if let Some(chunk) = chunks.get(&id) {
                hits.push(SearchHit {
                    owner_id: chunk.owner_id.clone(),
                    chunk_index: chunk.chunk_index,
                    chunk_text: chunk.chunk_text.clone(),
                    score,
                    in_vector,
                    in_lexical,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.owner_id.cmp(&b.owner_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn vector_search(&self, query: &[f32], top_k: usize) -> Vec<(ChunkId, f32)> {
        let chunks = self.chunks.read().await;
        let mut scored: Vec<(ChunkId, f32)> = chunks
            .values()
            .map(|chunk| {
                let id = (chunk.owner_id.clone(), chunk.chunk_index);
                (id, cosine_similarity(query, &chunk.embedding))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        scored
    }

    fn validate_dimension(&self, vector: &[f32]) -> OrbitResult<()> {
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(OrbitError::Validation(format!(
                "embedding dimension mismatch: expected {expected}, got {}",
                vector.len()
            )));
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
