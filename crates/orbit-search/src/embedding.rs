use async_trait::async_trait;
use orbit_core::{OrbitError, OrbitResult};
use std::collections::HashMap;

/// Computes dense embeddings for hybrid search queries and corpus chunks.
///
/// Production deployments wire this to a real embedding API; tests and
/// `MOCK_LLM=true` deployments use [`LocalEmbedding`], a deterministic
/// bag-of-words hash with no external dependency.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute the embedding vector for one piece of text.
    async fn embed(&self, text: &str) -> OrbitResult<Vec<f32>>;

    /// Dimension `D` of every vector this provider produces. Fixed for the
    /// lifetime of the index built over it (§4.7 / §9 Open Questions).
    fn dimension(&self) -> usize;
}

/// Deterministic local embedding: a normalized bag-of-words hash into a
/// fixed-size vector. Good enough for semantic-adjacent ranking in tests
/// and `MOCK_LLM=true` runs; swap in a real provider for production.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Build a local embedder producing `dimension`-length vectors.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> OrbitResult<Vec<f32>> {
        if text.is_empty() {
            return Err(OrbitError::Validation("cannot embed empty text".into()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty() && w.len() > 1)
            .collect();

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        for (word, count) in &freq {
            let tf = count / total;
            let h1 = fnv1a(word.as_bytes()) as usize;
            let h2 = fnv1a(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let h3 = fnv1a(&[word.as_bytes(), &[2u8]].concat()) as usize;
            vector[h1 % self.dimension] += tf;
            vector[h2 % self.dimension] += tf * 0.7;
            vector[h3 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dimension_matches_vector_length() {
        let emb = LocalEmbedding::new(64);
        let v = emb.embed("wages and withholding").await.unwrap();
        assert_eq!(v.len(), 64);
        assert_eq!(emb.dimension(), 64);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let emb = LocalEmbedding::default();
        assert!(emb.embed("").await.is_err());
    }

    #[tokio::test]
    async fn deterministic_for_same_input() {
        let emb = LocalEmbedding::default();
        let a = emb.embed("w2 wages").await.unwrap();
        let b = emb.embed("w2 wages").await.unwrap();
        assert_eq!(a, b);
    }
}
