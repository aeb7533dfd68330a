use std::collections::HashMap;

/// BM25 parameters.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// A chunk's identity within the corpus: its owning skill/document and
/// its position within that owner. Doubles as the deterministic
/// tie-break key for fusion (§4.7).
pub type ChunkId = (String, u32);

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1)
        .collect()
}

/// A BM25 inverted index over corpus chunks, keyed by [`ChunkId`] rather
/// than an opaque document id since chunks are addressed by
/// `(owner_id, chunk_index)` throughout the search layer.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    inverted_index: HashMap<String, HashMap<ChunkId, f32>>,
    doc_lengths: HashMap<ChunkId, f32>,
    doc_count: usize,
    avg_doc_length: f32,
}

impl Bm25Index {
    /// Create a new, empty BM25 index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index (or re-index) one chunk's text under its id.
    pub fn add_chunk(&mut self, id: ChunkId, text: &str) {
        self.remove_chunk(&id);

        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;

        let mut term_freq: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0.0) += 1.0;
        }

        for (term, freq) in term_freq {
            self.inverted_index
                .entry(term)
                .or_default()
                .insert(id.clone(), freq);
        }

        self.doc_lengths.insert(id, doc_len);
        self.doc_count += 1;
        self.recompute_avg_doc_length();
    }

    /// Remove a chunk from the index, if present.
    pub fn remove_chunk(&mut self, id: &ChunkId) {
        if self.doc_lengths.remove(id).is_none() {
            return;
        }
        self.doc_count = self.doc_count.saturating_sub(1);

        let mut empty_terms = Vec::new();
        for (term, postings) in &mut self.inverted_index {
            postings.remove(id);
            if postings.is_empty() {
                empty_terms.push(term.clone());
            }
        }
        for term in empty_terms {
            self.inverted_index.remove(&term);
        }
        self.recompute_avg_doc_length();
    }

    /// Search for the top `top_k` chunks by descending BM25 score.
    ///
    /// `score(d) = Σ_t IDF(t) * (tf * (k1+1)) / (tf + k1 * (1 - b + b*dl/avgdl))`
    /// with Robertson's always-non-negative IDF.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(ChunkId, f32)> {
        if self.doc_count == 0 {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let n = self.doc_count as f32;
        let mut scores: HashMap<ChunkId, f32> = HashMap::new();

        for token in &query_tokens {
            if let Some(postings) = self.inverted_index.get(token) {
                let df = postings.len() as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

                for (id, &tf) in postings {
                    let dl = self.doc_lengths.get(id).copied().unwrap_or(0.0);
                    let avgdl = if self.avg_doc_length > 0.0 {
                        self.avg_doc_length
                    } else {
                        1.0
                    };
                    let numerator = tf * (K1 + 1.0);
                    let denominator = tf + K1 * (1.0 - B + B * dl / avgdl);
                    let term_score = idf * numerator / denominator;
                    *scores.entry(id.clone()).or_insert(0.0) += term_score;
                }
            }
        }

        let mut results: Vec<(ChunkId, f32)> = scores.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(top_k);
        results
    }

    /// Number of chunks currently indexed.
    pub fn document_count(&self) -> usize {
        self.doc_count
    }

    fn recompute_avg_doc_length(&mut self) {
        if self.doc_count == 0 {
            self.avg_doc_length = 0.0;
        } else {
            let total: f32 = self.doc_lengths.values().sum();
            self.avg_doc_length = total / self.doc_count as f32;
        }
    }
}
