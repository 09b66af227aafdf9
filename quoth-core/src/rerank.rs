//! Reranker provider trait (C2). Injected like [`crate::embedding::EmbeddingProvider`];
//! the retrieval pipeline treats the absence of a configured reranker as
//! "skip this stage", never as an error.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    pub index: usize,
    pub relevance: f32,
}

/// `M` is the maximum number of candidates a single call accepts.
pub const MAX_CANDIDATES: usize = 30;

#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score `(query, candidate)` pairs, returning them sorted by
    /// relevance descending. `candidates.len()` may exceed [`MAX_CANDIDATES`];
    /// implementations truncate to the first `MAX_CANDIDATES`.
    async fn rerank(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<RerankResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerank_result_is_plain_data() {
        let r = RerankResult {
            index: 3,
            relevance: 0.9,
        };
        assert_eq!(r.index, 3);
    }
}
