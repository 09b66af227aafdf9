//! The pure part of the Retrieval Pipeline (C5): dynamic cutoff, trust-band
//! tagging, result ordering, and query tokenization for the keyword
//! fallback. The stateful orchestration (calling the embedding gateway, the
//! vector store, and the reranker) lives in `quoth-server`'s
//! `retrieval` module; this module only operates on already-fetched
//! candidates and scores.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Nearest-neighbor candidate as returned by the vector store, before
/// reranking.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub title: Option<String>,
    pub file_path: String,
    pub content_chunk: String,
    pub chunk_index: i64,
    pub similarity: f64,
}

/// A candidate after the (optional) rerank stage, carrying both scores so
/// ties can be broken on vector similarity.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub title: Option<String>,
    pub file_path: String,
    pub content_chunk: String,
    pub chunk_index: i64,
    pub similarity: f64,
    /// The reranker's relevance score, or the vector similarity itself when
    /// reranking was skipped.
    pub relevance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustBand {
    High,
    Medium,
    Low,
}

impl TrustBand {
    pub fn for_score(score: f64) -> TrustBand {
        if score > 0.80 {
            TrustBand::High
        } else if score >= 0.60 {
            TrustBand::Medium
        } else {
            TrustBand::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub document_id: String,
    pub title: Option<String>,
    pub file_path: String,
    pub snippet: String,
    pub chunk_index: i64,
    pub score: f64,
    pub trust_band: TrustBand,
}

/// K₀: vector candidates requested per §4.5 step 5.
pub const VECTOR_CANDIDATE_K0: i64 = 50;
/// Similarity floor used when asking the store for vector candidates.
pub const VECTOR_SIMILARITY_FLOOR: f64 = 0.1;
/// K_max: candidates sent to the reranker per §4.5 step 7.
pub const RERANK_K_MAX: usize = 30;
/// Number of top vector candidates used directly when rerank is skipped.
pub const NO_RERANK_TOP_N: usize = 10;
/// Scores below this are dropped before accumulation (§4.5 step 8).
pub const CUTOFF_FLOOR: f64 = 0.50;
/// Minimum accumulated result count before the high-relevance stop rule
/// applies.
pub const K_MIN: usize = 15;
/// The "high-relevance threshold" that stops accumulation once K_MIN has
/// been reached.
pub const HIGH_RELEVANCE_THRESHOLD: f64 = 0.65;
/// `read_chunks` accepts at most this many ids in one call.
pub const MAX_READ_CHUNK_IDS: usize = 20;

/// Sort ranked chunks by relevance desc, then vector similarity desc, then
/// `chunk_index` asc, matching §4.5's ordering rule.
pub fn order_ranked(mut items: Vec<RankedChunk>) -> Vec<RankedChunk> {
    items.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    items
}

/// Apply the dynamic cutoff (§4.5 step 8) to an already-ordered (relevance
/// descending) list, then tag each survivor with its trust band (step 9).
///
/// Rule: drop anything below [`CUTOFF_FLOOR`]. Accumulate the rest. Once at
/// least [`K_MIN`] results have been accumulated, stop as soon as the next
/// candidate's relevance falls below [`HIGH_RELEVANCE_THRESHOLD`].
pub fn dynamic_cutoff(ordered: Vec<RankedChunk>) -> Vec<SearchResultItem> {
    let mut out = Vec::new();

    for item in ordered {
        if item.relevance < CUTOFF_FLOOR {
            continue;
        }
        if out.len() >= K_MIN && item.relevance < HIGH_RELEVANCE_THRESHOLD {
            break;
        }
        let score = item.relevance;
        out.push(SearchResultItem {
            chunk_id: item.chunk_id,
            document_id: item.document_id,
            title: item.title,
            file_path: item.file_path,
            snippet: item.content_chunk,
            chunk_index: item.chunk_index,
            score,
            trust_band: TrustBand::for_score(score),
        });
    }

    out
}

/// Convenience: sort then cut in one call.
pub fn rank_and_cut(items: Vec<RankedChunk>) -> Vec<SearchResultItem> {
    dynamic_cutoff(order_ranked(items))
}

/// Tokenize a keyword-fallback query: lower-case, split on whitespace,
/// discard tokens of length ≤ 2. The resulting tokens are AND-joined by the
/// caller when building the full-text query.
pub fn tokenize_for_keyword_search(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 2)
        .collect()
}

/// Fixed relevance assigned to every keyword-fallback result (§4.5).
pub const KEYWORD_FALLBACK_RELEVANCE: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, relevance: f64, similarity: f64, chunk_index: i64) -> RankedChunk {
        RankedChunk {
            chunk_id: id.to_string(),
            document_id: format!("doc-{id}"),
            title: None,
            file_path: "docs/x.md".into(),
            content_chunk: "snippet".into(),
            chunk_index,
            similarity,
            relevance,
        }
    }

    #[test]
    fn dynamic_cutoff_matches_seed_scenario_s3() {
        // 0.95, 0.92, 0.88, descending synthetic scores down through 0.66,
        // 0.64, then a tail below 0.50.
        let mut scores = vec![0.95, 0.92, 0.88, 0.85, 0.83, 0.81, 0.79, 0.77, 0.75, 0.73,
            0.71, 0.69, 0.67, 0.66, 0.655, 0.66, 0.64, 0.40, 0.30];
        // 15th accumulated item lands at index 14 (0.655); the 16th (0.66)
        // keeps going since K_MIN not yet exceeded-with-sub-threshold; the
        // 17th (0.64) stops it.
        scores.truncate(19);
        let items: Vec<RankedChunk> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| chunk(&format!("c{i}"), s, s, i as i64))
            .collect();
        let results = rank_and_cut(items);
        assert_eq!(results.len(), 16);
        assert!(results.iter().all(|r| r.score >= CUTOFF_FLOOR));
    }

    #[test]
    fn dynamic_cutoff_drops_below_floor() {
        let items = vec![chunk("a", 0.9, 0.9, 0), chunk("b", 0.3, 0.3, 1)];
        let results = rank_and_cut(items);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a");
    }

    #[test]
    fn dynamic_cutoff_stops_below_k_min_threshold_immediately_if_never_reached() {
        // Fewer than K_MIN items total, all above the floor: everything
        // accumulates since the high-relevance stop rule never engages.
        let items: Vec<RankedChunk> = (0..5)
            .map(|i| chunk(&format!("c{i}"), 0.55, 0.55, i))
            .collect();
        let results = rank_and_cut(items);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn trust_bands_match_thresholds() {
        assert_eq!(TrustBand::for_score(0.81), TrustBand::High);
        assert_eq!(TrustBand::for_score(0.80), TrustBand::Medium);
        assert_eq!(TrustBand::for_score(0.60), TrustBand::Medium);
        assert_eq!(TrustBand::for_score(0.59), TrustBand::Low);
    }

    #[test]
    fn ordering_breaks_ties_on_similarity_then_chunk_index() {
        let items = vec![
            chunk("a", 0.9, 0.5, 2),
            chunk("b", 0.9, 0.9, 1),
            chunk("c", 0.9, 0.9, 0),
        ];
        let ordered = order_ranked(items);
        let ids: Vec<&str> = ordered.iter().map(|c| c.chunk_id.as_str()).collect();
        // b and c tie on relevance+similarity; chunk_index 0 sorts first.
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn tokenize_discards_short_tokens() {
        let tokens = tokenize_for_keyword_search("the Retrieval Pipeline is RAG");
        assert_eq!(tokens, vec!["the", "retrieval", "pipeline", "rag"]);
    }

    #[test]
    fn tokenize_lowercases_and_filters_len_le_2() {
        let tokens = tokenize_for_keyword_search("is RAG ok Pipeline");
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"ok".to_string()));
        assert!(tokens.contains(&"rag".to_string()));
        assert!(tokens.contains(&"pipeline".to_string()));
    }
}
