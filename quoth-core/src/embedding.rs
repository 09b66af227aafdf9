//! Embedding provider trait, the text/code content classifier, and pure
//! vector utilities.
//!
//! Concrete provider implementations (the HTTP gateway client) live in the
//! `quoth-server` app crate; this crate only defines the interface and the
//! classification heuristic that decides which model a caller should ask
//! for.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Code,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Code => "code",
        }
    }
}

/// Trait for embedding providers. Implementations are created once at
/// startup and injected into the retrieval pipeline and indexer — never
/// referenced as a module-level singleton (§9).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier this provider routes to for the given
    /// content type (e.g. `"text-embedding-3-small"` vs. `"text-embedding-3-code"`).
    fn model_name(&self, content_type: ContentType) -> &str;

    /// Fixed dimension `D` for every vector this provider returns,
    /// regardless of content type (§9: schema-homogeneous per model).
    fn dims(&self) -> usize;

    async fn embed_passage(&self, text: &str, content_type: ContentType) -> anyhow::Result<Vec<f32>>;

    async fn embed_query(&self, text: &str, content_type: ContentType) -> anyhow::Result<Vec<f32>>;
}

const CODE_KEYWORDS: &[&str] = &[
    "function", "fn", "def", "class", "const", "let", "var", "import", "return", "public",
    "private", "protected", "static", "void", "struct", "interface", "enum", "package",
    "namespace", "using", "include", "export", "impl", "trait", "async", "await",
];

/// Whitespace-normalize input before embedding, per §4.1.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classify `text` as `Code` or `Text` using the line-level heuristic of
/// §4.1: for each non-blank line, count a signal if it matches a code
/// keyword, has ≥2-space leading indent, opens a fenced code block, or
/// contains any of `{}[]();`. `Code` if signal/nonblank > 0.30.
pub fn classify_content_type(text: &str) -> ContentType {
    let mut signal = 0usize;
    let mut nonblank = 0usize;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        nonblank += 1;

        let indent = line.chars().take_while(|c| *c == ' ').count();
        let first_word = trimmed
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("");

        let hit = CODE_KEYWORDS.contains(&first_word)
            || indent >= 2
            || trimmed.starts_with("```")
            || trimmed.contains(|c| "{}[]();".contains(c));

        if hit {
            signal += 1;
        }
    }

    if nonblank == 0 {
        return ContentType::Text;
    }

    let ratio = signal as f64 / nonblank as f64;
    if ratio > 0.30 {
        ContentType::Code
    } else {
        ContentType::Text
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes), for backends
/// that store embeddings as raw bytes rather than a native vector column.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched-length
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_prose_as_text() {
        let text = "This document explains the retrieval pipeline in plain language for new readers.\nIt has no code at all, just sentences about how things work.";
        assert_eq!(classify_content_type(text), ContentType::Text);
    }

    #[test]
    fn classifies_source_as_code() {
        let text = "pub fn search(query: &str) -> Vec<Result> {\n    let mut results = vec![];\n    results\n}";
        assert_eq!(classify_content_type(text), ContentType::Code);
    }

    #[test]
    fn classify_empty_is_text() {
        assert_eq!(classify_content_type(""), ContentType::Text);
    }

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        assert_eq!(normalize_whitespace("  a   b\n\tc  "), "a b c");
    }
}
