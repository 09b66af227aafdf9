//! Retrieval Pipeline (C5, §4.5).
//!
//! Orchestrates the stateful half of search: tier admission, query
//! classification, the embedding gateway, the vector store, and the
//! optional reranker, then hands candidates to `quoth_core::search`'s pure
//! dynamic-cutoff algorithm. `quoth-core` owns the math; this module owns
//! the I/O and the tier/fallback decisions around it.
//!
//! Grounded on the teacher's `get.rs`/`search.rs` handlers for the
//! "classify, embed, query backend, shape result" shape, generalized with
//! the tier-gated keyword fallback and rerank-or-not branch spec.md §4.5
//! adds on top.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use quoth_core::embedding::{classify_content_type, EmbeddingProvider};
use quoth_core::models::{Document, DocumentChunk, LimitType};
use quoth_core::rerank::RerankProvider;
use quoth_core::search::{
    rank_and_cut, tokenize_for_keyword_search, RankedChunk, SearchResultItem, TrustBand,
    KEYWORD_FALLBACK_RELEVANCE, MAX_READ_CHUNK_IDS, NO_RERANK_TOP_N, RERANK_K_MAX,
    VECTOR_CANDIDATE_K0, VECTOR_SIMILARITY_FLOOR,
};
use quoth_core::store::{Store, VectorMatch};
use quoth_core::QuothError;

use crate::tier_cache::TierMeter;

pub struct SearchOutcome {
    pub items: Vec<SearchResultItem>,
    pub used_fallback: bool,
    pub tier_message: Option<String>,
}

/// `read_document`'s lookup scope (§4.5): `Project` only looks at the
/// caller's own tenant; `Org` additionally widens to shared documents
/// across the organization.
pub enum ReadScope {
    Project,
    Org { organization_id: Uuid },
}

pub struct RetrievalPipeline {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    tier_meter: Arc<TierMeter>,
}

impl RetrievalPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
        tier_meter: Arc<TierMeter>,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            tier_meter,
        }
    }

    /// §4.5 steps 1-9: the full `quoth_search_index` protocol, including
    /// the tier-gated keyword fallback.
    pub async fn search_documents(
        &self,
        project_id: Uuid,
        query: &str,
        is_genesis: bool,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, QuothError> {
        let tier_message = self
            .tier_meter
            .format_footer(project_id, LimitType::SemanticSearch)
            .await?;
        let admission = self.tier_meter.check(project_id, LimitType::SemanticSearch).await?;

        if !admission.allowed {
            let items = self.keyword_fallback(project_id, query).await?;
            return Ok(SearchOutcome {
                items,
                used_fallback: true,
                tier_message,
            });
        }
        self.tier_meter.increment(project_id, LimitType::SemanticSearch);

        let items = self.vector_search(project_id, query, is_genesis, cancel).await?;
        Ok(SearchOutcome {
            items,
            used_fallback: false,
            tier_message,
        })
    }

    /// §4.5: the org-scoped sibling used for cross-project pattern
    /// matching over `Shared`-visibility documents. No tier gate, no
    /// keyword fallback — it's an internal lookup, not a billable search.
    pub async fn search_shared(
        &self,
        organization_id: Uuid,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResultItem>, QuothError> {
        bail_if_cancelled(cancel)?;
        let content_type = classify_content_type(query);
        let query_embedding = self
            .embedder
            .embed_query(query, content_type)
            .await
            .map_err(|e| QuothError::BackendUnavailable(e.to_string()))?;

        bail_if_cancelled(cancel)?;
        let candidates = self
            .store
            .match_shared_documents(
                organization_id,
                self.embedder.model_name(content_type),
                &query_embedding,
                VECTOR_CANDIDATE_K0,
            )
            .await
            .map_err(QuothError::Internal)?;

        bail_if_cancelled(cancel)?;
        let ranked = self.rank_candidates(query, candidates, false, cancel).await?;
        Ok(rank_and_cut(ranked))
    }

    async fn vector_search(
        &self,
        project_id: Uuid,
        query: &str,
        is_genesis: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResultItem>, QuothError> {
        bail_if_cancelled(cancel)?;
        let content_type = classify_content_type(query);
        let query_embedding = self
            .embedder
            .embed_query(query, content_type)
            .await
            .map_err(|e| QuothError::BackendUnavailable(e.to_string()))?;

        bail_if_cancelled(cancel)?;
        let candidates = self
            .store
            .match_documents(
                project_id,
                self.embedder.model_name(content_type),
                &query_embedding,
                VECTOR_SIMILARITY_FLOOR,
                VECTOR_CANDIDATE_K0,
            )
            .await
            .map_err(QuothError::Internal)?;

        bail_if_cancelled(cancel)?;
        let should_rerank = self.tier_meter.should_rerank(project_id, is_genesis).await?;
        let ranked = self.rank_candidates(query, candidates, should_rerank, cancel).await?;
        Ok(rank_and_cut(ranked))
    }

    /// §4.5 steps 6-7: rerank the top `RERANK_K_MAX` candidates when
    /// enabled and available; otherwise take the top `NO_RERANK_TOP_N`
    /// vector hits directly, using similarity as the relevance score.
    async fn rank_candidates(
        &self,
        query: &str,
        candidates: Vec<VectorMatch>,
        should_rerank: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedChunk>, QuothError> {
        match (should_rerank, &self.reranker) {
            (true, Some(reranker)) => {
                let pool: Vec<VectorMatch> = candidates.into_iter().take(RERANK_K_MAX).collect();
                let texts: Vec<String> = pool.iter().map(|c| c.content_chunk.clone()).collect();

                bail_if_cancelled(cancel)?;
                let scored = reranker
                    .rerank(query, &texts)
                    .await
                    .map_err(|e| QuothError::BackendUnavailable(e.to_string()))?;

                Ok(scored
                    .into_iter()
                    .filter_map(|r| pool.get(r.index).map(|c| to_ranked(c, r.relevance as f64)))
                    .collect())
            }
            _ => Ok(candidates
                .into_iter()
                .take(NO_RERANK_TOP_N)
                .map(|c| {
                    let similarity = c.similarity;
                    to_ranked(&c, similarity)
                })
                .collect()),
        }
    }

    /// §4.5 `read_document`: exact match, then an unambiguous
    /// case-insensitive substring match; widened to shared org documents
    /// when `scope` is `Org`.
    pub async fn read_document(
        &self,
        project_id: Uuid,
        query: &str,
        scope: ReadScope,
    ) -> Result<Document, QuothError> {
        if let Some(doc) = self
            .store
            .find_document(project_id, query)
            .await
            .map_err(QuothError::Internal)?
        {
            return Ok(doc);
        }

        if let ReadScope::Org { organization_id } = scope {
            if let Some(doc) = self
                .store
                .find_shared_document(organization_id, query)
                .await
                .map_err(QuothError::Internal)?
            {
                return Ok(doc);
            }
        }

        Err(QuothError::NotFound(format!("no document matches \"{query}\"")))
    }

    /// §4.5 `read_chunks`: at most `MAX_READ_CHUNK_IDS` per call,
    /// project-scoped.
    pub async fn read_chunks(
        &self,
        project_id: Uuid,
        chunk_ids: &[Uuid],
    ) -> Result<Vec<DocumentChunk>, QuothError> {
        if chunk_ids.len() > MAX_READ_CHUNK_IDS {
            return Err(QuothError::ValidationError(format!(
                "at most {MAX_READ_CHUNK_IDS} chunk ids per call"
            )));
        }
        self.store
            .get_chunks_by_ids(chunk_ids, project_id)
            .await
            .map_err(QuothError::Internal)
    }

    /// §4.5 `keyword_fallback`: AND-joined full-text search at a fixed
    /// relevance, degrading to a single-token search if the full
    /// conjunction fails.
    pub async fn keyword_fallback(
        &self,
        project_id: Uuid,
        query: &str,
    ) -> Result<Vec<SearchResultItem>, QuothError> {
        let tokens = tokenize_for_keyword_search(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let matches = match self
            .store
            .keyword_search(project_id, &tokens, VECTOR_CANDIDATE_K0)
            .await
        {
            Ok(matches) => matches,
            Err(_) => self
                .store
                .keyword_search(project_id, &tokens[..1], VECTOR_CANDIDATE_K0)
                .await
                .map_err(QuothError::Internal)?,
        };

        Ok(matches
            .into_iter()
            .map(|m| SearchResultItem {
                chunk_id: m.chunk_id.to_string(),
                document_id: m.document_id.to_string(),
                title: Some(m.title),
                file_path: m.file_path,
                snippet: m.content_chunk,
                chunk_index: m.chunk_index,
                score: KEYWORD_FALLBACK_RELEVANCE,
                trust_band: TrustBand::for_score(KEYWORD_FALLBACK_RELEVANCE),
            })
            .collect())
    }
}

fn to_ranked(c: &VectorMatch, relevance: f64) -> RankedChunk {
    RankedChunk {
        chunk_id: c.chunk_id.to_string(),
        document_id: c.document_id.to_string(),
        title: Some(c.title.clone()),
        file_path: c.file_path.clone(),
        content_chunk: c.content_chunk.clone(),
        chunk_index: c.chunk_index,
        similarity: c.similarity,
        relevance,
    }
}

fn bail_if_cancelled(cancel: &CancellationToken) -> Result<(), QuothError> {
    if cancel.is_cancelled() {
        return Err(QuothError::Internal(anyhow::anyhow!("request cancelled")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quoth_core::embedding::ContentType;
    use quoth_core::models::{ChunkMetadata, DocType, Organization, Project, Tier, Visibility};
    use quoth_core::store::memory::InMemoryStore;

    struct FixedEmbedder;
    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self, _content_type: ContentType) -> &str {
            "test-model"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_passage(&self, _text: &str, _content_type: ContentType) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_query(&self, _text: &str, _content_type: ContentType) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    async fn seeded_project_with_chunk(tier: Tier) -> (Arc<dyn Store>, Uuid) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let org_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        store
            .create_organization(Organization {
                id: org_id,
                slug: "acme".into(),
                name: "Acme".into(),
                owner_user_id: owner_id,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let project = store
            .create_project(Project {
                id: Uuid::new_v4(),
                slug: "docs".into(),
                organization_id: org_id,
                owner_user_id: owner_id,
                is_public: false,
                require_approval: false,
                tier,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let doc = store
            .upsert_document(quoth_core::models::Document {
                id: Uuid::nil(),
                project_id: project.id,
                file_path: "architecture/overview.md".into(),
                title: "Overview".into(),
                content: "content".into(),
                checksum: quoth_core::models::Document::checksum_for("content"),
                doc_type: Some(DocType::Architecture),
                visibility: Visibility::Project,
                version: 0,
                last_updated: chrono::Utc::now(),
                agent_id: None,
            })
            .await
            .unwrap();

        store
            .insert_chunk(quoth_core::models::DocumentChunk {
                id: Uuid::new_v4(),
                document_id: doc.id,
                content_chunk: "Relevant content about search".into(),
                chunk_hash: "h".into(),
                embedding: vec![1.0, 0.0],
                embedding_model: "test-model".into(),
                metadata: ChunkMetadata {
                    chunk_index: 0,
                    language: None,
                    start_line: None,
                    end_line: None,
                    parent_context: None,
                    source: "test".into(),
                },
            })
            .await
            .unwrap();

        (store, project.id)
    }

    fn pipeline(store: Arc<dyn Store>) -> RetrievalPipeline {
        RetrievalPipeline::new(store.clone(), Arc::new(FixedEmbedder), None, Arc::new(TierMeter::new(store)))
    }

    #[tokio::test]
    async fn search_finds_the_seeded_chunk() {
        let (store, project_id) = seeded_project_with_chunk(Tier::Pro).await;
        let pipeline = pipeline(store);
        let cancel = CancellationToken::new();

        let outcome = pipeline
            .search_documents(project_id, "search relevance", false, &cancel)
            .await
            .unwrap();

        assert!(!outcome.used_fallback);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].trust_band, TrustBand::High);
    }

    #[tokio::test]
    async fn free_tier_overflow_falls_back_to_keyword_search() {
        let (store, project_id) = seeded_project_with_chunk(Tier::Free).await;
        let pipeline = pipeline(store);
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            pipeline
                .search_documents(project_id, "search relevance", false, &cancel)
                .await
                .unwrap();
        }

        let sixth = pipeline
            .search_documents(project_id, "relevant content search", false, &cancel)
            .await
            .unwrap();
        assert!(sixth.used_fallback);
        assert!(sixth.tier_message.is_some());
    }

    #[tokio::test]
    async fn read_document_exact_match() {
        let (store, project_id) = seeded_project_with_chunk(Tier::Pro).await;
        let pipeline = pipeline(store);
        let doc = pipeline
            .read_document(project_id, "architecture/overview.md", ReadScope::Project)
            .await
            .unwrap();
        assert_eq!(doc.title, "Overview");
    }

    #[tokio::test]
    async fn read_chunks_rejects_too_many_ids() {
        let (store, project_id) = seeded_project_with_chunk(Tier::Pro).await;
        let pipeline = pipeline(store);
        let ids: Vec<Uuid> = (0..MAX_READ_CHUNK_IDS + 1).map(|_| Uuid::new_v4()).collect();
        let result = pipeline.read_chunks(project_id, &ids).await;
        assert!(matches!(result, Err(QuothError::ValidationError(_))));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_search() {
        let (store, project_id) = seeded_project_with_chunk(Tier::Pro).await;
        let pipeline = pipeline(store);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pipeline
            .search_documents(project_id, "anything", false, &cancel)
            .await;
        assert!(result.is_err());
    }
}
