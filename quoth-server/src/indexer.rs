//! Incremental Indexer (C4, §4.4).
//!
//! `sync()` walks a single document through checksum dedup, chunk-hash
//! diffing, and embedding — skipping whole-document re-embeds when the
//! content hasn't changed, and skipping per-chunk re-embeds when a chunk's
//! hash survives unchanged across a re-sync, preserving that chunk's id.
//!
//! Grounded on the teacher's `ingest.rs::run_sync`/`replace_chunks` for the
//! overall shape (upsert document, diff chunks, embed, write), generalized
//! from a blanket delete-then-insert-all into a hash-diff that reuses
//! unchanged chunks. The advisory lock has no teacher equivalent — it's new
//! to serialize concurrent syncs of the same `(project_id, file_path)` per
//! §5, grounded on `tier_cache.rs`'s `DashMap`-per-key idiom.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use quoth_core::chunk::chunk as split_into_chunks;
use quoth_core::embedding::{classify_content_type, EmbeddingProvider};
use quoth_core::models::{ChunkMetadata, DocType, Document, DocumentChunk, Visibility};
use quoth_core::store::Store;
use quoth_core::QuothError;

pub struct SyncOutcome {
    pub document: Document,
    pub chunks_added: usize,
    pub chunks_reused: usize,
    pub chunks_removed: usize,
    pub no_op: bool,
}

pub struct SyncRequest {
    pub project_id: Uuid,
    pub file_path: String,
    pub title: String,
    pub content: String,
    pub doc_type: Option<DocType>,
    pub visibility: Option<Visibility>,
    pub agent_id: Option<Uuid>,
}

pub struct Indexer {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_pacing: Duration,
    locks: DashMap<(Uuid, String), Arc<Mutex<()>>>,
}

impl Indexer {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn EmbeddingProvider>, embed_pacing: Duration) -> Self {
        Self {
            store,
            embedder,
            embed_pacing,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, project_id: Uuid, file_path: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((project_id, file_path.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// §4.4's full ten-step protocol. The per-`(project_id, file_path)`
    /// lock means a second concurrent writer for the same file blocks
    /// until the first finishes, then observes the already-applied
    /// checksum and no-ops (§5).
    pub async fn sync(&self, req: SyncRequest) -> Result<SyncOutcome, QuothError> {
        let lock = self.lock_for(req.project_id, &req.file_path);
        let _guard = lock.lock().await;

        let checksum = Document::checksum_for(&req.content);
        let existing = self
            .store
            .get_document_by_path(req.project_id, &req.file_path)
            .await
            .map_err(QuothError::Internal)?;

        if let Some(existing) = &existing {
            if existing.checksum == checksum {
                return Ok(SyncOutcome {
                    document: existing.clone(),
                    chunks_added: 0,
                    chunks_reused: self
                        .store
                        .stored_chunk_hashes(existing.id)
                        .await
                        .map_err(QuothError::Internal)?
                        .len(),
                    chunks_removed: 0,
                    no_op: true,
                });
            }
        }

        let doc_type = req
            .doc_type
            .or_else(|| existing.as_ref().and_then(|d| d.doc_type))
            .or_else(|| DocType::infer_from_path(&req.file_path));
        let visibility = req
            .visibility
            .or_else(|| existing.as_ref().map(|d| d.visibility))
            .unwrap_or_default();

        let document = self
            .store
            .upsert_document(Document {
                id: existing.as_ref().map(|d| d.id).unwrap_or_else(Uuid::nil),
                project_id: req.project_id,
                file_path: req.file_path.clone(),
                title: req.title,
                content: req.content.clone(),
                checksum,
                doc_type,
                visibility,
                version: existing.as_ref().map(|d| d.version).unwrap_or(0),
                last_updated: chrono::Utc::now(),
                agent_id: req.agent_id,
            })
            .await
            .map_err(QuothError::Internal)?;

        let raw_chunks = split_into_chunks(&req.file_path, &req.content);

        let stored_hashes = self
            .store
            .stored_chunk_hashes(document.id)
            .await
            .map_err(QuothError::Internal)?;

        let mut pool: HashMap<String, Vec<Uuid>> = HashMap::new();
        for s in &stored_hashes {
            pool.entry(s.chunk_hash.clone()).or_default().push(s.chunk_id);
        }

        let mut reused: HashSet<Uuid> = HashSet::new();
        let mut to_embed = Vec::new();
        for raw in &raw_chunks {
            let hash = raw.hash();
            let matched = pool.get_mut(&hash).and_then(|ids| ids.pop());
            match matched {
                Some(id) => {
                    reused.insert(id);
                }
                None => to_embed.push(raw.clone()),
            }
        }

        let to_delete: Vec<Uuid> = stored_hashes
            .iter()
            .map(|s| s.chunk_id)
            .filter(|id| !reused.contains(id))
            .collect();

        if !to_delete.is_empty() {
            self.store
                .delete_chunks(&to_delete)
                .await
                .map_err(QuothError::Internal)?;
        }

        for (i, raw) in to_embed.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.embed_pacing).await;
            }

            let content_type = classify_content_type(&raw.content);
            let embedding = self
                .embedder
                .embed_passage(&raw.content, content_type)
                .await
                .map_err(|e| QuothError::BackendUnavailable(e.to_string()))?;

            self.store
                .insert_chunk(DocumentChunk {
                    id: Uuid::new_v4(),
                    document_id: document.id,
                    content_chunk: raw.content.clone(),
                    chunk_hash: raw.hash(),
                    embedding,
                    embedding_model: self.embedder.model_name(content_type).to_string(),
                    metadata: ChunkMetadata {
                        chunk_index: raw.meta.chunk_index,
                        language: raw.meta.language.clone(),
                        start_line: raw.meta.start_line,
                        end_line: raw.meta.end_line,
                        parent_context: raw.meta.parent_context.clone(),
                        source: "indexer".to_string(),
                    },
                })
                .await
                .map_err(QuothError::Internal)?;
        }

        Ok(SyncOutcome {
            document,
            chunks_added: to_embed.len(),
            chunks_reused: reused.len(),
            chunks_removed: to_delete.len(),
            no_op: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quoth_core::embedding::ContentType;
    use quoth_core::models::{Organization, Project, Tier};
    use quoth_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self, _content_type: ContentType) -> &str {
            "test-model"
        }

        fn dims(&self) -> usize {
            3
        }

        async fn embed_passage(&self, _text: &str, _content_type: ContentType) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.1, 0.2, 0.3])
        }

        async fn embed_query(&self, _text: &str, _content_type: ContentType) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    async fn seeded_project() -> (Arc<dyn Store>, Uuid) {
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
                tier: Tier::Free,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        (store, project.id)
    }

    fn markdown_doc(n: usize) -> String {
        let mut s = String::from("# Title\n\n");
        for i in 0..n {
            s.push_str(&format!(
                "## Section {i}\n\nThis is section number {i} with enough body text to survive the fifty character minimum chunk filter applied by the chunker.\n\n"
            ));
        }
        s
    }

    #[tokio::test]
    async fn unchanged_content_is_a_no_op() {
        let (store, project_id) = seeded_project().await;
        let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let indexer = Indexer::new(store, embedder.clone(), Duration::from_millis(0));

        let content = markdown_doc(2);
        let req = || SyncRequest {
            project_id,
            file_path: "architecture/overview.md".into(),
            title: "Overview".into(),
            content: content.clone(),
            doc_type: None,
            visibility: None,
            agent_id: None,
        };

        let first = indexer.sync(req()).await.unwrap();
        assert!(!first.no_op);
        assert!(first.chunks_added > 0);

        let calls_after_first = embedder.calls.load(Ordering::SeqCst);

        let second = indexer.sync(req()).await.unwrap();
        assert!(second.no_op);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn incremental_sync_reuses_unchanged_chunks() {
        let (store, project_id) = seeded_project().await;
        let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let indexer = Indexer::new(store, embedder.clone(), Duration::from_millis(0));

        let v1 = markdown_doc(3);
        indexer
            .sync(SyncRequest {
                project_id,
                file_path: "architecture/overview.md".into(),
                title: "Overview".into(),
                content: v1,
                doc_type: None,
                visibility: None,
                agent_id: None,
            })
            .await
            .unwrap();

        let calls_after_first = embedder.calls.load(Ordering::SeqCst);
        assert_eq!(calls_after_first, 3);

        // Same three sections plus one new one: the first three chunks
        // keep their hash and should not be re-embedded.
        let mut v2 = markdown_doc(3);
        v2.push_str("## Section 99\n\nBrand new section with enough text to pass the fifty character minimum chunk length filter too.\n\n");

        let outcome = indexer
            .sync(SyncRequest {
                project_id,
                file_path: "architecture/overview.md".into(),
                title: "Overview".into(),
                content: v2,
                doc_type: None,
                visibility: None,
                agent_id: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.chunks_added, 1);
        assert_eq!(outcome.chunks_reused, 3);
        assert_eq!(outcome.chunks_removed, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first + 1);
    }
}
