//! End-to-end coverage of the seed scenarios through the tool dispatch
//! surface, backed by the in-memory store rather than a live Postgres
//! instance.
//!
//! Grounded on `tools.rs`'s own `#[cfg(test)]` harness (same
//! `AppState`/`ToolContext`/`NullEmbedder` construction) and generalized
//! into a standalone `tests/` crate the way `session.rs`'s and
//! `config.rs`'s in-module tests exercise one collaborator at a time.
//! This file instead drives whole request/response round trips across
//! several collaborators at once, the way a real agent session would.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use quoth_core::models::{Organization, Project, ProjectMember, Role, Tier};
use quoth_core::store::memory::InMemoryStore;
use quoth_core::store::Store;
use quoth_core::QuothError;

use quoth_server::activity::ActivityLogger;
use quoth_server::agent_bus::AgentBus;
use quoth_server::analytics::Analytics;
use quoth_server::auth::AuthRecord;
use quoth_server::config::{Config, EmbeddingConfig, IndexerConfig, ServerConfig};
use quoth_server::indexer::Indexer;
use quoth_server::proposal::ProposalEngine;
use quoth_server::retrieval::RetrievalPipeline;
use quoth_server::session::SessionManager;
use quoth_server::tier_cache::TierMeter;
use quoth_server::tools::{AppState, Tool, ToolContext, ToolRegistry};

struct NullEmbedder;

#[async_trait]
impl quoth_core::embedding::EmbeddingProvider for NullEmbedder {
    fn model_name(&self, _content_type: quoth_core::embedding::ContentType) -> &str {
        "test-model"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed_passage(&self, _text: &str, _content_type: quoth_core::embedding::ContentType) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.0, 0.0, 0.0])
    }
    async fn embed_query(&self, _text: &str, _content_type: quoth_core::embedding::ContentType) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.0, 0.0, 0.0])
    }
}

struct Harness {
    state: Arc<AppState>,
    registry: ToolRegistry,
}

impl Harness {
    async fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let tier_meter = Arc::new(TierMeter::new(store.clone()));
        let embedder: Arc<dyn quoth_core::embedding::EmbeddingProvider> = Arc::new(NullEmbedder);
        let retrieval = Arc::new(RetrievalPipeline::new(store.clone(), embedder.clone(), None, tier_meter.clone()));
        let indexer = Arc::new(Indexer::new(store.clone(), embedder, Duration::from_millis(0)));
        let proposals = Arc::new(ProposalEngine::new(store.clone(), indexer.clone(), "bus-secret".into()));
        let agent_bus = Arc::new(AgentBus::new(store.clone(), "bus-secret".into()));
        let activity = ActivityLogger::new(store.clone());
        let analytics = Arc::new(Analytics::new(store.clone()));
        let sessions = Arc::new(SessionManager::new());

        let config = Arc::new(Config {
            app_url: "https://quoth.example.com".into(),
            jwt_secret: "test-secret-at-least-16-chars".into(),
            identity_provider_url: None,
            identity_provider_service_key: None,
            embedding: EmbeddingConfig { provider_url: "https://embed.example.com".into(), provider_key: "k".into() },
            reranker: None,
            rag_worker: None,
            bus_signing_secret: "bus-secret".into(),
            database_url: "postgres://localhost/quoth".into(),
            server: ServerConfig { bind: "0.0.0.0:8080".into() },
            indexer: IndexerConfig { embed_pacing: Duration::from_millis(0) },
        });

        let state = Arc::new(AppState {
            store,
            config,
            sessions,
            retrieval,
            tier_meter,
            indexer,
            proposals,
            agent_bus,
            activity,
            analytics,
            templates_dir: PathBuf::from("templates"),
        });

        Self { state, registry: ToolRegistry::with_builtins() }
    }

    async fn seed_project(&self, tier: Tier, require_approval: bool) -> (Uuid, Uuid, Uuid) {
        let org_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        self.state
            .store
            .create_organization(Organization {
                id: org_id,
                slug: format!("org-{org_id}"),
                name: "Acme".into(),
                owner_user_id: owner_id,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let project = self
            .state
            .store
            .create_project(Project {
                id: Uuid::new_v4(),
                slug: format!("docs-{}", Uuid::new_v4()),
                organization_id: org_id,
                owner_user_id: owner_id,
                is_public: false,
                require_approval,
                tier,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        (org_id, project.id, owner_id)
    }

    fn ctx(&self, org_id: Uuid, project_id: Uuid, user_id: Uuid, role: Role) -> ToolContext {
        ToolContext {
            state: self.state.clone(),
            connection_id: format!("conn-{user_id}"),
            auth: AuthRecord { project_id, user_id, role, label: None },
            project_id,
            role,
            organization_id: org_id,
            cancel: CancellationToken::new(),
        }
    }

    async fn call(&self, name: &str, params: serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, QuothError> {
        let tool = self.registry.find(name).expect("tool registered");
        tool.execute(params, ctx).await
    }
}

/// S1: proposing identical content to a document that already matches is
/// a no-op — no new chunks, no re-embedding.
#[tokio::test]
async fn s1_unchanged_document_sync_is_a_no_op() {
    let harness = Harness::new().await;
    let (org_id, project_id, owner_id) = harness.seed_project(Tier::Pro, false).await;
    let ctx = harness.ctx(org_id, project_id, owner_id, Role::Admin);

    let first = harness
        .call(
            "quoth_propose_update",
            json!({
                "doc_id": "architecture/overview.md",
                "new_content": "# Overview\n\nThe system has three components.",
                "reasoning": "initial write-up"
            }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(first["status"], "applied");
    assert_eq!(first["no_op"], false);

    let second = harness
        .call(
            "quoth_propose_update",
            json!({
                "doc_id": "architecture/overview.md",
                "new_content": "# Overview\n\nThe system has three components.",
                "reasoning": "re-submitting the same content"
            }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(second["status"], "applied");
    assert_eq!(second["no_op"], true);
}

/// S4: a free-tier project's semantic searches fall back to keyword
/// search once the daily allowance is exhausted, and a tier message
/// accompanies the response rather than an outright rejection.
#[tokio::test]
async fn s4_free_tier_search_overflow_falls_back_to_keyword() {
    let harness = Harness::new().await;
    let (org_id, project_id, owner_id) = harness.seed_project(Tier::Free, false).await;
    let ctx = harness.ctx(org_id, project_id, owner_id, Role::Admin);

    for _ in 0..5 {
        let result = harness.call("quoth_search_index", json!({"query": "overview"}), &ctx).await.unwrap();
        assert_eq!(result["used_fallback"], false);
    }

    let overflow = harness.call("quoth_search_index", json!({"query": "overview"}), &ctx).await.unwrap();
    assert_eq!(overflow["used_fallback"], true);
    assert!(overflow["tier_message"].is_string());
}

/// S5: a connection with access to two projects can list both accounts,
/// switch between them, and the active project strictly gates which
/// project's documents are visible — no cross-tenant leakage.
#[tokio::test]
async fn s5_account_switch_enforces_tenant_isolation() {
    let harness = Harness::new().await;
    let (org_id, project_a, user_id) = harness.seed_project(Tier::Pro, false).await;
    let (_, project_b, _) = harness.seed_project(Tier::Pro, false).await;

    harness
        .state
        .store
        .upsert_membership(ProjectMember { project_id: project_b, user_id, role: Role::Editor })
        .await
        .unwrap();

    harness
        .state
        .sessions
        .start(&harness.state.store, "conn-switch", user_id, project_a, Role::Admin)
        .await
        .unwrap();

    let ctx_a = harness.ctx(org_id, project_a, user_id, Role::Admin);
    let mut ctx_a_conn = ctx_a;
    ctx_a_conn.connection_id = "conn-switch".into();

    harness
        .call(
            "quoth_propose_update",
            json!({"doc_id": "only-in-a.md", "new_content": "visible only to project A", "reasoning": "seed"}),
            &ctx_a_conn,
        )
        .await
        .unwrap();

    let accounts = harness.call("quoth_list_accounts", json!({}), &ctx_a_conn).await.unwrap();
    assert_eq!(accounts["active_project_id"], project_a.to_string());
    assert_eq!(accounts["accounts"].as_array().unwrap().len(), 2);

    let switched = harness.call("quoth_switch_account", json!({"project_id": project_b}), &ctx_a_conn).await.unwrap();
    assert_eq!(switched["active_project_id"], project_b.to_string());

    let mut ctx_b_conn = harness.ctx(org_id, project_b, user_id, Role::Editor);
    ctx_b_conn.connection_id = "conn-switch".into();

    let read_result = harness.call("quoth_read_doc", json!({"doc_id": "only-in-a.md"}), &ctx_b_conn).await;
    assert!(matches!(read_result, Err(QuothError::NotFound(_))));
}

/// S6: viewers cannot propose changes — the call is rejected before any
/// document or proposal row is created.
#[tokio::test]
async fn s6_viewer_cannot_propose_update() {
    let harness = Harness::new().await;
    let (org_id, project_id, owner_id) = harness.seed_project(Tier::Pro, false).await;
    let viewer_id = Uuid::new_v4();
    harness
        .state
        .store
        .upsert_membership(ProjectMember { project_id, user_id: viewer_id, role: Role::Viewer })
        .await
        .unwrap();

    let ctx = harness.ctx(org_id, project_id, viewer_id, Role::Viewer);
    let result = harness
        .call(
            "quoth_propose_update",
            json!({"doc_id": "viewer-attempt.md", "new_content": "should not land", "reasoning": "viewer trying anyway"}),
            &ctx,
        )
        .await;
    assert!(matches!(result, Err(QuothError::Forbidden(_))));

    let doc = harness
        .state
        .store
        .get_document_by_path(project_id, "viewer-attempt.md")
        .await
        .unwrap();
    assert!(doc.is_none());

    let _ = owner_id;
}

/// Proposals that require approval are staged rather than applied, and
/// only surface once the project's policy allows.
#[tokio::test]
async fn staged_proposal_awaits_approval_when_project_requires_it() {
    let harness = Harness::new().await;
    let (org_id, project_id, owner_id) = harness.seed_project(Tier::Pro, true).await;
    let ctx = harness.ctx(org_id, project_id, owner_id, Role::Editor);

    let staged = harness
        .call(
            "quoth_propose_update",
            json!({"doc_id": "needs-review.md", "new_content": "draft content", "reasoning": "first pass"}),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(staged["status"], "pending");
    assert_eq!(staged["is_new_document"], true);

    let doc = harness.state.store.get_document_by_path(project_id, "needs-review.md").await.unwrap();
    assert!(doc.is_none());
}
