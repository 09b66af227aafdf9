//! Storage abstraction (§3 entities, §6 stored procedures).
//!
//! [`Store`] is the single seam between the stateless algorithms in this
//! crate (chunking, cutoff/trust-band, tier table) and whatever durable
//! backend `quoth-server` is built against. Every method takes tenant ids
//! explicitly — the trait never assumes row-level security does the
//! filtering for it, per §6's "service-role access but tenant isolation in
//! every query" note.
//!
//! [`memory`] provides a full in-process implementation used by this
//! crate's own tests and by `quoth-server`'s integration tests; the
//! Postgres-backed implementation lives in `quoth-server::postgres_store`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    Agent, AgentMessage, AgentProjectAssignment, AgentRole, AgentStatus, AgentTask, Document,
    DocumentChunk, DriftEvent, MessageStatus, Organization, Project, ProjectMember, Proposal,
    ProposalStatus, TaskStatus, User,
};

/// A stored chunk hash paired with its stable id, as loaded for the
/// indexer's diff step (§4.4 step 6).
#[derive(Debug, Clone)]
pub struct StoredChunkHash {
    pub chunk_id: Uuid,
    pub chunk_hash: String,
}

/// A vector-search candidate as returned by `match_documents` (§6).
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub file_path: String,
    pub content_chunk: String,
    pub chunk_index: i64,
    pub similarity: f64,
}

/// A keyword full-text match; the fixed `0.5` fallback relevance (§4.5) is
/// applied by the caller, not carried here.
#[derive(Debug, Clone)]
pub struct KeywordMatch {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub file_path: String,
    pub content_chunk: String,
    pub chunk_index: i64,
}

/// A project the caller belongs to, as returned by [`Store::projects_for_user`]
/// (feeds C8's `available_projects`).
#[derive(Debug, Clone)]
pub struct AccessibleProject {
    pub project: Project,
    pub role: crate::models::Role,
}

/// An inbox row joined with the sender's display identity (§4.11 `inbox`).
#[derive(Debug, Clone)]
pub struct InboxMessage {
    pub message: AgentMessage,
    pub from_agent_name: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- organizations / projects / users ---------------------------------

    async fn create_organization(&self, org: Organization) -> Result<Organization>;
    async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>>;
    /// Whether `user_id` owns or is a member of any organization.
    async fn organization_for_user(&self, user_id: Uuid) -> Result<Option<Organization>>;

    async fn create_project(&self, project: Project) -> Result<Project>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>>;
    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>>;
    async fn update_project_tier(&self, project_id: Uuid, tier: crate::models::Tier) -> Result<()>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn upsert_membership(&self, member: ProjectMember) -> Result<()>;
    async fn get_membership(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<ProjectMember>>;
    /// Every project `user_id` can access, with their role in each — feeds
    /// the Session Manager's `available_projects` (§4.8).
    async fn projects_for_user(&self, user_id: Uuid) -> Result<Vec<AccessibleProject>>;

    // ---- documents / chunks -------------------------------------------------

    async fn get_document_by_path(&self, project_id: Uuid, file_path: &str) -> Result<Option<Document>>;
    async fn get_document_by_id(&self, id: Uuid) -> Result<Option<Document>>;
    /// §4.5 `read_document`: exact match by path or title, else a
    /// case-insensitive substring match limited to one result.
    async fn find_document(&self, project_id: Uuid, query: &str) -> Result<Option<Document>>;
    /// Second-pass lookup for `scope = org`: shared documents across every
    /// project of `organization_id`.
    async fn find_shared_document(&self, organization_id: Uuid, query: &str) -> Result<Option<Document>>;
    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<Document>>;

    /// Insert-or-update by `(project_id, file_path)`, bumping `version` on
    /// any content change (§4.4 step 4). Returns the persisted row.
    async fn upsert_document(&self, doc: Document) -> Result<Document>;

    async fn stored_chunk_hashes(&self, document_id: Uuid) -> Result<Vec<StoredChunkHash>>;
    async fn delete_chunks(&self, chunk_ids: &[Uuid]) -> Result<()>;
    async fn insert_chunk(&self, chunk: DocumentChunk) -> Result<()>;
    async fn get_chunks_by_ids(&self, chunk_ids: &[Uuid], project_id: Uuid) -> Result<Vec<DocumentChunk>>;

    /// `match_documents` (§6): nearest `limit` chunks by cosine distance
    /// for `(project_id, embedding_model)`, above `similarity_floor`.
    async fn match_documents(
        &self,
        project_id: Uuid,
        embedding_model: &str,
        query_embedding: &[f32],
        similarity_floor: f64,
        limit: i64,
    ) -> Result<Vec<VectorMatch>>;

    /// `match_shared_documents` (§6): same, scoped to `visibility = shared`
    /// documents across every project in `organization_id`.
    async fn match_shared_documents(
        &self,
        organization_id: Uuid,
        embedding_model: &str,
        query_embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<VectorMatch>>;

    /// AND-joined full-text search over chunk content, scoped to `project_id`.
    async fn keyword_search(&self, project_id: Uuid, tokens: &[String], limit: i64) -> Result<Vec<KeywordMatch>>;

    // ---- proposals -----------------------------------------------------------

    async fn create_proposal(&self, proposal: Proposal) -> Result<Proposal>;
    async fn get_proposal(&self, id: Uuid) -> Result<Option<Proposal>>;
    async fn set_proposal_status(&self, id: Uuid, status: ProposalStatus) -> Result<()>;
    async fn list_proposals(&self, project_id: Uuid, status: Option<ProposalStatus>) -> Result<Vec<Proposal>>;

    // ---- agents / assignments / bus ------------------------------------------

    async fn create_agent(&self, agent: Agent) -> Result<Agent>;
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>>;
    async fn get_agent_by_name(&self, organization_id: Uuid, agent_name: &str) -> Result<Option<Agent>>;
    async fn update_agent(&self, agent: Agent) -> Result<Agent>;
    async fn set_agent_status(&self, id: Uuid, status: AgentStatus) -> Result<()>;
    async fn list_agents(&self, organization_id: Uuid) -> Result<Vec<Agent>>;
    /// Resolves either a UUID string or an `agent_name` within the org, per
    /// §4.11 `send`'s `to` resolution.
    async fn resolve_agent(&self, organization_id: Uuid, agent_ref: &str) -> Result<Option<Agent>>;

    async fn upsert_assignment(&self, assignment: AgentProjectAssignment) -> Result<()>;
    async fn remove_assignment(&self, agent_id: Uuid, project_id: Uuid) -> Result<()>;
    async fn list_assignments(&self, agent_id: Uuid) -> Result<Vec<(AgentProjectAssignment, AgentRole)>>;

    async fn insert_message(&self, message: AgentMessage) -> Result<AgentMessage>;
    async fn inbox(&self, agent_id: Uuid, limit: i64, status: Option<MessageStatus>) -> Result<Vec<InboxMessage>>;
    async fn mark_messages_read(&self, ids: &[Uuid]) -> Result<()>;

    async fn create_task(&self, task: AgentTask) -> Result<AgentTask>;
    async fn get_task(&self, id: Uuid) -> Result<Option<AgentTask>>;
    async fn update_task(&self, task: AgentTask) -> Result<AgentTask>;
    async fn list_tasks(
        &self,
        organization_id: Uuid,
        assigned_to: Option<Uuid>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<AgentTask>>;

    // ---- activity / drift / coverage ------------------------------------------

    async fn append_activity(&self, event: crate::models::ActivityEvent) -> Result<()>;
    /// Activity events for `project_id` in `[since, now)`, most recent last.
    async fn activity_since(
        &self,
        project_id: Uuid,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<crate::models::ActivityEvent>>;

    async fn insert_drift_event(&self, event: DriftEvent) -> Result<DriftEvent>;
    async fn list_drift_events(&self, project_id: Uuid, resolved: Option<bool>) -> Result<Vec<DriftEvent>>;
    async fn resolve_drift_event(&self, id: Uuid, resolved_by: Uuid) -> Result<()>;

    async fn insert_coverage_snapshot(
        &self,
        snapshot: crate::models::CoverageSnapshot,
    ) -> Result<crate::models::CoverageSnapshot>;
    async fn latest_coverage_snapshot(&self, project_id: Uuid) -> Result<Option<crate::models::CoverageSnapshot>>;
}

/// Today's date in UTC — the rollover boundary for §3's usage counters.
pub fn today_utc() -> NaiveDate {
    chrono::Utc::now().date_naive()
}
