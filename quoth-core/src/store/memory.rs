//! In-memory [`Store`] implementation.
//!
//! Backs this crate's own tests and `quoth-server`'s integration tests.
//! Uses `HashMap`/`Vec` behind `std::sync::RwLock`; vector search is
//! brute-force cosine similarity, keyword search is substring matching —
//! both adequate at test scale, neither meant to be the production path
//! (that's `quoth-server::postgres_store`, backed by `pgvector` and GIN).

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::models::{
    Agent, AgentMessage, AgentProjectAssignment, AgentRole, AgentStatus, AgentTask, CoverageSnapshot,
    Document, DocumentChunk, DriftEvent, MessageStatus, Organization, Project, ProjectMember,
    Proposal, ProposalStatus, TaskStatus, Tier, User,
};

use super::{
    AccessibleProject, InboxMessage, KeywordMatch, StoredChunkHash, Store, VectorMatch,
};

#[derive(Default)]
struct Tables {
    organizations: HashMap<Uuid, Organization>,
    projects: HashMap<Uuid, Project>,
    users: HashMap<Uuid, User>,
    memberships: HashMap<(Uuid, Uuid), ProjectMember>,
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, DocumentChunk>,
    proposals: HashMap<Uuid, Proposal>,
    agents: HashMap<Uuid, Agent>,
    assignments: HashMap<(Uuid, Uuid), AgentProjectAssignment>,
    messages: HashMap<Uuid, AgentMessage>,
    tasks: HashMap<Uuid, AgentTask>,
    activity: Vec<crate::models::ActivityEvent>,
    drift: HashMap<Uuid, DriftEvent>,
    coverage: Vec<CoverageSnapshot>,
}

/// In-memory store for tests. Everything lives behind a single lock; this
/// is fine at test scale and keeps the implementation legible.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_organization(&self, org: Organization) -> Result<Organization> {
        let mut t = self.tables.write().unwrap();
        t.organizations.insert(org.id, org.clone());
        Ok(org)
    }

    async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>> {
        Ok(self.tables.read().unwrap().organizations.get(&id).cloned())
    }

    async fn organization_for_user(&self, user_id: Uuid) -> Result<Option<Organization>> {
        let t = self.tables.read().unwrap();
        if let Some(org) = t.organizations.values().find(|o| o.owner_user_id == user_id) {
            return Ok(Some(org.clone()));
        }
        let project_ids: Vec<Uuid> = t
            .memberships
            .keys()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(pid, _)| *pid)
            .collect();
        for pid in project_ids {
            if let Some(project) = t.projects.get(&pid) {
                if let Some(org) = t.organizations.get(&project.organization_id) {
                    return Ok(Some(org.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn create_project(&self, project: Project) -> Result<Project> {
        let mut t = self.tables.write().unwrap();
        t.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.tables.read().unwrap().projects.get(&id).cloned())
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .projects
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn update_project_tier(&self, project_id: Uuid, tier: Tier) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if let Some(p) = t.projects.get_mut(&project_id) {
            p.tier = tier;
        }
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().unwrap().users.get(&id).cloned())
    }

    async fn upsert_membership(&self, member: ProjectMember) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        t.memberships
            .insert((member.project_id, member.user_id), member);
        Ok(())
    }

    async fn get_membership(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<ProjectMember>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .memberships
            .get(&(project_id, user_id))
            .cloned())
    }

    async fn projects_for_user(&self, user_id: Uuid) -> Result<Vec<AccessibleProject>> {
        let t = self.tables.read().unwrap();
        let mut out = Vec::new();
        for ((project_id, uid), member) in t.memberships.iter() {
            if *uid != user_id {
                continue;
            }
            if let Some(project) = t.projects.get(project_id) {
                out.push(AccessibleProject {
                    project: project.clone(),
                    role: member.role,
                });
            }
        }
        Ok(out)
    }

    async fn get_document_by_path(&self, project_id: Uuid, file_path: &str) -> Result<Option<Document>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .documents
            .values()
            .find(|d| d.project_id == project_id && d.file_path == file_path)
            .cloned())
    }

    async fn get_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.tables.read().unwrap().documents.get(&id).cloned())
    }

    async fn find_document(&self, project_id: Uuid, query: &str) -> Result<Option<Document>> {
        let t = self.tables.read().unwrap();
        let in_project = || t.documents.values().filter(|d| d.project_id == project_id);

        if let Some(d) = in_project().find(|d| d.file_path == query || d.title == query) {
            return Ok(Some(d.clone()));
        }
        let needle = query.to_lowercase();
        let mut matches = in_project().filter(|d| {
            d.file_path.to_lowercase().contains(&needle) || d.title.to_lowercase().contains(&needle)
        });
        let first = matches.next().cloned();
        if matches.next().is_some() {
            // §4.5: substring match is limited to one result on ambiguity.
            return Ok(None);
        }
        Ok(first)
    }

    async fn find_shared_document(&self, organization_id: Uuid, query: &str) -> Result<Option<Document>> {
        let t = self.tables.read().unwrap();
        let project_ids: Vec<Uuid> = t
            .projects
            .values()
            .filter(|p| p.organization_id == organization_id)
            .map(|p| p.id)
            .collect();
        let needle = query.to_lowercase();
        Ok(t.documents
            .values()
            .find(|d| {
                matches!(d.visibility, crate::models::Visibility::Shared)
                    && project_ids.contains(&d.project_id)
                    && (d.file_path == query
                        || d.title == query
                        || d.file_path.to_lowercase().contains(&needle)
                        || d.title.to_lowercase().contains(&needle))
            })
            .cloned())
    }

    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<Document>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .documents
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn upsert_document(&self, mut doc: Document) -> Result<Document> {
        let mut t = self.tables.write().unwrap();
        let existing = t
            .documents
            .values()
            .find(|d| d.project_id == doc.project_id && d.file_path == doc.file_path)
            .cloned();
        if let Some(existing) = existing {
            doc.id = existing.id;
            doc.version = existing.version + 1;
        } else if doc.id.is_nil() {
            doc.id = Uuid::new_v4();
        }
        doc.last_updated = Utc::now();
        t.documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn stored_chunk_hashes(&self, document_id: Uuid) -> Result<Vec<StoredChunkHash>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| StoredChunkHash {
                chunk_id: c.id,
                chunk_hash: c.chunk_hash.clone(),
            })
            .collect())
    }

    async fn delete_chunks(&self, chunk_ids: &[Uuid]) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        for id in chunk_ids {
            t.chunks.remove(id);
        }
        Ok(())
    }

    async fn insert_chunk(&self, chunk: DocumentChunk) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        t.chunks.insert(chunk.id, chunk);
        Ok(())
    }

    async fn get_chunks_by_ids(&self, chunk_ids: &[Uuid], project_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let t = self.tables.read().unwrap();
        Ok(chunk_ids
            .iter()
            .filter_map(|id| t.chunks.get(id))
            .filter(|c| {
                t.documents
                    .get(&c.document_id)
                    .map(|d| d.project_id == project_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn match_documents(
        &self,
        project_id: Uuid,
        embedding_model: &str,
        query_embedding: &[f32],
        similarity_floor: f64,
        limit: i64,
    ) -> Result<Vec<VectorMatch>> {
        let t = self.tables.read().unwrap();
        let mut out: Vec<VectorMatch> = t
            .chunks
            .values()
            .filter(|c| c.embedding_model == embedding_model)
            .filter_map(|c| {
                let doc = t.documents.get(&c.document_id)?;
                if doc.project_id != project_id {
                    return None;
                }
                let sim = cosine_similarity(query_embedding, &c.embedding) as f64;
                if sim < similarity_floor {
                    return None;
                }
                Some(VectorMatch {
                    chunk_id: c.id,
                    document_id: doc.id,
                    title: doc.title.clone(),
                    file_path: doc.file_path.clone(),
                    content_chunk: c.content_chunk.clone(),
                    chunk_index: c.metadata.chunk_index,
                    similarity: sim,
                })
            })
            .collect();
        out.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn match_shared_documents(
        &self,
        organization_id: Uuid,
        embedding_model: &str,
        query_embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<VectorMatch>> {
        let t = self.tables.read().unwrap();
        let shared_project_ids: std::collections::HashSet<Uuid> = t
            .projects
            .values()
            .filter(|p| p.organization_id == organization_id)
            .map(|p| p.id)
            .collect();
        let mut out: Vec<VectorMatch> = t
            .chunks
            .values()
            .filter(|c| c.embedding_model == embedding_model)
            .filter_map(|c| {
                let doc = t.documents.get(&c.document_id)?;
                if !matches!(doc.visibility, crate::models::Visibility::Shared)
                    || !shared_project_ids.contains(&doc.project_id)
                {
                    return None;
                }
                let sim = cosine_similarity(query_embedding, &c.embedding) as f64;
                Some(VectorMatch {
                    chunk_id: c.id,
                    document_id: doc.id,
                    title: doc.title.clone(),
                    file_path: doc.file_path.clone(),
                    content_chunk: c.content_chunk.clone(),
                    chunk_index: c.metadata.chunk_index,
                    similarity: sim,
                })
            })
            .collect();
        out.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn keyword_search(&self, project_id: Uuid, tokens: &[String], limit: i64) -> Result<Vec<KeywordMatch>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let t = self.tables.read().unwrap();
        let mut out: Vec<KeywordMatch> = t
            .chunks
            .values()
            .filter_map(|c| {
                let doc = t.documents.get(&c.document_id)?;
                if doc.project_id != project_id {
                    return None;
                }
                let lower = c.content_chunk.to_lowercase();
                if tokens.iter().all(|tok| lower.contains(tok.as_str())) {
                    Some(KeywordMatch {
                        chunk_id: c.id,
                        document_id: doc.id,
                        title: doc.title.clone(),
                        file_path: doc.file_path.clone(),
                        content_chunk: c.content_chunk.clone(),
                        chunk_index: c.metadata.chunk_index,
                    })
                } else {
                    None
                }
            })
            .collect();
        out.sort_by_key(|m| m.chunk_index);
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn create_proposal(&self, proposal: Proposal) -> Result<Proposal> {
        let mut t = self.tables.write().unwrap();
        t.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    async fn get_proposal(&self, id: Uuid) -> Result<Option<Proposal>> {
        Ok(self.tables.read().unwrap().proposals.get(&id).cloned())
    }

    async fn set_proposal_status(&self, id: Uuid, status: ProposalStatus) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if let Some(p) = t.proposals.get_mut(&id) {
            p.status = status;
        }
        Ok(())
    }

    async fn list_proposals(&self, project_id: Uuid, status: Option<ProposalStatus>) -> Result<Vec<Proposal>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .proposals
            .values()
            .filter(|p| p.project_id == project_id && status.map(|s| s == p.status).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn create_agent(&self, agent: Agent) -> Result<Agent> {
        let mut t = self.tables.write().unwrap();
        t.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        Ok(self.tables.read().unwrap().agents.get(&id).cloned())
    }

    async fn get_agent_by_name(&self, organization_id: Uuid, agent_name: &str) -> Result<Option<Agent>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .agents
            .values()
            .find(|a| a.organization_id == organization_id && a.agent_name == agent_name)
            .cloned())
    }

    async fn update_agent(&self, agent: Agent) -> Result<Agent> {
        let mut t = self.tables.write().unwrap();
        t.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn set_agent_status(&self, id: Uuid, status: AgentStatus) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if let Some(a) = t.agents.get_mut(&id) {
            a.status = status;
        }
        Ok(())
    }

    async fn list_agents(&self, organization_id: Uuid) -> Result<Vec<Agent>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .agents
            .values()
            .filter(|a| a.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn resolve_agent(&self, organization_id: Uuid, agent_ref: &str) -> Result<Option<Agent>> {
        let t = self.tables.read().unwrap();
        if let Ok(id) = Uuid::parse_str(agent_ref) {
            if let Some(a) = t.agents.get(&id) {
                if a.organization_id == organization_id {
                    return Ok(Some(a.clone()));
                }
            }
        }
        Ok(t.agents
            .values()
            .find(|a| a.organization_id == organization_id && a.agent_name == agent_ref)
            .cloned())
    }

    async fn upsert_assignment(&self, assignment: AgentProjectAssignment) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        t.assignments
            .insert((assignment.agent_id, assignment.project_id), assignment);
        Ok(())
    }

    async fn remove_assignment(&self, agent_id: Uuid, project_id: Uuid) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        t.assignments.remove(&(agent_id, project_id));
        Ok(())
    }

    async fn list_assignments(&self, agent_id: Uuid) -> Result<Vec<(AgentProjectAssignment, AgentRole)>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.agent_id == agent_id)
            .map(|a| (a.clone(), a.role))
            .collect())
    }

    async fn insert_message(&self, message: AgentMessage) -> Result<AgentMessage> {
        let mut t = self.tables.write().unwrap();
        t.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn inbox(&self, agent_id: Uuid, limit: i64, status: Option<MessageStatus>) -> Result<Vec<InboxMessage>> {
        let t = self.tables.read().unwrap();
        let mut out: Vec<InboxMessage> = t
            .messages
            .values()
            .filter(|m| m.to_agent_id == agent_id && status.map(|s| s == m.status).unwrap_or(true))
            .map(|m| InboxMessage {
                message: m.clone(),
                from_agent_name: t
                    .agents
                    .get(&m.from_agent_id)
                    .map(|a| a.agent_name.clone())
                    .unwrap_or_default(),
            })
            .collect();
        out.sort_by(|a, b| b.message.created_at.cmp(&a.message.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn mark_messages_read(&self, ids: &[Uuid]) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        let now = Utc::now();
        for id in ids {
            if let Some(m) = t.messages.get_mut(id) {
                m.status = MessageStatus::Read;
                m.read_at = Some(now);
            }
        }
        Ok(())
    }

    async fn create_task(&self, task: AgentTask) -> Result<AgentTask> {
        let mut t = self.tables.write().unwrap();
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<AgentTask>> {
        Ok(self.tables.read().unwrap().tasks.get(&id).cloned())
    }

    async fn update_task(&self, task: AgentTask) -> Result<AgentTask> {
        let mut t = self.tables.write().unwrap();
        t.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn list_tasks(
        &self,
        organization_id: Uuid,
        assigned_to: Option<Uuid>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<AgentTask>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .tasks
            .values()
            .filter(|t| {
                t.organization_id == organization_id
                    && assigned_to.map(|a| a == t.assigned_to).unwrap_or(true)
                    && status.map(|s| s == t.status).unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn append_activity(&self, event: crate::models::ActivityEvent) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        t.activity.push(event);
        Ok(())
    }

    async fn activity_since(
        &self,
        project_id: Uuid,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<crate::models::ActivityEvent>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .activity
            .iter()
            .filter(|e| e.project_id == project_id && e.created_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_drift_event(&self, event: DriftEvent) -> Result<DriftEvent> {
        let mut t = self.tables.write().unwrap();
        t.drift.insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_drift_events(&self, project_id: Uuid, resolved: Option<bool>) -> Result<Vec<DriftEvent>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .drift
            .values()
            .filter(|d| d.project_id == project_id && resolved.map(|r| r == d.resolved).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn resolve_drift_event(&self, id: Uuid, resolved_by: Uuid) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if let Some(d) = t.drift.get_mut(&id) {
            d.resolved = true;
            d.resolved_at = Some(Utc::now());
            d.resolved_by = Some(resolved_by);
        }
        Ok(())
    }

    async fn insert_coverage_snapshot(&self, snapshot: CoverageSnapshot) -> Result<CoverageSnapshot> {
        let mut t = self.tables.write().unwrap();
        t.coverage.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn latest_coverage_snapshot(&self, project_id: Uuid) -> Result<Option<CoverageSnapshot>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .coverage
            .iter()
            .filter(|s| s.project_id == project_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, Role, Visibility};

    fn sample_project() -> Project {
        Project {
            id: Uuid::new_v4(),
            slug: "acme".into(),
            organization_id: Uuid::new_v4(),
            owner_user_id: Uuid::new_v4(),
            is_public: false,
            require_approval: false,
            tier: Tier::Free,
            created_at: Utc::now(),
        }
    }

    fn sample_document(project_id: Uuid, file_path: &str, content: &str) -> Document {
        Document {
            id: Uuid::nil(),
            project_id,
            file_path: file_path.to_string(),
            title: "Arch".to_string(),
            content: content.to_string(),
            checksum: Document::checksum_for(content),
            doc_type: Some(DocType::Architecture),
            visibility: Visibility::Project,
            version: 0,
            last_updated: Utc::now(),
            agent_id: None,
        }
    }

    #[tokio::test]
    async fn upsert_document_creates_then_bumps_version() {
        let store = InMemoryStore::new();
        let project = store.create_project(sample_project()).await.unwrap();

        let d1 = store
            .upsert_document(sample_document(project.id, "arch.md", "v1"))
            .await
            .unwrap();
        assert_eq!(d1.version, 0);

        let d2 = store
            .upsert_document(sample_document(project.id, "arch.md", "v2"))
            .await
            .unwrap();
        assert_eq!(d2.id, d1.id);
        assert_eq!(d2.version, 1);
    }

    #[tokio::test]
    async fn chunks_scoped_to_project_on_read() {
        let store = InMemoryStore::new();
        let p1 = store.create_project(sample_project()).await.unwrap();
        let p2 = store.create_project(sample_project()).await.unwrap();

        let doc = store
            .upsert_document(sample_document(p1.id, "arch.md", "content"))
            .await
            .unwrap();

        let chunk = DocumentChunk {
            id: Uuid::new_v4(),
            document_id: doc.id,
            content_chunk: "content".into(),
            chunk_hash: "h".into(),
            embedding: vec![1.0, 0.0],
            embedding_model: "text".into(),
            metadata: crate::models::ChunkMetadata {
                chunk_index: 0,
                language: None,
                start_line: None,
                end_line: None,
                parent_context: None,
                source: "test".into(),
            },
        };
        store.insert_chunk(chunk.clone()).await.unwrap();

        let visible = store.get_chunks_by_ids(&[chunk.id], p1.id).await.unwrap();
        assert_eq!(visible.len(), 1);

        let hidden = store.get_chunks_by_ids(&[chunk.id], p2.id).await.unwrap();
        assert!(hidden.is_empty());
    }

    #[tokio::test]
    async fn find_document_exact_then_substring_then_ambiguous() {
        let store = InMemoryStore::new();
        let project = store.create_project(sample_project()).await.unwrap();
        store
            .upsert_document(sample_document(project.id, "architecture/overview.md", "x"))
            .await
            .unwrap();

        let exact = store
            .find_document(project.id, "architecture/overview.md")
            .await
            .unwrap();
        assert!(exact.is_some());

        let substring = store.find_document(project.id, "overview").await.unwrap();
        assert!(substring.is_some());

        store
            .upsert_document(sample_document(project.id, "architecture/overview2.md", "y"))
            .await
            .unwrap();
        let ambiguous = store.find_document(project.id, "overview").await.unwrap();
        assert!(ambiguous.is_none());
    }

    #[tokio::test]
    async fn membership_role_lookup() {
        let store = InMemoryStore::new();
        let project = store.create_project(sample_project()).await.unwrap();
        let user_id = Uuid::new_v4();
        store
            .upsert_membership(ProjectMember {
                project_id: project.id,
                user_id,
                role: Role::Editor,
            })
            .await
            .unwrap();

        let accessible = store.projects_for_user(user_id).await.unwrap();
        assert_eq!(accessible.len(), 1);
        assert_eq!(accessible[0].role, Role::Editor);
    }
}
