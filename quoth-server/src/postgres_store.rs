//! Postgres-backed [`Store`] implementation.
//!
//! Maps every [`Store`] method onto parameterized SQL against the schema
//! created by [`crate::migrate`], the way the teacher's `SqliteStore` maps
//! onto its own schema — transactional delete-then-insert for chunks
//! (mirroring the teacher's `replace_chunks`), ANN search via pgvector's
//! `<=>` operator instead of the teacher's in-process cosine loop.
//!
//! Enum columns are stored as their serde `snake_case` text (`"pending"`,
//! `"editor"`, ...) via [`enum_str`]/[`enum_from_str`] rather than native
//! Postgres enum types, so adding a variant never requires an `ALTER TYPE`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use quoth_core::models::{
    Agent, AgentMessage, AgentProjectAssignment, AgentRole, AgentStatus, AgentTask, ChunkMetadata,
    CoverageSnapshot, DocType, Document, DocumentChunk, DriftEvent, MessageStatus, Organization,
    Project, ProjectMember, Proposal, ProposalStatus, Role, TaskStatus, Tier, Visibility,
};
use quoth_core::store::{
    AccessibleProject, InboxMessage, KeywordMatch, Store, StoredChunkHash, VectorMatch,
};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(dead_code)]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn enum_str<T: Serialize>(v: &T) -> String {
    match serde_json::to_value(v).expect("enums always serialize") {
        serde_json::Value::String(s) => s,
        other => unreachable!("enum serialized to non-string {other}"),
    }
}

fn enum_from_str<T: DeserializeOwned>(s: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        s.to_string(),
    ))?)
}

fn pgvector_literal(embedding: &[f32]) -> String {
    let mut s = String::with_capacity(embedding.len() * 8 + 2);
    s.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&v.to_string());
    }
    s.push(']');
    s
}

#[async_trait]
impl Store for PostgresStore {
    // ---- organizations / projects / users ---------------------------------

    async fn create_organization(&self, org: Organization) -> Result<Organization> {
        sqlx::query(
            "INSERT INTO organizations (id, slug, name, owner_user_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(org.id)
        .bind(&org.slug)
        .bind(&org.name)
        .bind(org.owner_user_id)
        .bind(org.created_at)
        .execute(&self.pool)
        .await?;
        Ok(org)
    }

    async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, slug, name, owner_user_id, created_at FROM organizations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Organization {
            id: r.get("id"),
            slug: r.get("slug"),
            name: r.get("name"),
            owner_user_id: r.get("owner_user_id"),
            created_at: r.get("created_at"),
        }))
    }

    async fn organization_for_user(&self, user_id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query(
            r#"
            SELECT o.id, o.slug, o.name, o.owner_user_id, o.created_at
            FROM organizations o
            WHERE o.owner_user_id = $1
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(r) = row {
            return Ok(Some(Organization {
                id: r.get("id"),
                slug: r.get("slug"),
                name: r.get("name"),
                owner_user_id: r.get("owner_user_id"),
                created_at: r.get("created_at"),
            }));
        }

        let row = sqlx::query(
            r#"
            SELECT o.id, o.slug, o.name, o.owner_user_id, o.created_at
            FROM organizations o
            JOIN projects p ON p.organization_id = o.id
            JOIN project_members pm ON pm.project_id = p.id
            WHERE pm.user_id = $1
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Organization {
            id: r.get("id"),
            slug: r.get("slug"),
            name: r.get("name"),
            owner_user_id: r.get("owner_user_id"),
            created_at: r.get("created_at"),
        }))
    }

    async fn create_project(&self, project: Project) -> Result<Project> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, slug, organization_id, owner_user_id, is_public,
                                   require_approval, tier, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(project.id)
        .bind(&project.slug)
        .bind(project.organization_id)
        .bind(project.owner_user_id)
        .bind(project.is_public)
        .bind(project.require_approval)
        .bind(enum_str(&project.tier))
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, slug, organization_id, owner_user_id, is_public, require_approval, tier, created_at \
             FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(project_from_row).transpose()
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, slug, organization_id, owner_user_id, is_public, require_approval, tier, created_at \
             FROM projects WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.map(project_from_row).transpose()
    }

    async fn update_project_tier(&self, project_id: Uuid, tier: Tier) -> Result<()> {
        sqlx::query("UPDATE projects SET tier = $1 WHERE id = $2")
            .bind(enum_str(&tier))
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<quoth_core::models::User>> {
        let row = sqlx::query("SELECT id, email, default_project_id FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| quoth_core::models::User {
            id: r.get("id"),
            email: r.get("email"),
            default_project_id: r.get("default_project_id"),
        }))
    }

    async fn upsert_membership(&self, member: ProjectMember) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO project_members (project_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (project_id, user_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(member.project_id)
        .bind(member.user_id)
        .bind(enum_str(&member.role))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_membership(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<ProjectMember>> {
        let row = sqlx::query(
            "SELECT project_id, user_id, role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(membership_from_row).transpose()
    }

    async fn projects_for_user(&self, user_id: Uuid) -> Result<Vec<AccessibleProject>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.slug, p.organization_id, p.owner_user_id, p.is_public, p.require_approval,
                   p.tier, p.created_at, pm.role
            FROM projects p
            JOIN project_members pm ON pm.project_id = p.id
            WHERE pm.user_id = $1
            ORDER BY p.slug
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let role_str: String = r.get("role");
                Ok(AccessibleProject {
                    project: project_from_row_ref(&r)?,
                    role: enum_from_str::<Role>(&role_str)?,
                })
            })
            .collect()
    }

    // ---- documents / chunks -------------------------------------------------

    async fn get_document_by_path(&self, project_id: Uuid, file_path: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"SELECT id, project_id, file_path, title, content, checksum, doc_type, visibility,
                      version, last_updated, agent_id
               FROM documents WHERE project_id = $1 AND file_path = $2"#,
        )
        .bind(project_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(document_from_row).transpose()
    }

    async fn get_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"SELECT id, project_id, file_path, title, content, checksum, doc_type, visibility,
                      version, last_updated, agent_id
               FROM documents WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(document_from_row).transpose()
    }

    async fn find_document(&self, project_id: Uuid, query: &str) -> Result<Option<Document>> {
        if let Some(doc) = self.get_document_by_path(project_id, query).await? {
            return Ok(Some(doc));
        }
        let rows = sqlx::query(
            r#"SELECT id, project_id, file_path, title, content, checksum, doc_type, visibility,
                      version, last_updated, agent_id
               FROM documents
               WHERE project_id = $1 AND (title ILIKE $2 OR file_path ILIKE $2)
               LIMIT 2"#,
        )
        .bind(project_id)
        .bind(format!("%{query}%"))
        .fetch_all(&self.pool)
        .await?;
        if rows.len() == 1 {
            document_from_row(rows.into_iter().next().unwrap()).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn find_shared_document(&self, organization_id: Uuid, query: &str) -> Result<Option<Document>> {
        let rows = sqlx::query(
            r#"SELECT d.id, d.project_id, d.file_path, d.title, d.content, d.checksum, d.doc_type,
                      d.visibility, d.version, d.last_updated, d.agent_id
               FROM documents d
               JOIN projects p ON p.id = d.project_id
               WHERE p.organization_id = $1 AND d.visibility = 'shared'
                 AND (d.title ILIKE $2 OR d.file_path ILIKE $2)
               LIMIT 2"#,
        )
        .bind(organization_id)
        .bind(format!("%{query}%"))
        .fetch_all(&self.pool)
        .await?;
        if rows.len() == 1 {
            document_from_row(rows.into_iter().next().unwrap()).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"SELECT id, project_id, file_path, title, content, checksum, doc_type, visibility,
                      version, last_updated, agent_id
               FROM documents WHERE project_id = $1 ORDER BY file_path"#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(document_from_row).collect()
    }

    async fn upsert_document(&self, doc: Document) -> Result<Document> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, file_path, title, content, checksum, doc_type,
                                    visibility, version, last_updated, agent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (project_id, file_path) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                checksum = excluded.checksum,
                doc_type = excluded.doc_type,
                visibility = excluded.visibility,
                version = documents.version + 1,
                last_updated = excluded.last_updated,
                agent_id = excluded.agent_id
            RETURNING id, project_id, file_path, title, content, checksum, doc_type, visibility,
                      version, last_updated, agent_id
            "#,
        )
        .bind(doc.id)
        .bind(doc.project_id)
        .bind(&doc.file_path)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.checksum)
        .bind(doc.doc_type.as_ref().map(enum_str))
        .bind(enum_str(&doc.visibility))
        .bind(doc.version)
        .bind(doc.last_updated)
        .bind(doc.agent_id)
        .fetch_one(&self.pool)
        .await?;
        document_from_row(row)
    }

    async fn stored_chunk_hashes(&self, document_id: Uuid) -> Result<Vec<StoredChunkHash>> {
        let rows = sqlx::query("SELECT id, chunk_hash FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| StoredChunkHash {
                chunk_id: r.get("id"),
                chunk_hash: r.get("chunk_hash"),
            })
            .collect())
    }

    async fn delete_chunks(&self, chunk_ids: &[Uuid]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM document_chunks WHERE id = ANY($1)")
            .bind(chunk_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: DocumentChunk) -> Result<()> {
        let embedding_literal = pgvector_literal(&chunk.embedding);
        sqlx::query(
            r#"
            INSERT INTO document_chunks
                (id, document_id, chunk_index, content_chunk, chunk_hash, embedding_model,
                 embedding, language, start_line, end_line, parent_context, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7::vector, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(chunk.id)
        .bind(chunk.document_id)
        .bind(chunk.metadata.chunk_index)
        .bind(&chunk.content_chunk)
        .bind(&chunk.chunk_hash)
        .bind(&chunk.embedding_model)
        .bind(embedding_literal)
        .bind(&chunk.metadata.language)
        .bind(chunk.metadata.start_line.map(|v| v as i32))
        .bind(chunk.metadata.end_line.map(|v| v as i32))
        .bind(&chunk.metadata.parent_context)
        .bind(&chunk.metadata.source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chunks_by_ids(&self, chunk_ids: &[Uuid], project_id: Uuid) -> Result<Vec<DocumentChunk>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content_chunk, c.chunk_hash,
                   c.embedding_model, c.language, c.start_line, c.end_line, c.parent_context, c.source
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.id = ANY($1) AND d.project_id = $2
            ORDER BY c.chunk_index
            "#,
        )
        .bind(chunk_ids)
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(chunk_from_row_no_embedding).collect()
    }

    async fn match_documents(
        &self,
        project_id: Uuid,
        embedding_model: &str,
        query_embedding: &[f32],
        similarity_floor: f64,
        limit: i64,
    ) -> Result<Vec<VectorMatch>> {
        let embedding_literal = pgvector_literal(query_embedding);
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, d.title, d.file_path, c.content_chunk, c.chunk_index,
                   1 - (c.embedding <=> $1::vector) AS similarity
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.project_id = $2 AND c.embedding_model = $3
              AND 1 - (c.embedding <=> $1::vector) >= $4
            ORDER BY c.embedding <=> $1::vector
            LIMIT $5
            "#,
        )
        .bind(&embedding_literal)
        .bind(project_id)
        .bind(embedding_model)
        .bind(similarity_floor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| VectorMatch {
                chunk_id: r.get("chunk_id"),
                document_id: r.get("document_id"),
                title: r.get("title"),
                file_path: r.get("file_path"),
                content_chunk: r.get("content_chunk"),
                chunk_index: r.get("chunk_index"),
                similarity: r.get("similarity"),
            })
            .collect())
    }

    async fn match_shared_documents(
        &self,
        organization_id: Uuid,
        embedding_model: &str,
        query_embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<VectorMatch>> {
        let embedding_literal = pgvector_literal(query_embedding);
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, d.title, d.file_path, c.content_chunk, c.chunk_index,
                   1 - (c.embedding <=> $1::vector) AS similarity
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            JOIN projects p ON p.id = d.project_id
            WHERE p.organization_id = $2 AND d.visibility = 'shared' AND c.embedding_model = $3
            ORDER BY c.embedding <=> $1::vector
            LIMIT $4
            "#,
        )
        .bind(&embedding_literal)
        .bind(organization_id)
        .bind(embedding_model)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| VectorMatch {
                chunk_id: r.get("chunk_id"),
                document_id: r.get("document_id"),
                title: r.get("title"),
                file_path: r.get("file_path"),
                content_chunk: r.get("content_chunk"),
                chunk_index: r.get("chunk_index"),
                similarity: r.get("similarity"),
            })
            .collect())
    }

    async fn keyword_search(&self, project_id: Uuid, tokens: &[String], limit: i64) -> Result<Vec<KeywordMatch>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let tsquery = tokens.join(" & ");
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, d.title, d.file_path, c.content_chunk, c.chunk_index
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.project_id = $1 AND to_tsvector('english', c.content_chunk) @@ to_tsquery('english', $2)
            LIMIT $3
            "#,
        )
        .bind(project_id)
        .bind(tsquery)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| KeywordMatch {
                chunk_id: r.get("chunk_id"),
                document_id: r.get("document_id"),
                title: r.get("title"),
                file_path: r.get("file_path"),
                content_chunk: r.get("content_chunk"),
                chunk_index: r.get("chunk_index"),
            })
            .collect())
    }

    // ---- proposals -----------------------------------------------------------

    async fn create_proposal(&self, proposal: Proposal) -> Result<Proposal> {
        sqlx::query(
            r#"
            INSERT INTO proposals (id, project_id, document_id, file_path, original_content,
                                    proposed_content, reasoning, evidence_snippet, status, agent_id,
                                    signature, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.project_id)
        .bind(proposal.document_id)
        .bind(&proposal.file_path)
        .bind(&proposal.original_content)
        .bind(&proposal.proposed_content)
        .bind(&proposal.reasoning)
        .bind(&proposal.evidence_snippet)
        .bind(enum_str(&proposal.status))
        .bind(proposal.agent_id)
        .bind(&proposal.signature)
        .bind(proposal.created_at)
        .execute(&self.pool)
        .await?;
        Ok(proposal)
    }

    async fn get_proposal(&self, id: Uuid) -> Result<Option<Proposal>> {
        let row = sqlx::query(
            r#"SELECT id, project_id, document_id, file_path, original_content, proposed_content,
                      reasoning, evidence_snippet, status, agent_id, signature, created_at
               FROM proposals WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(proposal_from_row).transpose()
    }

    async fn set_proposal_status(&self, id: Uuid, status: ProposalStatus) -> Result<()> {
        sqlx::query("UPDATE proposals SET status = $1 WHERE id = $2")
            .bind(enum_str(&status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_proposals(&self, project_id: Uuid, status: Option<ProposalStatus>) -> Result<Vec<Proposal>> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    r#"SELECT id, project_id, document_id, file_path, original_content, proposed_content,
                              reasoning, evidence_snippet, status, agent_id, signature, created_at
                       FROM proposals WHERE project_id = $1 AND status = $2 ORDER BY created_at DESC"#,
                )
                .bind(project_id)
                .bind(enum_str(&s))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT id, project_id, document_id, file_path, original_content, proposed_content,
                              reasoning, evidence_snippet, status, agent_id, signature, created_at
                       FROM proposals WHERE project_id = $1 ORDER BY created_at DESC"#,
                )
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(proposal_from_row).collect()
    }

    // ---- agents / assignments / bus ------------------------------------------

    async fn create_agent(&self, agent: Agent) -> Result<Agent> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, organization_id, agent_name, display_name, instance, model,
                                 role, capabilities, status, last_seen_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(agent.id)
        .bind(agent.organization_id)
        .bind(&agent.agent_name)
        .bind(&agent.display_name)
        .bind(&agent.instance)
        .bind(&agent.model)
        .bind(&agent.role)
        .bind(&agent.capabilities)
        .bind(enum_str(&agent.status))
        .bind(agent.last_seen_at)
        .bind(&agent.metadata)
        .execute(&self.pool)
        .await?;
        Ok(agent)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        let row = sqlx::query(
            r#"SELECT id, organization_id, agent_name, display_name, instance, model, role,
                      capabilities, status, last_seen_at, metadata
               FROM agents WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(agent_from_row).transpose()
    }

    async fn get_agent_by_name(&self, organization_id: Uuid, agent_name: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            r#"SELECT id, organization_id, agent_name, display_name, instance, model, role,
                      capabilities, status, last_seen_at, metadata
               FROM agents WHERE organization_id = $1 AND agent_name = $2"#,
        )
        .bind(organization_id)
        .bind(agent_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(agent_from_row).transpose()
    }

    async fn update_agent(&self, agent: Agent) -> Result<Agent> {
        sqlx::query(
            r#"UPDATE agents SET display_name = $1, model = $2, role = $3, capabilities = $4,
                      status = $5, metadata = $6 WHERE id = $7"#,
        )
        .bind(&agent.display_name)
        .bind(&agent.model)
        .bind(&agent.role)
        .bind(&agent.capabilities)
        .bind(enum_str(&agent.status))
        .bind(&agent.metadata)
        .bind(agent.id)
        .execute(&self.pool)
        .await?;
        Ok(agent)
    }

    async fn set_agent_status(&self, id: Uuid, status: AgentStatus) -> Result<()> {
        sqlx::query("UPDATE agents SET status = $1 WHERE id = $2")
            .bind(enum_str(&status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_agents(&self, organization_id: Uuid) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            r#"SELECT id, organization_id, agent_name, display_name, instance, model, role,
                      capabilities, status, last_seen_at, metadata
               FROM agents WHERE organization_id = $1 ORDER BY agent_name"#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(agent_from_row).collect()
    }

    async fn resolve_agent(&self, organization_id: Uuid, agent_ref: &str) -> Result<Option<Agent>> {
        if let Ok(id) = Uuid::parse_str(agent_ref) {
            if let Some(agent) = self.get_agent(id).await? {
                if agent.organization_id == organization_id {
                    return Ok(Some(agent));
                }
                return Ok(None);
            }
        }
        self.get_agent_by_name(organization_id, agent_ref).await
    }

    async fn upsert_assignment(&self, assignment: AgentProjectAssignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_project_assignments (agent_id, project_id, role, assigned_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (agent_id, project_id) DO UPDATE SET role = excluded.role, assigned_by = excluded.assigned_by
            "#,
        )
        .bind(assignment.agent_id)
        .bind(assignment.project_id)
        .bind(enum_str(&assignment.role))
        .bind(assignment.assigned_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_assignment(&self, agent_id: Uuid, project_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM agent_project_assignments WHERE agent_id = $1 AND project_id = $2")
            .bind(agent_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_assignments(&self, agent_id: Uuid) -> Result<Vec<(AgentProjectAssignment, AgentRole)>> {
        let rows = sqlx::query(
            "SELECT agent_id, project_id, role, assigned_by FROM agent_project_assignments WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                let role_str: String = r.get("role");
                let role = enum_from_str::<AgentRole>(&role_str)?;
                Ok((
                    AgentProjectAssignment {
                        agent_id: r.get("agent_id"),
                        project_id: r.get("project_id"),
                        role,
                        assigned_by: r.get("assigned_by"),
                    },
                    role,
                ))
            })
            .collect()
    }

    async fn insert_message(&self, message: AgentMessage) -> Result<AgentMessage> {
        sqlx::query(
            r#"
            INSERT INTO agent_messages
                (id, organization_id, from_agent_id, to_agent_id, message_type, priority, channel,
                 reply_to, payload, signature, status, created_at, read_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(message.id)
        .bind(message.organization_id)
        .bind(message.from_agent_id)
        .bind(message.to_agent_id)
        .bind(enum_str(&message.message_type))
        .bind(enum_str(&message.priority))
        .bind(&message.channel)
        .bind(message.reply_to)
        .bind(&message.payload)
        .bind(&message.signature)
        .bind(enum_str(&message.status))
        .bind(message.created_at)
        .bind(message.read_at)
        .execute(&self.pool)
        .await?;
        Ok(message)
    }

    async fn inbox(&self, agent_id: Uuid, limit: i64, status: Option<MessageStatus>) -> Result<Vec<InboxMessage>> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    r#"
                    SELECT m.id, m.organization_id, m.from_agent_id, m.to_agent_id, m.message_type,
                           m.priority, m.channel, m.reply_to, m.payload, m.signature, m.status,
                           m.created_at, m.read_at, a.agent_name
                    FROM agent_messages m
                    JOIN agents a ON a.id = m.from_agent_id
                    WHERE m.to_agent_id = $1 AND m.status = $2
                    ORDER BY m.created_at DESC
                    LIMIT $3
                    "#,
                )
                .bind(agent_id)
                .bind(enum_str(&s))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT m.id, m.organization_id, m.from_agent_id, m.to_agent_id, m.message_type,
                           m.priority, m.channel, m.reply_to, m.payload, m.signature, m.status,
                           m.created_at, m.read_at, a.agent_name
                    FROM agent_messages m
                    JOIN agents a ON a.id = m.from_agent_id
                    WHERE m.to_agent_id = $1
                    ORDER BY m.created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(agent_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|r| {
                let from_agent_name: String = r.get("agent_name");
                Ok(InboxMessage {
                    message: message_from_row(r)?,
                    from_agent_name,
                })
            })
            .collect()
    }

    async fn mark_messages_read(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE agent_messages SET status = 'read', read_at = now() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_task(&self, task: AgentTask) -> Result<AgentTask> {
        sqlx::query(
            r#"
            INSERT INTO agent_tasks (id, organization_id, assigned_to, created_by, title, description,
                                      priority, deadline, payload, status, result, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(task.id)
        .bind(task.organization_id)
        .bind(task.assigned_to)
        .bind(task.created_by)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority)
        .bind(task.deadline)
        .bind(&task.payload)
        .bind(enum_str(&task.status))
        .bind(&task.result)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<AgentTask>> {
        let row = sqlx::query(
            r#"SELECT id, organization_id, assigned_to, created_by, title, description, priority,
                      deadline, payload, status, result, started_at, completed_at
               FROM agent_tasks WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(task_from_row).transpose()
    }

    async fn update_task(&self, task: AgentTask) -> Result<AgentTask> {
        sqlx::query(
            r#"UPDATE agent_tasks SET assigned_to = $1, status = $2, result = $3, started_at = $4,
                      completed_at = $5 WHERE id = $6"#,
        )
        .bind(task.assigned_to)
        .bind(enum_str(&task.status))
        .bind(&task.result)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn list_tasks(
        &self,
        organization_id: Uuid,
        assigned_to: Option<Uuid>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<AgentTask>> {
        let rows = sqlx::query(
            r#"SELECT id, organization_id, assigned_to, created_by, title, description, priority,
                      deadline, payload, status, result, started_at, completed_at
               FROM agent_tasks
               WHERE organization_id = $1
                 AND ($2::uuid IS NULL OR assigned_to = $2)
                 AND ($3::text IS NULL OR status = $3)
               ORDER BY priority, deadline NULLS LAST"#,
        )
        .bind(organization_id)
        .bind(assigned_to)
        .bind(status.map(|s| enum_str(&s)))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(task_from_row).collect()
    }

    // ---- activity / drift / coverage ------------------------------------------

    async fn append_activity(&self, event: quoth_core::models::ActivityEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_events
                (id, project_id, user_id, event_type, query, document_id, tool_name, patterns_matched,
                 drift_detected, result_count, relevance_score, response_time_ms, file_path, context,
                 created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(event.id)
        .bind(event.project_id)
        .bind(event.user_id)
        .bind(enum_str(&event.event_type))
        .bind(&event.query)
        .bind(event.document_id)
        .bind(&event.tool_name)
        .bind(event.patterns_matched)
        .bind(event.drift_detected)
        .bind(event.result_count)
        .bind(event.relevance_score)
        .bind(event.response_time_ms)
        .bind(&event.file_path)
        .bind(&event.context)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activity_since(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<quoth_core::models::ActivityEvent>> {
        let rows = sqlx::query(
            r#"SELECT id, project_id, user_id, event_type, query, document_id, tool_name,
                      patterns_matched, drift_detected, result_count, relevance_score,
                      response_time_ms, file_path, context, created_at
               FROM activity_events WHERE project_id = $1 AND created_at >= $2
               ORDER BY created_at ASC"#,
        )
        .bind(project_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(activity_from_row).collect()
    }

    async fn insert_drift_event(&self, event: DriftEvent) -> Result<DriftEvent> {
        sqlx::query(
            r#"
            INSERT INTO drift_events (id, project_id, document_id, severity, drift_type, file_path,
                                       doc_path, description, expected_pattern, actual_code, resolved,
                                       resolved_at, resolved_by, detected_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(event.id)
        .bind(event.project_id)
        .bind(event.document_id)
        .bind(enum_str(&event.severity))
        .bind(enum_str(&event.drift_type))
        .bind(&event.file_path)
        .bind(&event.doc_path)
        .bind(&event.description)
        .bind(&event.expected_pattern)
        .bind(&event.actual_code)
        .bind(event.resolved)
        .bind(event.resolved_at)
        .bind(event.resolved_by)
        .bind(event.detected_at)
        .execute(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_drift_events(&self, project_id: Uuid, resolved: Option<bool>) -> Result<Vec<DriftEvent>> {
        let rows = sqlx::query(
            r#"SELECT id, project_id, document_id, severity, drift_type, file_path, doc_path,
                      description, expected_pattern, actual_code, resolved, resolved_at, resolved_by,
                      detected_at
               FROM drift_events
               WHERE project_id = $1 AND ($2::bool IS NULL OR resolved = $2)
               ORDER BY detected_at DESC"#,
        )
        .bind(project_id)
        .bind(resolved)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(drift_from_row).collect()
    }

    async fn resolve_drift_event(&self, id: Uuid, resolved_by: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE drift_events SET resolved = true, resolved_by = $1, resolved_at = now() WHERE id = $2",
        )
        .bind(resolved_by)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_coverage_snapshot(&self, snapshot: CoverageSnapshot) -> Result<CoverageSnapshot> {
        sqlx::query(
            r#"
            INSERT INTO coverage_snapshots
                (id, project_id, total_documentable, total_documented, coverage_percentage, breakdown,
                 scan_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.project_id)
        .bind(snapshot.total_documentable)
        .bind(snapshot.total_documented)
        .bind(snapshot.coverage_percentage)
        .bind(&snapshot.breakdown)
        .bind(enum_str(&snapshot.scan_type))
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(snapshot)
    }

    async fn latest_coverage_snapshot(&self, project_id: Uuid) -> Result<Option<CoverageSnapshot>> {
        let row = sqlx::query(
            r#"SELECT id, project_id, total_documentable, total_documented, coverage_percentage,
                      breakdown, scan_type, created_at
               FROM coverage_snapshots WHERE project_id = $1 ORDER BY created_at DESC LIMIT 1"#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(coverage_from_row).transpose()
    }
}

fn project_from_row(r: sqlx::postgres::PgRow) -> Result<Project> {
    project_from_row_ref(&r)
}

fn project_from_row_ref(r: &sqlx::postgres::PgRow) -> Result<Project> {
    let tier: String = r.get("tier");
    Ok(Project {
        id: r.get("id"),
        slug: r.get("slug"),
        organization_id: r.get("organization_id"),
        owner_user_id: r.get("owner_user_id"),
        is_public: r.get("is_public"),
        require_approval: r.get("require_approval"),
        tier: enum_from_str(&tier)?,
        created_at: r.get("created_at"),
    })
}

fn membership_from_row(r: sqlx::postgres::PgRow) -> Result<ProjectMember> {
    let role: String = r.get("role");
    Ok(ProjectMember {
        project_id: r.get("project_id"),
        user_id: r.get("user_id"),
        role: enum_from_str(&role)?,
    })
}

fn document_from_row(r: sqlx::postgres::PgRow) -> Result<Document> {
    let doc_type: Option<String> = r.get("doc_type");
    let visibility: String = r.get("visibility");
    Ok(Document {
        id: r.get("id"),
        project_id: r.get("project_id"),
        file_path: r.get("file_path"),
        title: r.get("title"),
        content: r.get("content"),
        checksum: r.get("checksum"),
        doc_type: doc_type.map(|s| enum_from_str::<DocType>(&s)).transpose()?,
        visibility: enum_from_str::<Visibility>(&visibility)?,
        version: r.get("version"),
        last_updated: r.get("last_updated"),
        agent_id: r.get("agent_id"),
    })
}

fn chunk_from_row_no_embedding(r: sqlx::postgres::PgRow) -> Result<DocumentChunk> {
    let start_line: Option<i32> = r.get("start_line");
    let end_line: Option<i32> = r.get("end_line");
    Ok(DocumentChunk {
        id: r.get("id"),
        document_id: r.get("document_id"),
        content_chunk: r.get("content_chunk"),
        chunk_hash: r.get("chunk_hash"),
        // The caller already has the query embedding; re-fetching and
        // decoding the stored vector is wasted work for chunk reads, so
        // this path leaves it empty, matching the teacher's own
        // `get_document` projection (selected columns only).
        embedding: Vec::new(),
        embedding_model: r.get("embedding_model"),
        metadata: ChunkMetadata {
            chunk_index: r.get("chunk_index"),
            language: r.get("language"),
            start_line: start_line.map(|v| v as u32),
            end_line: end_line.map(|v| v as u32),
            parent_context: r.get("parent_context"),
            source: r.get("source"),
        },
    })
}

fn proposal_from_row(r: sqlx::postgres::PgRow) -> Result<Proposal> {
    let status: String = r.get("status");
    Ok(Proposal {
        id: r.get("id"),
        project_id: r.get("project_id"),
        document_id: r.get("document_id"),
        file_path: r.get("file_path"),
        original_content: r.get("original_content"),
        proposed_content: r.get("proposed_content"),
        reasoning: r.get("reasoning"),
        evidence_snippet: r.get("evidence_snippet"),
        status: enum_from_str(&status)?,
        agent_id: r.get("agent_id"),
        signature: r.get("signature"),
        created_at: r.get("created_at"),
    })
}

fn agent_from_row(r: sqlx::postgres::PgRow) -> Result<Agent> {
    let status: String = r.get("status");
    Ok(Agent {
        id: r.get("id"),
        organization_id: r.get("organization_id"),
        agent_name: r.get("agent_name"),
        display_name: r.get("display_name"),
        instance: r.get("instance"),
        model: r.get("model"),
        role: r.get("role"),
        capabilities: r.get("capabilities"),
        status: enum_from_str(&status)?,
        last_seen_at: r.get("last_seen_at"),
        metadata: r.get("metadata"),
    })
}

fn message_from_row(r: sqlx::postgres::PgRow) -> Result<AgentMessage> {
    let message_type: String = r.get("message_type");
    let priority: String = r.get("priority");
    let status: String = r.get("status");
    Ok(AgentMessage {
        id: r.get("id"),
        organization_id: r.get("organization_id"),
        from_agent_id: r.get("from_agent_id"),
        to_agent_id: r.get("to_agent_id"),
        message_type: enum_from_str(&message_type)?,
        priority: enum_from_str(&priority)?,
        channel: r.get("channel"),
        reply_to: r.get("reply_to"),
        payload: r.get("payload"),
        signature: r.get("signature"),
        status: enum_from_str(&status)?,
        created_at: r.get("created_at"),
        read_at: r.get("read_at"),
    })
}

fn task_from_row(r: sqlx::postgres::PgRow) -> Result<AgentTask> {
    let status: String = r.get("status");
    Ok(AgentTask {
        id: r.get("id"),
        organization_id: r.get("organization_id"),
        assigned_to: r.get("assigned_to"),
        created_by: r.get("created_by"),
        title: r.get("title"),
        description: r.get("description"),
        priority: r.get("priority"),
        deadline: r.get("deadline"),
        payload: r.get("payload"),
        status: enum_from_str(&status)?,
        result: r.get("result"),
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
    })
}

fn activity_from_row(r: sqlx::postgres::PgRow) -> Result<quoth_core::models::ActivityEvent> {
    let event_type: String = r.get("event_type");
    Ok(quoth_core::models::ActivityEvent {
        id: r.get("id"),
        project_id: r.get("project_id"),
        user_id: r.get("user_id"),
        event_type: enum_from_str(&event_type)?,
        query: r.get("query"),
        document_id: r.get("document_id"),
        tool_name: r.get("tool_name"),
        patterns_matched: r.get("patterns_matched"),
        drift_detected: r.get("drift_detected"),
        result_count: r.get("result_count"),
        relevance_score: r.get("relevance_score"),
        response_time_ms: r.get("response_time_ms"),
        file_path: r.get("file_path"),
        context: r.get("context"),
        created_at: r.get("created_at"),
    })
}

fn drift_from_row(r: sqlx::postgres::PgRow) -> Result<DriftEvent> {
    let severity: String = r.get("severity");
    let drift_type: String = r.get("drift_type");
    Ok(DriftEvent {
        id: r.get("id"),
        project_id: r.get("project_id"),
        document_id: r.get("document_id"),
        severity: enum_from_str(&severity)?,
        drift_type: enum_from_str(&drift_type)?,
        file_path: r.get("file_path"),
        doc_path: r.get("doc_path"),
        description: r.get("description"),
        expected_pattern: r.get("expected_pattern"),
        actual_code: r.get("actual_code"),
        resolved: r.get("resolved"),
        resolved_at: r.get("resolved_at"),
        resolved_by: r.get("resolved_by"),
        detected_at: r.get("detected_at"),
    })
}

fn coverage_from_row(r: sqlx::postgres::PgRow) -> Result<CoverageSnapshot> {
    let scan_type: String = r.get("scan_type");
    Ok(CoverageSnapshot {
        id: r.get("id"),
        project_id: r.get("project_id"),
        total_documentable: r.get("total_documentable"),
        total_documented: r.get("total_documented"),
        coverage_percentage: r.get("coverage_percentage"),
        breakdown: r.get("breakdown"),
        scan_type: enum_from_str(&scan_type)?,
        created_at: r.get("created_at"),
    })
}
