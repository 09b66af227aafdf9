//! Database schema migrations.
//!
//! Creates every table in §3's entity set plus the pgvector column and
//! ANN/GIN indexes §6 relies on. Idempotent, the way the teacher's own
//! `migrate.rs` runs `CREATE TABLE IF NOT EXISTS` unconditionally rather
//! than tracking a migration version. Session state and per-day usage
//! counters are in-memory only (see `quoth_core::models::Session`,
//! `CounterValue`) and have no table here.

use anyhow::Result;
use sqlx::PgPool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await
}

pub async fn run_migrations_on(pool: &PgPool) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id UUID PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            owner_user_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY,
            slug TEXT NOT NULL,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            owner_user_id UUID NOT NULL,
            is_public BOOLEAN NOT NULL DEFAULT false,
            require_approval BOOLEAN NOT NULL DEFAULT true,
            tier TEXT NOT NULL DEFAULT 'free',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE(organization_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            default_project_id UUID
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_members (
            project_id UUID NOT NULL REFERENCES projects(id),
            user_id UUID NOT NULL REFERENCES users(id),
            role TEXT NOT NULL,
            PRIMARY KEY (project_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id),
            file_path TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            checksum TEXT NOT NULL,
            doc_type TEXT,
            visibility TEXT NOT NULL DEFAULT 'project',
            version BIGINT NOT NULL DEFAULT 0,
            last_updated TIMESTAMPTZ NOT NULL DEFAULT now(),
            agent_id UUID,
            UNIQUE(project_id, file_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No direct project_id column: chunk rows are scoped to a project
    // via their parent document, the way `document_chunks` in §3 holds
    // no tenant id of its own.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index BIGINT NOT NULL,
            content_chunk TEXT NOT NULL,
            chunk_hash TEXT NOT NULL,
            embedding_model TEXT NOT NULL,
            embedding vector(1536),
            language TEXT,
            start_line INTEGER,
            end_line INTEGER,
            parent_context TEXT,
            source TEXT NOT NULL,
            UNIQUE(document_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS proposals (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id),
            document_id UUID REFERENCES documents(id),
            file_path TEXT NOT NULL,
            original_content TEXT,
            proposed_content TEXT NOT NULL,
            reasoning TEXT NOT NULL,
            evidence_snippet TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            agent_id UUID,
            signature TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            agent_name TEXT NOT NULL,
            display_name TEXT,
            instance TEXT NOT NULL,
            model TEXT,
            role TEXT,
            capabilities JSONB NOT NULL DEFAULT '{}'::jsonb,
            status TEXT NOT NULL DEFAULT 'active',
            last_seen_at TIMESTAMPTZ,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            UNIQUE(organization_id, agent_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_project_assignments (
            agent_id UUID NOT NULL REFERENCES agents(id),
            project_id UUID NOT NULL REFERENCES projects(id),
            role TEXT NOT NULL,
            assigned_by UUID NOT NULL,
            PRIMARY KEY (agent_id, project_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_messages (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            from_agent_id UUID NOT NULL REFERENCES agents(id),
            to_agent_id UUID NOT NULL REFERENCES agents(id),
            message_type TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'normal',
            channel TEXT,
            reply_to UUID,
            payload JSONB NOT NULL DEFAULT '{}'::jsonb,
            signature TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            read_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_tasks (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            assigned_to UUID NOT NULL REFERENCES agents(id),
            created_by UUID NOT NULL REFERENCES agents(id),
            title TEXT NOT NULL,
            description TEXT,
            priority INTEGER NOT NULL DEFAULT 3,
            deadline TIMESTAMPTZ,
            payload JSONB NOT NULL DEFAULT '{}'::jsonb,
            status TEXT NOT NULL DEFAULT 'pending',
            result JSONB,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_events (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id),
            user_id UUID,
            event_type TEXT NOT NULL,
            query TEXT,
            document_id UUID,
            tool_name TEXT,
            patterns_matched INTEGER,
            drift_detected BOOLEAN NOT NULL DEFAULT false,
            result_count INTEGER,
            relevance_score REAL,
            response_time_ms INTEGER,
            file_path TEXT,
            context JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drift_events (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id),
            document_id UUID,
            severity TEXT NOT NULL,
            drift_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            doc_path TEXT,
            description TEXT NOT NULL,
            expected_pattern TEXT,
            actual_code TEXT,
            resolved BOOLEAN NOT NULL DEFAULT false,
            resolved_at TIMESTAMPTZ,
            resolved_by UUID,
            detected_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coverage_snapshots (
            id UUID PRIMARY KEY,
            project_id UUID NOT NULL REFERENCES projects(id),
            total_documentable BIGINT NOT NULL,
            total_documented BIGINT NOT NULL,
            coverage_percentage REAL NOT NULL,
            breakdown JSONB NOT NULL DEFAULT '{}'::jsonb,
            scan_type TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // ANN index for cosine-distance search (§6's `<=>` operator).
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_chunks_embedding ON document_chunks \
         USING hnsw (embedding vector_cosine_ops)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_chunks_document ON document_chunks(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_document_chunks_fts ON document_chunks
           USING gin (to_tsvector('english', content_chunk))"#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_agent_messages_inbox ON agent_messages(to_agent_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activity_events_project ON activity_events(project_id, created_at)",
    )
    .execute(pool)
    .await?;

    pool.close().await;
    Ok(())
}
