//! Tool Dispatcher (C9, §4.9).
//!
//! The ~19 MCP tools spec.md's table lists, registered in a
//! `Vec<Box<dyn Tool>>` keyed by name. Grounded directly in the teacher's
//! `Tool`/`ToolContext`/`ToolRegistry` triad in `traits.rs`, generalized
//! from three built-in tools (search/get/sources) to this workspace's
//! full tool table, and from a single `Arc<Config>` context to one that
//! also carries the resolved tenant (project, role, organization) and the
//! collaborators every tool needs (store, retrieval, tier meter, indexer,
//! proposal engine, agent bus, activity log, analytics).
//!
//! Every tool call follows §4.9's four-step contract: resolve tenant (done
//! by the caller before `execute` runs, since it's shared across every
//! tool), enforce role authority (done inside `execute`, tool by tool),
//! record timing via the activity log regardless of outcome (done by the
//! dispatch loop in `mcp.rs`, not here), and return a JSON-renderable
//! result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use quoth_core::models::{
    Agent, AgentRole, AgentStatus, MessageStatus, MessageType, Organization, Priority, Project,
    ProjectMember, Role, TaskStatus, Tier,
};
use quoth_core::store::Store;
use quoth_core::QuothError;

use crate::activity::ActivityLogger;
use crate::agent_bus::AgentBus;
use crate::analytics::Analytics;
use crate::auth::{issue_internal_token, AuthRecord};
use crate::config::Config;
use crate::genesis;
use crate::indexer::Indexer;
use crate::proposal::{ProposalEngine, ProposalOutcome, ProposalRequest};
use crate::retrieval::{ReadScope, RetrievalPipeline};
use crate::session::SessionManager;
use crate::tier_cache::TierMeter;

/// Collaborators every tool draws on, shared across every connection.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub retrieval: Arc<RetrievalPipeline>,
    pub tier_meter: Arc<TierMeter>,
    pub indexer: Arc<Indexer>,
    pub proposals: Arc<ProposalEngine>,
    pub agent_bus: Arc<AgentBus>,
    pub activity: ActivityLogger,
    pub analytics: Arc<Analytics>,
    /// Root of the read-only on-disk template tree (§4.9
    /// `quoth_list_templates`/`quoth_get_template`).
    pub templates_dir: PathBuf,
}

/// Per-call context: the shared state plus the tenant this particular
/// call resolved to via the Session Manager (C8).
pub struct ToolContext {
    pub state: Arc<AppState>,
    pub connection_id: String,
    pub auth: AuthRecord,
    pub project_id: Uuid,
    pub role: Role,
    pub organization_id: Uuid,
    pub cancel: CancellationToken,
}

impl ToolContext {
    fn require_propose(&self) -> Result<(), QuothError> {
        if !self.role.can_propose() {
            return Err(QuothError::Forbidden("viewers cannot modify project state".to_string()));
        }
        Ok(())
    }

    fn require_approve(&self) -> Result<(), QuothError> {
        if !self.role.can_approve() {
            return Err(QuothError::Forbidden("only admins may approve or reject proposals".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError>;
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn with_builtins() -> Self {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(SearchIndexTool),
            Box::new(ReadDocTool),
            Box::new(ReadChunksTool),
            Box::new(ProposeUpdateTool),
            Box::new(ListTemplatesTool),
            Box::new(GetTemplateTool),
            Box::new(ListAccountsTool),
            Box::new(SwitchAccountTool),
            Box::new(GuidelinesTool),
            Box::new(ProjectCreateTool),
            Box::new(GenesisTool),
            Box::new(AgentRegisterTool),
            Box::new(AgentUpdateTool),
            Box::new(AgentRemoveTool),
            Box::new(AgentListTool),
            Box::new(AgentAssignProjectTool),
            Box::new(AgentUnassignProjectTool),
            Box::new(AgentMessageTool),
            Box::new(AgentInboxTool),
            Box::new(TaskCreateTool),
            Box::new(TaskUpdateTool),
        ];
        Self { tools }
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }
}

// ───────────────────────── validation helpers ─────────────────────────

fn field_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, QuothError> {
    field_str(params, key).filter(|s| !s.trim().is_empty()).ok_or_else(|| {
        QuothError::ValidationError(format!("`{key}` is required"))
    })
}

fn require_str_max<'a>(params: &'a Value, key: &str, max_len: usize) -> Result<&'a str, QuothError> {
    let s = require_str(params, key)?;
    if s.len() > max_len {
        return Err(QuothError::ValidationError(format!(
            "`{key}` must be at most {max_len} characters"
        )));
    }
    Ok(s)
}

fn require_uuid(params: &Value, key: &str) -> Result<Uuid, QuothError> {
    let s = require_str(params, key)?;
    Uuid::parse_str(s).map_err(|_| QuothError::ValidationError(format!("`{key}` is not a valid id")))
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn parse_enum_field<T: DeserializeOwned>(params: &Value, key: &str) -> Result<Option<T>, QuothError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|_| QuothError::ValidationError(format!("`{key}` has an invalid value"))),
    }
}

// ───────────────────────── quoth_search_index ─────────────────────────

struct SearchIndexTool;

#[async_trait]
impl Tool for SearchIndexTool {
    fn name(&self) -> &'static str {
        "quoth_search_index"
    }
    fn description(&self) -> &'static str {
        "Semantic search over the active project's documentation, optionally widened to the organization's shared documents."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "maxLength": 1000},
                "scope": {"type": "string", "enum": ["project", "shared", "org"], "default": "project"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let query = require_str_max(&params, "query", 1000)?;
        let scope = field_str(&params, "scope").unwrap_or("project");

        if scope == "shared" || scope == "org" {
            let items = ctx
                .state
                .retrieval
                .search_shared(ctx.organization_id, query, &ctx.cancel)
                .await?;
            return Ok(json!({ "results": items, "scope": "shared" }));
        }

        let outcome = ctx
            .state
            .retrieval
            .search_documents(ctx.project_id, query, false, &ctx.cancel)
            .await?;
        Ok(json!({
            "results": outcome.items,
            "used_fallback": outcome.used_fallback,
            "tier_message": outcome.tier_message,
            "scope": "project",
        }))
    }
}

// ───────────────────────── quoth_read_doc ─────────────────────────

struct ReadDocTool;

#[async_trait]
impl Tool for ReadDocTool {
    fn name(&self) -> &'static str {
        "quoth_read_doc"
    }
    fn description(&self) -> &'static str {
        "Read a full document by path, title, or a substring match."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "doc_id": {"type": "string", "maxLength": 500},
                "scope": {"type": "string", "enum": ["project", "org"], "default": "project"}
            },
            "required": ["doc_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let doc_id = require_str_max(&params, "doc_id", 500)?;
        let scope = match field_str(&params, "scope") {
            Some("org") => ReadScope::Org { organization_id: ctx.organization_id },
            _ => ReadScope::Project,
        };

        let document = ctx.state.retrieval.read_document(ctx.project_id, doc_id, scope).await?;
        Ok(serde_json::to_value(document).map_err(|e| QuothError::Internal(e.into()))?)
    }
}

// ───────────────────────── quoth_read_chunks ─────────────────────────

struct ReadChunksTool;

#[async_trait]
impl Tool for ReadChunksTool {
    fn name(&self) -> &'static str {
        "quoth_read_chunks"
    }
    fn description(&self) -> &'static str {
        "Read specific chunks by id, grouped implicitly by document and ordered by chunk_index."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chunk_ids": {"type": "array", "items": {"type": "string"}, "minItems": 1, "maxItems": 20}
            },
            "required": ["chunk_ids"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let raw_ids = params
            .get("chunk_ids")
            .and_then(|v| v.as_array())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| QuothError::ValidationError("`chunk_ids` must be a non-empty array".to_string()))?;

        let ids: Vec<Uuid> = raw_ids
            .iter()
            .map(|v| {
                v.as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| QuothError::ValidationError("`chunk_ids` entries must be valid ids".to_string()))
            })
            .collect::<Result<_, _>>()?;

        let chunks = ctx.state.retrieval.read_chunks(ctx.project_id, &ids).await?;
        Ok(json!({ "chunks": chunks }))
    }
}

// ───────────────────────── quoth_propose_update ─────────────────────────

struct ProposeUpdateTool;

#[async_trait]
impl Tool for ProposeUpdateTool {
    fn name(&self) -> &'static str {
        "quoth_propose_update"
    }
    fn description(&self) -> &'static str {
        "Propose a new or updated document; applied immediately or staged for approval depending on the project's policy."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "doc_id": {"type": "string", "maxLength": 500},
                "new_content": {"type": "string", "maxLength": 512000},
                "evidence_snippet": {"type": "string", "maxLength": 10240},
                "reasoning": {"type": "string", "maxLength": 5000},
                "agent_id": {"type": "string"},
                "visibility": {"type": "string", "enum": ["project", "shared"]}
            },
            "required": ["doc_id", "new_content", "reasoning"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let file_path = require_str_max(&params, "doc_id", 500)?.to_string();
        let proposed_content = require_str_max(&params, "new_content", 500 * 1024)?.to_string();
        let reasoning = require_str_max(&params, "reasoning", 5000)?.to_string();
        let evidence_snippet = match field_str(&params, "evidence_snippet") {
            Some(s) if s.len() > 10 * 1024 => {
                return Err(QuothError::ValidationError("`evidence_snippet` must be at most 10KB".to_string()))
            }
            Some(s) => s.to_string(),
            None => String::new(),
        };
        let agent_id = match field_str(&params, "agent_id") {
            Some(s) => Some(Uuid::parse_str(s).map_err(|_| QuothError::ValidationError("`agent_id` is not a valid id".to_string()))?),
            None => None,
        };

        let outcome = ctx
            .state
            .proposals
            .propose(ProposalRequest {
                project_id: ctx.project_id,
                role: ctx.role,
                file_path,
                proposed_content,
                reasoning,
                evidence_snippet,
                agent_id,
            })
            .await?;

        match outcome {
            ProposalOutcome::Applied(sync) => Ok(json!({
                "status": "applied",
                "document_id": sync.document.id,
                "chunks_added": sync.chunks_added,
                "chunks_reused": sync.chunks_reused,
                "chunks_removed": sync.chunks_removed,
                "no_op": sync.no_op,
            })),
            ProposalOutcome::Staged(proposal) => Ok(json!({
                "status": "pending",
                "proposal_id": proposal.id,
                "is_new_document": proposal.is_new_document(),
            })),
        }
    }
}

// ───────────────────────── quoth_list_templates / quoth_get_template ─────────────────────────

struct ListTemplatesTool;

#[async_trait]
impl Tool for ListTemplatesTool {
    fn name(&self) -> &'static str {
        "quoth_list_templates"
    }
    fn description(&self) -> &'static str {
        "List the on-disk documentation template inventory, optionally filtered by category."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": {"type": "string", "enum": ["all", "architecture", "patterns", "contracts"], "default": "all"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let category = field_str(&params, "category").unwrap_or("all");
        let templates = list_templates(&ctx.state.templates_dir, category)?;
        Ok(json!({ "templates": templates }))
    }
}

struct GetTemplateTool;

#[async_trait]
impl Tool for GetTemplateTool {
    fn name(&self) -> &'static str {
        "quoth_get_template"
    }
    fn description(&self) -> &'static str {
        "Fetch the content of a single documentation template by id (its relative path)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"template_id": {"type": "string"}},
            "required": ["template_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let template_id = require_str(&params, "template_id")?;
        let path = safe_template_path(&ctx.state.templates_dir, template_id)?;
        let content = std::fs::read_to_string(&path)
            .map_err(|_| QuothError::NotFound(format!("template {template_id}")))?;
        Ok(json!({ "template_id": template_id, "content": content }))
    }
}

fn safe_template_path(root: &Path, template_id: &str) -> Result<PathBuf, QuothError> {
    if template_id.contains("..") {
        return Err(QuothError::ValidationError("`template_id` must not contain `..`".to_string()));
    }
    Ok(root.join(template_id))
}

fn list_templates(root: &Path, category: &str) -> Result<Vec<String>, QuothError> {
    let scan_root = if category == "all" { root.to_path_buf() } else { root.join(category) };
    let mut out = Vec::new();
    walk_templates(root, &scan_root, &mut out);
    out.sort();
    Ok(out)
}

fn walk_templates(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_templates(root, &path, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

// ───────────────────────── quoth_list_accounts / quoth_switch_account ─────────────────────────

struct ListAccountsTool;

#[async_trait]
impl Tool for ListAccountsTool {
    fn name(&self) -> &'static str {
        "quoth_list_accounts"
    }
    fn description(&self) -> &'static str {
        "List the connection's accessible project accounts and the currently active one."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let view = ctx
            .state
            .sessions
            .list_accounts(&ctx.connection_id)
            .ok_or(QuothError::Unauthenticated)?;
        Ok(json!({
            "active_project_id": view.active_project_id,
            "accounts": view.accounts.iter().map(|a| json!({"project_id": a.project_id, "role": a.role})).collect::<Vec<_>>(),
        }))
    }
}

struct SwitchAccountTool;

#[async_trait]
impl Tool for SwitchAccountTool {
    fn name(&self) -> &'static str {
        "quoth_switch_account"
    }
    fn description(&self) -> &'static str {
        "Switch the connection's active project to one the caller already has access to."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"project_id": {"type": "string"}},
            "required": ["project_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let project_id = require_uuid(&params, "project_id")?;
        match ctx.state.sessions.switch(&ctx.connection_id, project_id) {
            Ok((active_project_id, role)) => Ok(json!({"active_project_id": active_project_id, "role": role})),
            Err(QuothError::NotFound(_)) => {
                let view = ctx.state.sessions.list_accounts(&ctx.connection_id);
                Ok(json!({
                    "error": "project not in the caller's accessible set",
                    "accounts": view.map(|v| v.accounts.iter().map(|a| json!({"project_id": a.project_id, "role": a.role})).collect::<Vec<_>>()),
                }))
            }
            Err(e) => Err(e),
        }
    }
}

// ───────────────────────── quoth_guidelines ─────────────────────────

struct GuidelinesTool;

const GUIDELINES_CODE: &str = "Write code that matches the surrounding module's idioms. Prefer explicit error types over panics. Keep functions focused on one responsibility.";
const GUIDELINES_REVIEW: &str = "Check for missing tests, unchecked error paths, and tenant-isolation gaps before approving a change.";
const GUIDELINES_DOCUMENT: &str = "Write one document per logical topic. Lead with the invariant, not a narrative. Keep examples runnable.";

#[async_trait]
impl Tool for GuidelinesTool {
    fn name(&self) -> &'static str {
        "quoth_guidelines"
    }
    fn description(&self) -> &'static str {
        "Canonical guideline text for the requested mode, compact by default."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {"type": "string", "enum": ["code", "review", "document"]},
                "full": {"type": "boolean", "default": false}
            },
            "required": ["mode"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, QuothError> {
        let mode = require_str(&params, "mode")?;
        let full = params.get("full").and_then(|v| v.as_bool()).unwrap_or(false);
        let base = match mode {
            "code" => GUIDELINES_CODE,
            "review" => GUIDELINES_REVIEW,
            "document" => GUIDELINES_DOCUMENT,
            _ => return Err(QuothError::ValidationError("`mode` must be one of code, review, document".to_string())),
        };
        let text = if full {
            format!("{base}\n\nThese guidelines apply uniformly across every project this connection can access.")
        } else {
            base.to_string()
        };
        Ok(json!({ "mode": mode, "guidelines": text }))
    }
}

// ───────────────────────── quoth_project_create ─────────────────────────

struct ProjectCreateTool;

#[async_trait]
impl Tool for ProjectCreateTool {
    fn name(&self) -> &'static str {
        "quoth_project_create"
    }
    fn description(&self) -> &'static str {
        "Create a new project, auto-assigning the caller as admin; creates an organization for the caller first if they have none."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "slug": {"type": "string", "pattern": "^[a-z0-9-]+$"},
                "github_repo": {"type": "string"},
                "is_public": {"type": "boolean", "default": false}
            },
            "required": ["name", "slug"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let name = require_str(&params, "name")?.to_string();
        let slug = require_str(&params, "slug")?.to_string();
        if !is_valid_slug(&slug) {
            return Err(QuothError::ValidationError("`slug` must contain only lowercase letters, digits, and hyphens".to_string()));
        }
        let is_public = params.get("is_public").and_then(|v| v.as_bool()).unwrap_or(false);

        if ctx.state.store.get_project_by_slug(&slug).await.map_err(QuothError::Internal)?.is_some() {
            return Err(QuothError::Conflict(format!("slug `{slug}` is already taken")));
        }

        let organization = match ctx
            .state
            .store
            .organization_for_user(ctx.auth.user_id)
            .await
            .map_err(QuothError::Internal)?
        {
            Some(org) => org,
            None => ctx
                .state
                .store
                .create_organization(Organization {
                    id: Uuid::new_v4(),
                    slug: format!("{slug}-org"),
                    name: name.clone(),
                    owner_user_id: ctx.auth.user_id,
                    created_at: chrono::Utc::now(),
                })
                .await
                .map_err(QuothError::Internal)?,
        };

        let project = ctx
            .state
            .store
            .create_project(Project {
                id: Uuid::new_v4(),
                slug,
                organization_id: organization.id,
                owner_user_id: ctx.auth.user_id,
                is_public,
                require_approval: true,
                tier: Tier::Free,
                created_at: chrono::Utc::now(),
            })
            .await
            .map_err(QuothError::Internal)?;

        ctx.state
            .store
            .upsert_membership(ProjectMember {
                project_id: project.id,
                user_id: ctx.auth.user_id,
                role: Role::Admin,
            })
            .await
            .map_err(QuothError::Internal)?;

        let token = issue_internal_token(&ctx.state.config, project.id, ctx.auth.user_id, Role::Admin)
            .map_err(QuothError::Internal)?;

        Ok(json!({ "project": project, "token": token }))
    }
}

// ───────────────────────── quoth_genesis ─────────────────────────

struct GenesisTool;

#[async_trait]
impl Tool for GenesisTool {
    fn name(&self) -> &'static str {
        "quoth_genesis"
    }
    fn description(&self) -> &'static str {
        "Returns the Genesis Architect bootstrap prompt, parameterized by focus and language hint."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "focus": {"type": "string", "enum": ["full_scan", "update_only"], "default": "full_scan"},
                "language_hint": {"type": "string"}
            }
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, QuothError> {
        let focus = field_str(&params, "focus").unwrap_or("full_scan");
        let scope_text = (focus == "update_only").then_some("areas already covered by existing documentation");
        let language_hint = field_str(&params, "language_hint");
        let prompt = genesis::build(scope_text, language_hint);
        Ok(json!({ "system": prompt.system, "tools": prompt.tools }))
    }
}

// ───────────────────────── agent tools ─────────────────────────

struct AgentRegisterTool;

#[async_trait]
impl Tool for AgentRegisterTool {
    fn name(&self) -> &'static str {
        "quoth_agent_register"
    }
    fn description(&self) -> &'static str {
        "Register a new agent identity within the active project's organization."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_name": {"type": "string"},
                "instance": {"type": "string"},
                "display_name": {"type": "string"},
                "model": {"type": "string"},
                "role": {"type": "string"},
                "capabilities": {"type": "object"},
                "metadata": {"type": "object"}
            },
            "required": ["agent_name", "instance"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agent_name = require_str(&params, "agent_name")?.to_string();

        if ctx
            .state
            .store
            .get_agent_by_name(ctx.organization_id, &agent_name)
            .await
            .map_err(QuothError::Internal)?
            .is_some()
        {
            return Err(QuothError::Conflict(format!("agent `{agent_name}` already registered")));
        }

        let agent = ctx
            .state
            .store
            .create_agent(Agent {
                id: Uuid::new_v4(),
                organization_id: ctx.organization_id,
                agent_name,
                display_name: field_str(&params, "display_name").map(String::from),
                instance: require_str(&params, "instance")?.to_string(),
                model: field_str(&params, "model").map(String::from),
                role: field_str(&params, "role").map(String::from),
                capabilities: params.get("capabilities").cloned().unwrap_or(Value::Null),
                status: AgentStatus::Active,
                last_seen_at: None,
                metadata: params.get("metadata").cloned().unwrap_or(Value::Null),
            })
            .await
            .map_err(QuothError::Internal)?;

        Ok(json!({ "agent": agent }))
    }
}

struct AgentUpdateTool;

#[async_trait]
impl Tool for AgentUpdateTool {
    fn name(&self) -> &'static str {
        "quoth_agent_update"
    }
    fn description(&self) -> &'static str {
        "Update an agent's mutable fields."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "display_name": {"type": "string"},
                "model": {"type": "string"},
                "role": {"type": "string"},
                "capabilities": {"type": "object"},
                "metadata": {"type": "object"},
                "status": {"type": "string", "enum": ["active", "inactive", "archived"]}
            },
            "required": ["agent_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agent_id = require_uuid(&params, "agent_id")?;
        let mut agent = ctx
            .state
            .store
            .get_agent(agent_id)
            .await
            .map_err(QuothError::Internal)?
            .ok_or_else(|| QuothError::NotFound(format!("agent {agent_id}")))?;

        if let Some(v) = field_str(&params, "display_name") {
            agent.display_name = Some(v.to_string());
        }
        if let Some(v) = field_str(&params, "model") {
            agent.model = Some(v.to_string());
        }
        if let Some(v) = field_str(&params, "role") {
            agent.role = Some(v.to_string());
        }
        if let Some(v) = params.get("capabilities") {
            agent.capabilities = v.clone();
        }
        if let Some(v) = params.get("metadata") {
            agent.metadata = v.clone();
        }
        if let Some(status) = parse_enum_field(&params, "status")? {
            agent.status = status;
        }

        let updated = ctx.state.store.update_agent(agent).await.map_err(QuothError::Internal)?;
        Ok(json!({ "agent": updated }))
    }
}

struct AgentRemoveTool;

#[async_trait]
impl Tool for AgentRemoveTool {
    fn name(&self) -> &'static str {
        "quoth_agent_remove"
    }
    fn description(&self) -> &'static str {
        "Archive an agent, preserving its history."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"agent_id": {"type": "string"}},
            "required": ["agent_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agent_id = require_uuid(&params, "agent_id")?;
        ctx.state
            .store
            .set_agent_status(agent_id, AgentStatus::Archived)
            .await
            .map_err(QuothError::Internal)?;
        Ok(json!({ "agent_id": agent_id, "status": "archived" }))
    }
}

struct AgentListTool;

#[async_trait]
impl Tool for AgentListTool {
    fn name(&self) -> &'static str {
        "quoth_agent_list"
    }
    fn description(&self) -> &'static str {
        "List every agent registered in the active organization."
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agents = ctx.state.store.list_agents(ctx.organization_id).await.map_err(QuothError::Internal)?;
        Ok(json!({ "agents": agents }))
    }
}

struct AgentAssignProjectTool;

#[async_trait]
impl Tool for AgentAssignProjectTool {
    fn name(&self) -> &'static str {
        "quoth_agent_assign_project"
    }
    fn description(&self) -> &'static str {
        "Upsert an agent's role assignment within a project."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "project_id": {"type": "string"},
                "role": {"type": "string", "enum": ["owner", "contributor", "readonly"], "default": "contributor"}
            },
            "required": ["agent_id", "project_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agent_id = require_uuid(&params, "agent_id")?;
        let project_id = require_uuid(&params, "project_id")?;
        let role: AgentRole = parse_enum_field(&params, "role")?.unwrap_or(AgentRole::Contributor);

        ctx.state
            .agent_bus
            .upsert_assignment(agent_id, project_id, role, ctx.auth.user_id)
            .await?;
        Ok(json!({ "agent_id": agent_id, "project_id": project_id, "role": role }))
    }
}

struct AgentUnassignProjectTool;

#[async_trait]
impl Tool for AgentUnassignProjectTool {
    fn name(&self) -> &'static str {
        "quoth_agent_unassign_project"
    }
    fn description(&self) -> &'static str {
        "Remove an agent's assignment from a project."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"agent_id": {"type": "string"}, "project_id": {"type": "string"}},
            "required": ["agent_id", "project_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agent_id = require_uuid(&params, "agent_id")?;
        let project_id = require_uuid(&params, "project_id")?;
        ctx.state.agent_bus.remove_assignment(agent_id, project_id).await?;
        Ok(json!({ "agent_id": agent_id, "project_id": project_id, "removed": true }))
    }
}

struct AgentMessageTool;

#[async_trait]
impl Tool for AgentMessageTool {
    fn name(&self) -> &'static str {
        "quoth_agent_message"
    }
    fn description(&self) -> &'static str {
        "Send a signed message to another agent in the active organization."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": {"type": "string"},
                "to": {"type": "string"},
                "message": {"type": "object"},
                "type": {"type": "string", "enum": ["message", "task", "result", "alert", "knowledge", "curator"], "default": "message"},
                "priority": {"type": "string", "enum": ["low", "normal", "high", "urgent"], "default": "normal"},
                "channel": {"type": "string"},
                "reply_to": {"type": "string"}
            },
            "required": ["from", "to", "message"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let from_agent_id = require_uuid(&params, "from")?;
        let to = require_str(&params, "to")?;
        let payload = params.get("message").cloned().unwrap_or(Value::Null);
        let message_type: MessageType = parse_enum_field(&params, "type")?.unwrap_or(MessageType::Message);
        let priority: Priority = parse_enum_field(&params, "priority")?.unwrap_or(Priority::Normal);
        let channel = field_str(&params, "channel").map(String::from);
        let reply_to = match field_str(&params, "reply_to") {
            Some(s) => Some(Uuid::parse_str(s).map_err(|_| QuothError::ValidationError("`reply_to` is not a valid id".to_string()))?),
            None => None,
        };

        let message = ctx
            .state
            .agent_bus
            .send(ctx.organization_id, from_agent_id, to, message_type, priority, channel, reply_to, payload)
            .await?;
        Ok(json!({ "message_id": message.id, "status": message.status }))
    }
}

struct AgentInboxTool;

#[async_trait]
impl Tool for AgentInboxTool {
    fn name(&self) -> &'static str {
        "quoth_agent_inbox"
    }
    fn description(&self) -> &'static str {
        "Read an agent's inbox, optionally marking the returned messages read."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string"},
                "limit": {"type": "integer", "default": 10},
                "status": {"type": "string", "enum": ["pending", "delivered", "read", "failed"]},
                "mark_read": {"type": "boolean", "default": false}
            },
            "required": ["agent"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let agent_id = require_uuid(&params, "agent")?;
        let limit = params.get("limit").and_then(|v| v.as_i64()).unwrap_or(10);
        let status: Option<MessageStatus> = parse_enum_field(&params, "status")?;
        let mark_read = params.get("mark_read").and_then(|v| v.as_bool()).unwrap_or(false);

        let messages = ctx.state.agent_bus.inbox(agent_id, limit, status, mark_read).await?;
        Ok(json!({
            "messages": messages.iter().map(|m| json!({
                "message": m.message,
                "from_agent_name": m.from_agent_name,
            })).collect::<Vec<_>>()
        }))
    }
}

// ───────────────────────── task tools ─────────────────────────

struct TaskCreateTool;

#[async_trait]
impl Tool for TaskCreateTool {
    fn name(&self) -> &'static str {
        "quoth_task_create"
    }
    fn description(&self) -> &'static str {
        "Create a task assigned to an agent within the active organization."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "assigned_to": {"type": "string"},
                "title": {"type": "string"},
                "description": {"type": "string"},
                "priority": {"type": "integer", "default": 3},
                "deadline": {"type": "string"},
                "payload": {"type": "object"}
            },
            "required": ["assigned_to", "title"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let assigned_to = require_uuid(&params, "assigned_to")?;
        let title = require_str(&params, "title")?.to_string();
        let description = field_str(&params, "description").map(String::from);
        let priority = params.get("priority").and_then(|v| v.as_i64()).unwrap_or(3) as i32;
        let deadline = match field_str(&params, "deadline") {
            Some(s) => Some(
                chrono::DateTime::parse_from_rfc3339(s)
                    .map_err(|_| QuothError::ValidationError("`deadline` must be RFC3339".to_string()))?
                    .with_timezone(&chrono::Utc),
            ),
            None => None,
        };
        let payload = params.get("payload").cloned().unwrap_or(Value::Null);

        let task = ctx
            .state
            .agent_bus
            .create_task(ctx.organization_id, assigned_to, ctx.auth.user_id, title, description, priority, deadline, payload)
            .await?;
        Ok(json!({ "task": task }))
    }
}

struct TaskUpdateTool;

#[async_trait]
impl Tool for TaskUpdateTool {
    fn name(&self) -> &'static str {
        "quoth_task_update"
    }
    fn description(&self) -> &'static str {
        "Transition a task's status and/or attach its result."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "status": {"type": "string", "enum": ["pending", "in_progress", "done", "failed", "cancelled"]},
                "result": {"type": "object"}
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, QuothError> {
        let task_id = require_uuid(&params, "task_id")?;
        let status: Option<TaskStatus> = parse_enum_field(&params, "status")?;
        let result = params.get("result").cloned();

        let task = ctx.state.agent_bus.update_task(task_id, status, result).await?;
        Ok(json!({ "task": task }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoth_core::models::{Organization, Project, Tier};
    use quoth_core::store::memory::InMemoryStore;

    fn params(v: Value) -> Value {
        v
    }

    #[tokio::test]
    async fn search_index_requires_non_empty_query() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let tier_meter = Arc::new(TierMeter::new(store.clone()));
        let embedder: Arc<dyn quoth_core::embedding::EmbeddingProvider> = Arc::new(NullEmbedder);
        let retrieval = Arc::new(RetrievalPipeline::new(store.clone(), embedder.clone(), None, tier_meter.clone()));
        let indexer = Arc::new(Indexer::new(store.clone(), embedder, std::time::Duration::from_millis(0)));
        let proposals = Arc::new(ProposalEngine::new(store.clone(), indexer.clone(), "bus".into()));
        let agent_bus = Arc::new(AgentBus::new(store.clone(), "bus".into()));
        let activity = ActivityLogger::new(store.clone());
        let analytics = Arc::new(Analytics::new(store.clone()));
        let sessions = Arc::new(SessionManager::new());

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
                tier: Tier::Pro,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let config = Arc::new(Config {
            app_url: "https://quoth.example.com".into(),
            jwt_secret: "test-secret-at-least-16-chars".into(),
            identity_provider_url: None,
            identity_provider_service_key: None,
            embedding: crate::config::EmbeddingConfig { provider_url: "https://embed.example.com".into(), provider_key: "k".into() },
            reranker: None,
            rag_worker: None,
            bus_signing_secret: "bus".into(),
            database_url: "postgres://localhost/quoth".into(),
            server: crate::config::ServerConfig { bind: "0.0.0.0:8080".into() },
            indexer: crate::config::IndexerConfig { embed_pacing: std::time::Duration::from_millis(0) },
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

        let ctx = ToolContext {
            state,
            connection_id: "conn-1".into(),
            auth: AuthRecord { project_id: project.id, user_id: owner_id, role: Role::Admin, label: None },
            project_id: project.id,
            role: Role::Admin,
            organization_id: org_id,
            cancel: CancellationToken::new(),
        };

        let tool = SearchIndexTool;
        let result = tool.execute(params(json!({ "query": "" })), &ctx).await;
        assert!(matches!(result, Err(QuothError::ValidationError(_))));
    }

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

    #[test]
    fn slug_validation_rejects_uppercase_and_underscore() {
        assert!(is_valid_slug("my-project-2"));
        assert!(!is_valid_slug("My_Project"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn registry_with_builtins_has_every_tool() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.tools().len(), 21);
        assert!(registry.find("quoth_search_index").is_some());
        assert!(registry.find("quoth_task_update").is_some());
    }
}
