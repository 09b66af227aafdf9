//! MCP JSON-RPC protocol bridge (§4.9's transport binding, §4.15).
//!
//! Adapts [`crate::tools::ToolRegistry`] into a `rmcp` `ServerHandler` so
//! any MCP client can discover and call the tool table over the
//! Streamable HTTP transport. Grounded directly on the teacher's
//! `McpBridge` in `mcp.rs`: the same `to_mcp_tool` conversion, the same
//! `list_tools`/`call_tool` shape, generalized from a single shared
//! `ToolContext` to one resolved fresh per call from the caller's
//! identity, since this workspace is multi-tenant and the teacher's
//! wasn't.
//!
//! The caller's identity arrives as an [`crate::auth::AuthRecord`]
//! attached to the request's extensions by the auth middleware in
//! `http.rs` before the request reaches this bridge — `rmcp`'s
//! streamable HTTP transport forwards the incoming `http::Request`'s
//! extensions into every `RequestContext`, which is how the signed-in
//! caller and its connection id get from the HTTP layer to `call_tool`
//! without `rmcp` needing to know anything about bearer tokens itself.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};

use quoth_core::models::ActivityEventType;
use quoth_core::QuothError;

use crate::activity::new_event;
use crate::auth::AuthRecord;
use crate::tools::{AppState, Tool as QuothTool, ToolContext, ToolRegistry};

/// Carried through request extensions by the auth middleware in
/// `http.rs`; a stable per-caller identifier the Session Manager uses to
/// remember which project is active across calls from the same bearer
/// token.
#[derive(Debug, Clone)]
pub struct ConnectionId(pub String);

#[derive(Clone)]
pub struct McpBridge {
    state: Arc<AppState>,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(state: Arc<AppState>, tools: Arc<ToolRegistry>) -> Self {
        Self { state, tools }
    }

    fn to_mcp_tool(tool: &dyn QuothTool) -> Tool {
        let schema_value = tool.parameters_schema();
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match schema_value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(false)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    /// Resolves the caller's identity and active tenant from the request
    /// extensions rmcp forwards, then establishes (or reuses) a Session
    /// Manager entry for it. This is step 1 of §4.9's four-step contract
    /// for every tool call.
    async fn resolve_context(
        &self,
        context: &RequestContext<RoleServer>,
    ) -> Result<ToolContext, QuothError> {
        let auth = context
            .extensions
            .get::<AuthRecord>()
            .cloned()
            .ok_or(QuothError::Unauthenticated)?;
        let connection_id = context
            .extensions
            .get::<ConnectionId>()
            .map(|c| c.0.clone())
            .ok_or(QuothError::Unauthenticated)?;

        self.state
            .sessions
            .start(&self.state.store, &connection_id, auth.user_id, auth.project_id, auth.role)
            .await?;

        let (project_id, role) = self
            .state
            .sessions
            .active(&connection_id)
            .ok_or(QuothError::Unauthenticated)?;

        let project = self
            .state
            .store
            .get_project(project_id)
            .await
            .map_err(QuothError::Internal)?
            .ok_or_else(|| QuothError::NotFound(format!("project {project_id}")))?;

        Ok(ToolContext {
            state: self.state.clone(),
            connection_id,
            auth,
            project_id,
            role,
            organization_id: project.organization_id,
            cancel: tokio_util::sync::CancellationToken::new(),
        })
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "quoth-server".to_string(),
                title: Some("Quoth".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Quoth is a multi-tenant documentation knowledge base for AI coding agents. \
                 Call quoth_search_index to find relevant documentation, quoth_read_doc or \
                 quoth_read_chunks to read it in full, and quoth_propose_update to keep it \
                 current. quoth_list_accounts and quoth_switch_account manage which project is \
                 active on this connection."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self.tools.tools().iter().map(|t| Self::to_mcp_tool(t.as_ref())).collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    /// §4.9's four-step contract: resolve tenant, enforce authority inside
    /// the tool itself, record timing regardless of outcome, return a
    /// text-renderable result.
    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(ErrorCode::METHOD_NOT_FOUND, format!("no tool registered with name: {}", request.name), None)
        })?;

        let ctx = match self.resolve_context(&context).await {
            Ok(ctx) => ctx,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        };

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let started = Instant::now();
        let outcome = tool.execute(params, &ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as i32;

        let mut event = new_event(ctx.project_id, Some(ctx.auth.user_id), event_type_for_tool(&request.name));
        event.tool_name = Some(request.name.to_string());
        event.response_time_ms = Some(elapsed_ms);
        if let Err(e) = &outcome {
            event.context = serde_json::json!({ "error": e.to_string() });
        }
        ctx.state.activity.log(event);

        match outcome {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

/// Maps a tool name to the closest [`ActivityEventType`] it represents.
/// Tools with no dedicated event type (template/account/guideline lookups)
/// fall back to `Read`, since they're all read-only lookups.
fn event_type_for_tool(name: &str) -> ActivityEventType {
    match name {
        "quoth_search_index" => ActivityEventType::Search,
        "quoth_read_doc" => ActivityEventType::Read,
        "quoth_read_chunks" => ActivityEventType::ReadChunks,
        "quoth_propose_update" => ActivityEventType::Propose,
        "quoth_genesis" => ActivityEventType::Genesis,
        "quoth_project_create" => ActivityEventType::ProjectCreate,
        "quoth_agent_register" => ActivityEventType::AgentRegister,
        "quoth_agent_update" => ActivityEventType::AgentUpdate,
        "quoth_agent_remove" => ActivityEventType::AgentRemove,
        "quoth_agent_assign_project" => ActivityEventType::AgentAssignProject,
        "quoth_agent_unassign_project" => ActivityEventType::AgentUnassignProject,
        "quoth_agent_message" => ActivityEventType::AgentMessageSent,
        "quoth_agent_inbox" => ActivityEventType::AgentInboxRead,
        "quoth_task_create" => ActivityEventType::AgentTaskCreated,
        "quoth_task_update" => ActivityEventType::AgentTaskUpdated,
        _ => ActivityEventType::Read,
    }
}
