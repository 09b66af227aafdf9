//! Core entity types (§3 of the design): organizations, projects, users,
//! documents and their chunks, proposals, agents and their traffic,
//! activity/drift/coverage records, and the two in-memory-only shapes
//! (sessions, usage counters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub fn can_propose(self) -> bool {
        matches!(self, Role::Admin | Role::Editor)
    }

    pub fn can_approve(self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Team,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Project,
    Shared,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Project
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Architecture,
    TestingPattern,
    Contract,
    Meta,
    Template,
}

impl DocType {
    /// Infer from a file path prefix, per §4.4 step 3.
    pub fn infer_from_path(path: &str) -> Option<DocType> {
        let path = path.trim_start_matches('/');
        if path.starts_with("architecture/") {
            Some(DocType::Architecture)
        } else if path.starts_with("patterns/") {
            Some(DocType::TestingPattern)
        } else if path.starts_with("contracts/") {
            Some(DocType::Contract)
        } else if path.starts_with("meta/") {
            Some(DocType::Meta)
        } else if path.starts_with("templates/") {
            Some(DocType::Template)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Owner,
    Contributor,
    Readonly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Message,
    Task,
    Result,
    Alert,
    Knowledge,
    Curator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    CodeDiverged,
    MissingDoc,
    StaleDoc,
    PatternViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Manual,
    Scheduled,
    Genesis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub slug: String,
    pub organization_id: Uuid,
    pub owner_user_id: Uuid,
    pub is_public: bool,
    pub require_approval: bool,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub default_project_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_path: String,
    pub title: String,
    pub content: String,
    pub checksum: String,
    pub doc_type: Option<DocType>,
    pub visibility: Visibility,
    pub version: i64,
    pub last_updated: DateTime<Utc>,
    pub agent_id: Option<Uuid>,
}

impl Document {
    /// §3 invariant: `checksum` matches `content` at rest.
    pub fn checksum_for(content: &str) -> String {
        format!("{:x}", md5::compute(content.as_bytes()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_index: i64,
    pub language: Option<String>,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub parent_context: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content_chunk: String,
    pub chunk_hash: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn hash_for(content: &str) -> String {
        format!("{:x}", md5::compute(content.trim().as_bytes()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub project_id: Uuid,
    /// `None` means this proposal creates a new document.
    pub document_id: Option<Uuid>,
    pub file_path: String,
    /// `None` when `document_id` is `None` (new-document variant).
    pub original_content: Option<String>,
    pub proposed_content: String,
    pub reasoning: String,
    pub evidence_snippet: String,
    pub status: ProposalStatus,
    pub agent_id: Option<Uuid>,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    pub fn is_new_document(&self) -> bool {
        self.document_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub agent_name: String,
    pub display_name: Option<String>,
    pub instance: String,
    pub model: Option<String>,
    pub role: Option<String>,
    pub capabilities: serde_json::Value,
    pub status: AgentStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProjectAssignment {
    pub agent_id: Uuid,
    pub project_id: Uuid,
    pub role: AgentRole,
    pub assigned_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub from_agent_id: Uuid,
    pub to_agent_id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub priority: Priority,
    pub channel: Option<String>,
    pub reply_to: Option<Uuid>,
    pub payload: serde_json::Value,
    pub signature: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub assigned_to: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// 1 = highest priority.
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventType {
    Search,
    Read,
    ReadChunks,
    Propose,
    Genesis,
    PatternMatch,
    PatternInject,
    DriftDetected,
    CoverageScan,
    ProjectCreate,
    ProjectUpdate,
    ProjectDelete,
    AgentRegister,
    AgentUpdate,
    AgentRemove,
    AgentAssignProject,
    AgentUnassignProject,
    AgentMessageSent,
    AgentInboxRead,
    Reindex,
    AgentTaskCreated,
    AgentTaskUpdated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: ActivityEventType,
    pub query: Option<String>,
    pub document_id: Option<Uuid>,
    pub tool_name: Option<String>,
    pub patterns_matched: Option<i32>,
    pub drift_detected: bool,
    pub result_count: Option<i32>,
    pub relevance_score: Option<f32>,
    pub response_time_ms: Option<i32>,
    pub file_path: Option<String>,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    pub id: Uuid,
    pub project_id: Uuid,
    pub document_id: Option<Uuid>,
    pub severity: Severity,
    pub drift_type: DriftType,
    pub file_path: String,
    pub doc_path: Option<String>,
    pub description: String,
    pub expected_pattern: Option<String>,
    pub actual_code: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub id: Uuid,
    pub project_id: Uuid,
    pub total_documentable: i64,
    pub total_documented: i64,
    pub coverage_percentage: f32,
    pub breakdown: serde_json::Value,
    pub scan_type: ScanType,
    pub created_at: DateTime<Utc>,
}

/// In-memory only — never persisted. Lifetime bounded by the 24h reaper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub connection_id: String,
    pub user_id: Uuid,
    pub active_project_id: Uuid,
    pub active_role: Role,
    pub available_projects: Vec<ProjectMember>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// In-memory only. Keyed by `(project_id, limit_type)`; reset at first
/// access on a new UTC date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    SemanticSearch,
    RagAnswer,
}

#[derive(Debug, Clone, Copy)]
pub struct CounterValue {
    pub count: u32,
    pub date_yyyy_mm_dd: chrono::NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_md5() {
        let c = Document::checksum_for("hello");
        assert_eq!(c, format!("{:x}", md5::compute(b"hello")));
    }

    #[test]
    fn doc_type_infers_from_path_prefix() {
        assert_eq!(
            DocType::infer_from_path("architecture/overview.md"),
            Some(DocType::Architecture)
        );
        assert_eq!(DocType::infer_from_path("random/file.md"), None);
    }

    #[test]
    fn role_authority() {
        assert!(Role::Admin.can_approve());
        assert!(!Role::Editor.can_approve());
        assert!(Role::Editor.can_propose());
        assert!(!Role::Viewer.can_propose());
    }
}
