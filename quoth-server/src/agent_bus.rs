//! Agent Bus (C11, §4.11).
//!
//! Org-scoped messaging and task assignment between registered agents.
//! Every message carries an HMAC envelope signature over `from || to ||
//! now_iso`, computed with `quoth_core::signing::sign_envelope` — the same
//! primitive the proposal engine uses for its own signature, just a
//! different message shape.
//!
//! Grounded on the teacher's `agents.rs` `AgentRegistry` for the
//! name-or-id resolution idiom (`resolve_agent` here mirrors
//! `AgentRegistry::find`), generalized from a static TOML-defined roster
//! to rows owned by `Store`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use quoth_core::models::{
    AgentMessage, AgentProjectAssignment, AgentRole, AgentTask, MessageStatus, MessageType,
    Priority, TaskStatus,
};
use quoth_core::signing::sign_envelope;
use quoth_core::store::{InboxMessage, Store};
use quoth_core::QuothError;

pub struct AgentBus {
    store: Arc<dyn Store>,
    bus_signing_secret: String,
}

impl AgentBus {
    pub fn new(store: Arc<dyn Store>, bus_signing_secret: String) -> Self {
        Self {
            store,
            bus_signing_secret,
        }
    }

    /// §4.11 `send`: `to` is either an agent id or an agent name within
    /// `organization_id`.
    pub async fn send(
        &self,
        organization_id: Uuid,
        from_agent_id: Uuid,
        to: &str,
        message_type: MessageType,
        priority: Priority,
        channel: Option<String>,
        reply_to: Option<Uuid>,
        payload: Value,
    ) -> Result<AgentMessage, QuothError> {
        let recipient = self
            .store
            .resolve_agent(organization_id, to)
            .await
            .map_err(QuothError::Internal)?
            .ok_or_else(|| QuothError::NotFound(format!("agent {to} not found")))?;

        let now = Utc::now();
        let signature = sign_envelope(
            &self.bus_signing_secret,
            &from_agent_id.to_string(),
            &recipient.id.to_string(),
            &now.to_rfc3339(),
        );

        let message = AgentMessage {
            id: Uuid::new_v4(),
            organization_id,
            from_agent_id,
            to_agent_id: recipient.id,
            message_type,
            priority,
            channel,
            reply_to,
            payload,
            signature,
            status: MessageStatus::Pending,
            created_at: now,
            read_at: None,
        };

        self.store
            .insert_message(message)
            .await
            .map_err(QuothError::Internal)
    }

    /// §4.11 `inbox`: newest-first, optionally filtered by status and
    /// marked read in a single batch.
    pub async fn inbox(
        &self,
        agent_id: Uuid,
        limit: i64,
        status: Option<MessageStatus>,
        mark_read: bool,
    ) -> Result<Vec<InboxMessage>, QuothError> {
        let messages = self
            .store
            .inbox(agent_id, limit, status)
            .await
            .map_err(QuothError::Internal)?;

        if mark_read {
            let ids: Vec<Uuid> = messages.iter().map(|m| m.message.id).collect();
            if !ids.is_empty() {
                self.store
                    .mark_messages_read(&ids)
                    .await
                    .map_err(QuothError::Internal)?;
            }
        }

        Ok(messages)
    }

    pub async fn upsert_assignment(
        &self,
        agent_id: Uuid,
        project_id: Uuid,
        role: AgentRole,
        assigned_by: Uuid,
    ) -> Result<(), QuothError> {
        self.store
            .upsert_assignment(AgentProjectAssignment {
                agent_id,
                project_id,
                role,
                assigned_by,
            })
            .await
            .map_err(QuothError::Internal)
    }

    pub async fn remove_assignment(&self, agent_id: Uuid, project_id: Uuid) -> Result<(), QuothError> {
        self.store
            .remove_assignment(agent_id, project_id)
            .await
            .map_err(QuothError::Internal)
    }

    /// §4.11 task creation: a lighter-weight sibling of `send`, no
    /// signature (tasks aren't routed across trust boundaries the way
    /// inter-agent messages are).
    pub async fn create_task(
        &self,
        organization_id: Uuid,
        assigned_to: Uuid,
        created_by: Uuid,
        title: String,
        description: Option<String>,
        priority: i32,
        deadline: Option<chrono::DateTime<Utc>>,
        payload: Value,
    ) -> Result<AgentTask, QuothError> {
        let task = AgentTask {
            id: Uuid::new_v4(),
            organization_id,
            assigned_to,
            created_by,
            title,
            description,
            priority,
            deadline,
            payload,
            status: TaskStatus::Pending,
            result: None,
            started_at: None,
            completed_at: None,
        };
        self.store.create_task(task).await.map_err(QuothError::Internal)
    }

    /// §4.11 task update: entering `in_progress` stamps `started_at` if
    /// unset; entering a terminal status stamps `completed_at`.
    pub async fn update_task(
        &self,
        task_id: Uuid,
        status: Option<TaskStatus>,
        result: Option<Value>,
    ) -> Result<AgentTask, QuothError> {
        let mut task = self
            .store
            .get_task(task_id)
            .await
            .map_err(QuothError::Internal)?
            .ok_or_else(|| QuothError::NotFound(format!("task {task_id} not found")))?;

        if let Some(status) = status {
            if status == TaskStatus::InProgress && task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
            if matches!(status, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled) {
                task.completed_at = Some(Utc::now());
            }
            task.status = status;
        }
        if let Some(result) = result {
            task.result = Some(result);
        }

        self.store.update_task(task).await.map_err(QuothError::Internal)
    }

    pub async fn list_tasks(
        &self,
        organization_id: Uuid,
        assigned_to: Option<Uuid>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<AgentTask>, QuothError> {
        self.store
            .list_tasks(organization_id, assigned_to, status)
            .await
            .map_err(QuothError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoth_core::models::{Agent, AgentStatus};
    use quoth_core::store::memory::InMemoryStore;

    async fn registered_agent(store: &Arc<dyn Store>, organization_id: Uuid, name: &str) -> Agent {
        store
            .create_agent(Agent {
                id: Uuid::new_v4(),
                organization_id,
                agent_name: name.to_string(),
                display_name: None,
                instance: "default".to_string(),
                model: None,
                role: None,
                capabilities: Value::Null,
                status: AgentStatus::Active,
                last_seen_at: None,
                metadata: Value::Null,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_resolves_recipient_by_name_and_signs_envelope() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let org_id = Uuid::new_v4();
        let sender = registered_agent(&store, org_id, "scout").await;
        let recipient = registered_agent(&store, org_id, "curator").await;

        let bus = AgentBus::new(store, "bus-secret".into());
        let message = bus
            .send(
                org_id,
                sender.id,
                "curator",
                MessageType::Message,
                Priority::Normal,
                None,
                None,
                serde_json::json!({"hello": "world"}),
            )
            .await
            .unwrap();

        assert_eq!(message.to_agent_id, recipient.id);
        assert_eq!(message.signature.len(), quoth_core::signing::SIGNATURE_HEX_LEN);
    }

    #[tokio::test]
    async fn inbox_mark_read_batches_status() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let org_id = Uuid::new_v4();
        let sender = registered_agent(&store, org_id, "scout").await;
        let recipient = registered_agent(&store, org_id, "curator").await;
        let bus = AgentBus::new(store, "bus-secret".into());

        bus.send(
            org_id,
            sender.id,
            "curator",
            MessageType::Alert,
            Priority::High,
            None,
            None,
            Value::Null,
        )
        .await
        .unwrap();

        let unread = bus.inbox(recipient.id, 10, None, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].from_agent_name, "scout");

        let again = bus.inbox(recipient.id, 10, Some(MessageStatus::Pending), false).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn task_transitions_stamp_started_and_completed() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let org_id = Uuid::new_v4();
        let worker = registered_agent(&store, org_id, "worker").await;
        let owner = Uuid::new_v4();
        let bus = AgentBus::new(store, "bus-secret".into());

        let task = bus
            .create_task(org_id, worker.id, owner, "Index new docs".into(), None, 1, None, Value::Null)
            .await
            .unwrap();
        assert!(task.started_at.is_none());

        let in_progress = bus
            .update_task(task.id, Some(TaskStatus::InProgress), None)
            .await
            .unwrap();
        assert!(in_progress.started_at.is_some());

        let done = bus
            .update_task(task.id, Some(TaskStatus::Done), Some(serde_json::json!({"ok": true})))
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
    }
}
