//! Session Manager (C8, §4.8).
//!
//! A process-local `connection_id -> Session` map. The active project is
//! the effective tenant for every subsequent tool call on a connection,
//! independent of the token's original project claim, so long as it stays
//! within the caller's access set.
//!
//! Grounded on `ryanmaclean-tundra`'s `at-harness/src/rate_limiter.rs` for
//! the `DashMap<K, V>`-backed per-key state idiom (`entry().or_insert_with`,
//! a thin wrapper type holding the map plus config).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use quoth_core::models::{ProjectMember, Role, Session};
use quoth_core::store::Store;
use quoth_core::QuothError;

/// §4.8: sessions idle for longer than this are swept by the reaper.
const SESSION_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub project_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct AccountsView {
    pub active_project_id: Uuid,
    pub accounts: Vec<AccountSummary>,
}

pub struct SessionManager {
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Start (or resume) a session for `connection_id`, loading the
    /// caller's accessible projects and defaulting the active project to
    /// `requested_project_id` (normally the token's project claim).
    pub async fn start(
        &self,
        store: &Arc<dyn Store>,
        connection_id: &str,
        user_id: Uuid,
        requested_project_id: Uuid,
        requested_role: Role,
    ) -> Result<(), QuothError> {
        let accessible = store
            .projects_for_user(user_id)
            .await
            .map_err(QuothError::Internal)?;

        let available_projects: Vec<ProjectMember> = accessible
            .into_iter()
            .map(|a| ProjectMember {
                project_id: a.project.id,
                user_id,
                role: a.role,
            })
            .collect();

        let now = Utc::now();
        let session = Session {
            connection_id: connection_id.to_string(),
            user_id,
            active_project_id: requested_project_id,
            active_role: requested_role,
            available_projects,
            created_at: now,
            last_used_at: now,
        };
        self.sessions.insert(connection_id.to_string(), session);
        Ok(())
    }

    /// Touch `last_used_at` and return the active tenant, if the
    /// connection has a live session.
    pub fn active(&self, connection_id: &str) -> Option<(Uuid, Role)> {
        let mut entry = self.sessions.get_mut(connection_id)?;
        entry.last_used_at = Utc::now();
        Some((entry.active_project_id, entry.active_role))
    }

    pub fn list_accounts(&self, connection_id: &str) -> Option<AccountsView> {
        let mut entry = self.sessions.get_mut(connection_id)?;
        entry.last_used_at = Utc::now();
        Some(AccountsView {
            active_project_id: entry.active_project_id,
            accounts: entry
                .available_projects
                .iter()
                .map(|m| AccountSummary {
                    project_id: m.project_id,
                    role: m.role,
                })
                .collect(),
        })
    }

    /// §4.8 `switch`: only succeeds if `project_id` is in the caller's
    /// access set.
    pub fn switch(&self, connection_id: &str, project_id: Uuid) -> Result<(Uuid, Role), QuothError> {
        let mut entry = self
            .sessions
            .get_mut(connection_id)
            .ok_or(QuothError::Unauthenticated)?;

        let membership = entry
            .available_projects
            .iter()
            .find(|m| m.project_id == project_id)
            .cloned()
            .ok_or_else(|| QuothError::NotFound(format!("project {project_id} not accessible")))?;

        entry.active_project_id = membership.project_id;
        entry.active_role = membership.role;
        entry.last_used_at = Utc::now();
        Ok((entry.active_project_id, entry.active_role))
    }

    pub fn remove(&self, connection_id: &str) {
        self.sessions.remove(connection_id);
    }

    /// §4.8 periodic reaper: drop sessions idle for more than 24h.
    pub fn reap_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::from_std(SESSION_TTL).expect("fits");
        self.sessions.retain(|_, session| session.last_used_at >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the background reaper loop; intended to be kept alive for the
/// process lifetime via `tokio::spawn`.
pub async fn run_reaper(manager: Arc<SessionManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        manager.reap_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoth_core::store::memory::InMemoryStore;
    use quoth_core::models::{Organization, Project, Tier};

    async fn seeded_store() -> (Arc<dyn Store>, Uuid, Uuid, Uuid) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let org_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        store
            .create_organization(Organization {
                id: org_id,
                slug: "acme".into(),
                name: "Acme".into(),
                owner_user_id: owner_id,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let project_a = store
            .create_project(Project {
                id: Uuid::new_v4(),
                slug: "docs".into(),
                organization_id: org_id,
                owner_user_id: owner_id,
                is_public: false,
                require_approval: true,
                tier: Tier::Free,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let project_b = store
            .create_project(Project {
                id: Uuid::new_v4(),
                slug: "internal".into(),
                organization_id: org_id,
                owner_user_id: owner_id,
                is_public: false,
                require_approval: true,
                tier: Tier::Free,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        store
            .upsert_membership(ProjectMember {
                project_id: project_a.id,
                user_id: owner_id,
                role: Role::Admin,
            })
            .await
            .unwrap();
        store
            .upsert_membership(ProjectMember {
                project_id: project_b.id,
                user_id: owner_id,
                role: Role::Viewer,
            })
            .await
            .unwrap();

        (store, owner_id, project_a.id, project_b.id)
    }

    #[tokio::test]
    async fn switch_succeeds_within_access_set() {
        let (store, user_id, project_a, project_b) = seeded_store().await;
        let manager = SessionManager::new();
        manager
            .start(&store, "conn-1", user_id, project_a, Role::Admin)
            .await
            .unwrap();

        let (active, role) = manager.switch("conn-1", project_b).unwrap();
        assert_eq!(active, project_b);
        assert_eq!(role, Role::Viewer);
    }

    #[tokio::test]
    async fn switch_rejects_project_outside_access_set() {
        let (store, user_id, project_a, _project_b) = seeded_store().await;
        let manager = SessionManager::new();
        manager
            .start(&store, "conn-1", user_id, project_a, Role::Admin)
            .await
            .unwrap();

        let result = manager.switch("conn-1", Uuid::new_v4());
        assert!(matches!(result, Err(QuothError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_drops_session() {
        let (store, user_id, project_a, _) = seeded_store().await;
        let manager = SessionManager::new();
        manager
            .start(&store, "conn-1", user_id, project_a, Role::Admin)
            .await
            .unwrap();
        assert!(manager.active("conn-1").is_some());
        manager.remove("conn-1");
        assert!(manager.active("conn-1").is_none());
    }

    #[tokio::test]
    async fn list_accounts_reports_active_and_available() {
        let (store, user_id, project_a, project_b) = seeded_store().await;
        let manager = SessionManager::new();
        manager
            .start(&store, "conn-1", user_id, project_a, Role::Admin)
            .await
            .unwrap();

        let view = manager.list_accounts("conn-1").unwrap();
        assert_eq!(view.active_project_id, project_a);
        let ids: Vec<Uuid> = view.accounts.iter().map(|a| a.project_id).collect();
        assert!(ids.contains(&project_a));
        assert!(ids.contains(&project_b));
    }
}
