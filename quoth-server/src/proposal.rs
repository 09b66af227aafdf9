//! Proposal Engine (C10, §4.10).
//!
//! Decides, for every `quoth_propose_update` call, whether the change can
//! be applied immediately (direct sync through [`crate::indexer::Indexer`])
//! or must be staged as a [`Proposal`] awaiting human approval — a decision
//! driven entirely by `projects.require_approval` and whether the target
//! document already exists.
//!
//! Grounded on the teacher's absence of any approval workflow (`ingest.rs`
//! always applies immediately); the direct-apply branches here reuse that
//! shape via `Indexer::sync`, and the staged-proposal branches are new,
//! built from spec.md §4.10.

use std::sync::Arc;

use uuid::Uuid;

use quoth_core::models::{DocType, Document, Proposal, ProposalStatus, Role};
use quoth_core::signing::{sign_proposal, verify};
use quoth_core::store::Store;
use quoth_core::QuothError;

use crate::indexer::{Indexer, SyncOutcome};

pub struct ProposalRequest {
    pub project_id: Uuid,
    pub role: Role,
    pub file_path: String,
    pub proposed_content: String,
    pub reasoning: String,
    pub evidence_snippet: String,
    pub agent_id: Option<Uuid>,
}

pub enum ProposalOutcome {
    /// Applied immediately: either a brand new document or an update to an
    /// existing one, because the project doesn't require approval.
    Applied(SyncOutcome),
    /// Staged for human review.
    Staged(Proposal),
}

pub struct ProposalEngine {
    store: Arc<dyn Store>,
    indexer: Arc<Indexer>,
    bus_signing_secret: String,
}

impl ProposalEngine {
    pub fn new(store: Arc<dyn Store>, indexer: Arc<Indexer>, bus_signing_secret: String) -> Self {
        Self {
            store,
            indexer,
            bus_signing_secret,
        }
    }

    /// §4.10 steps 1-7: reject viewers outright, then branch on
    /// new-vs-existing document crossed with the project's approval
    /// policy.
    pub async fn propose(&self, req: ProposalRequest) -> Result<ProposalOutcome, QuothError> {
        if !req.role.can_propose() {
            return Err(QuothError::Forbidden(
                "viewers cannot propose documentation changes".to_string(),
            ));
        }

        let project = self
            .store
            .get_project(req.project_id)
            .await
            .map_err(QuothError::Internal)?
            .ok_or_else(|| QuothError::NotFound(format!("project {}", req.project_id)))?;

        let existing = self
            .store
            .get_document_by_path(req.project_id, &req.file_path)
            .await
            .map_err(QuothError::Internal)?;

        let signature = req
            .agent_id
            .map(|agent_id| sign_proposal(&self.bus_signing_secret, &agent_id.to_string(), &req.proposed_content));

        if !project.require_approval {
            let title = existing
                .as_ref()
                .map(|d| d.title.clone())
                .unwrap_or_else(|| title_from_path(&req.file_path));

            let outcome = self
                .indexer
                .sync(crate::indexer::SyncRequest {
                    project_id: req.project_id,
                    file_path: req.file_path,
                    title,
                    content: req.proposed_content,
                    doc_type: None,
                    visibility: None,
                    agent_id: req.agent_id,
                })
                .await?;
            return Ok(ProposalOutcome::Applied(outcome));
        }

        let (document_id, original_content, reasoning) = match &existing {
            Some(doc) => (Some(doc.id), Some(doc.content.clone()), req.reasoning),
            None => (None, None, format!("[NEW DOCUMENT] {}", req.reasoning)),
        };

        let proposal = Proposal {
            id: Uuid::new_v4(),
            project_id: req.project_id,
            document_id,
            file_path: req.file_path,
            original_content,
            proposed_content: req.proposed_content,
            reasoning,
            evidence_snippet: req.evidence_snippet,
            status: ProposalStatus::Pending,
            agent_id: req.agent_id,
            signature,
            created_at: chrono::Utc::now(),
        };

        let stored = self
            .store
            .create_proposal(proposal)
            .await
            .map_err(QuothError::Internal)?;
        Ok(ProposalOutcome::Staged(stored))
    }

    /// §4.10: approving a pending proposal triggers the same sync an
    /// unstaged direct apply would have. Signed proposals are re-verified
    /// here, not trusted from creation time.
    pub async fn approve(&self, proposal_id: Uuid) -> Result<SyncOutcome, QuothError> {
        let proposal = self.load_pending(proposal_id).await?;

        if let (Some(agent_id), Some(signature)) = (proposal.agent_id, &proposal.signature) {
            let message = format!("{agent_id}{}", proposal.proposed_content);
            if !verify(&self.bus_signing_secret, &message, signature) {
                return Err(QuothError::Forbidden(
                    "proposal signature no longer verifies".to_string(),
                ));
            }
        }

        self.store
            .set_proposal_status(proposal_id, ProposalStatus::Approved)
            .await
            .map_err(QuothError::Internal)?;

        let title = match proposal.document_id {
            Some(document_id) => self
                .store
                .get_document_by_id(document_id)
                .await
                .map_err(QuothError::Internal)?
                .map(|d: Document| d.title)
                .unwrap_or_else(|| title_from_path(&proposal.file_path)),
            None => title_from_path(&proposal.file_path),
        };

        let doc_type = DocType::infer_from_path(&proposal.file_path);

        self.indexer
            .sync(crate::indexer::SyncRequest {
                project_id: proposal.project_id,
                file_path: proposal.file_path,
                title,
                content: proposal.proposed_content,
                doc_type,
                visibility: None,
                agent_id: proposal.agent_id,
            })
            .await
    }

    pub async fn reject(&self, proposal_id: Uuid) -> Result<(), QuothError> {
        self.load_pending(proposal_id).await?;
        self.store
            .set_proposal_status(proposal_id, ProposalStatus::Rejected)
            .await
            .map_err(QuothError::Internal)
    }

    pub async fn list(&self, project_id: Uuid, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, QuothError> {
        self.store.list_proposals(project_id, status).await.map_err(QuothError::Internal)
    }

    async fn load_pending(&self, proposal_id: Uuid) -> Result<Proposal, QuothError> {
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await
            .map_err(QuothError::Internal)?
            .ok_or_else(|| QuothError::NotFound(format!("proposal {proposal_id}")))?;

        if proposal.status != ProposalStatus::Pending {
            return Err(QuothError::Conflict(format!(
                "proposal {proposal_id} is no longer pending"
            )));
        }
        Ok(proposal)
    }
}

/// Fallback title for a new document when no explicit title is given: the
/// file's basename, stripped of extension, with separators turned into
/// spaces.
fn title_from_path(file_path: &str) -> String {
    let stem = file_path
        .rsplit('/')
        .next()
        .unwrap_or(file_path)
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(file_path);

    stem.replace(['-', '_'], " ")
}
