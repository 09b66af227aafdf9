//! Health / Coverage / Drift analytics (C14, §4.14).
//!
//! Pure-ish formulas layered over `Store`'s read side: staleness levels and
//! health score are computed from `list_documents`, miss-rate and top-missed
//! queries from a rolling window of `activity_since`, drift severity from a
//! free-text description on `DriftEvent`, and coverage by counting documents
//! per `doc_type` (auto-categorizing nulls by path inference, persisting the
//! fix back through `upsert_document`).
//!
//! Grounded on spec.md §4.14's formulas directly; there is no teacher
//! equivalent of a documentation-health dashboard, so the shape here follows
//! the crate's own established idiom of a stateless struct wrapping `Arc<dyn
//! Store>` (`ActivityLogger`, `TierMeter`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use quoth_core::models::{
    ActivityEventType, CoverageSnapshot, DocType, DriftType, ScanType, Severity,
};
use quoth_core::store::Store;
use quoth_core::QuothError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessLevel {
    Fresh,
    Aging,
    Stale,
    Critical,
}

impl StalenessLevel {
    /// §4.14: `fresh` under 14 days, `aging` under 30, `stale` under 60,
    /// otherwise `critical`.
    pub fn for_days(days_since_update: i64) -> Self {
        if days_since_update < 14 {
            StalenessLevel::Fresh
        } else if days_since_update < 30 {
            StalenessLevel::Aging
        } else if days_since_update < 60 {
            StalenessLevel::Stale
        } else {
            StalenessLevel::Critical
        }
    }

    /// Suggested actions are only attached from `aging` upward.
    pub fn suggested_action(self) -> Option<&'static str> {
        match self {
            StalenessLevel::Fresh => None,
            StalenessLevel::Aging => Some("review for accuracy against current code"),
            StalenessLevel::Stale => Some("schedule a re-verification pass"),
            StalenessLevel::Critical => Some("treat as likely drifted; re-derive from source"),
        }
    }

    fn weight(self) -> f64 {
        match self {
            StalenessLevel::Fresh => 100.0,
            StalenessLevel::Aging => 70.0,
            StalenessLevel::Stale => 30.0,
            StalenessLevel::Critical => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissRateTrend {
    Improving,
    Degrading,
    Stable,
}

#[derive(Debug, Clone)]
pub struct MissRateReport {
    pub daily_miss_rates: Vec<f64>,
    pub trend: MissRateTrend,
}

#[derive(Debug, Clone)]
pub struct TopMissedQuery {
    pub query: String,
    pub count: usize,
}

pub struct Analytics {
    store: Arc<dyn Store>,
}

impl Analytics {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Weighted average of every document's staleness level, rounded.
    /// `None` when the project has no documents.
    pub async fn health_score(&self, project_id: Uuid) -> Result<Option<f64>, QuothError> {
        let documents = self.store.list_documents(project_id).await.map_err(QuothError::Internal)?;
        if documents.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let total: f64 = documents
            .iter()
            .map(|d| StalenessLevel::for_days((now - d.last_updated).num_days()).weight())
            .sum();
        Ok(Some((total / documents.len() as f64).round()))
    }

    /// §4.14 miss rate: per-day `(misses / searches) * 100` over a rolling
    /// `window_days` window, trend comparing first-half vs second-half
    /// averages with a ±5 threshold.
    pub async fn miss_rate(&self, project_id: Uuid, window_days: i64) -> Result<MissRateReport, QuothError> {
        let since = Utc::now() - Duration::days(window_days);
        let events = self.store.activity_since(project_id, since).await.map_err(QuothError::Internal)?;

        let mut by_day: HashMap<chrono::NaiveDate, (u32, u32)> = HashMap::new();
        for event in &events {
            if event.event_type != ActivityEventType::Search {
                continue;
            }
            let day = event.created_at.date_naive();
            let entry = by_day.entry(day).or_insert((0, 0));
            entry.0 += 1;
            if event.result_count == Some(0) {
                entry.1 += 1;
            }
        }

        let mut days: Vec<chrono::NaiveDate> = by_day.keys().copied().collect();
        days.sort();

        let daily_miss_rates: Vec<f64> = days
            .iter()
            .map(|day| {
                let (searches, misses) = by_day[day];
                if searches == 0 {
                    0.0
                } else {
                    (misses as f64 / searches as f64) * 100.0
                }
            })
            .collect();

        let trend = trend_from_halves(&daily_miss_rates);
        Ok(MissRateReport { daily_miss_rates, trend })
    }

    /// §4.14 top missed queries: lower-cased, trimmed, counted over the
    /// last 30 days, returning the top `k` by count.
    pub async fn top_missed_queries(&self, project_id: Uuid, k: usize) -> Result<Vec<TopMissedQuery>, QuothError> {
        let since = Utc::now() - Duration::days(30);
        let events = self.store.activity_since(project_id, since).await.map_err(QuothError::Internal)?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for event in &events {
            if event.event_type != ActivityEventType::Search || event.result_count != Some(0) {
                continue;
            }
            if let Some(query) = &event.query {
                let normalized = query.trim().to_lowercase();
                if normalized.is_empty() {
                    continue;
                }
                *counts.entry(normalized).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<TopMissedQuery> = counts
            .into_iter()
            .map(|(query, count)| TopMissedQuery { query, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// §4.14 drift severity: fixed mapping for `pattern_violation`,
    /// `code_diverged`, `missing_doc`; `stale_doc` parses a `"N day(s)"`
    /// pattern out of the free-text description.
    pub fn drift_severity(drift_type: DriftType, description: &str) -> Severity {
        match drift_type {
            DriftType::PatternViolation => Severity::Critical,
            DriftType::CodeDiverged => Severity::Warning,
            DriftType::MissingDoc => Severity::Warning,
            DriftType::StaleDoc => match parse_days(description) {
                Some(days) if days > 90 => Severity::Critical,
                Some(days) if days > 60 => Severity::Warning,
                _ => Severity::Info,
            },
        }
    }

    /// §4.14 coverage: counts documents per `doc_type`, auto-categorizing
    /// nulls via `DocType::infer_from_path` and persisting the fix back to
    /// the store. Writes (and returns) a snapshot.
    pub async fn coverage_snapshot(
        &self,
        project_id: Uuid,
        scan_type: ScanType,
    ) -> Result<CoverageSnapshot, QuothError> {
        let documents = self.store.list_documents(project_id).await.map_err(QuothError::Internal)?;

        let mut breakdown: HashMap<String, i64> = HashMap::new();
        let mut with_embeddings = 0i64;

        for mut doc in documents.clone() {
            if doc.doc_type.is_none() {
                if let Some(inferred) = DocType::infer_from_path(&doc.file_path) {
                    doc.doc_type = Some(inferred);
                    self.store.upsert_document(doc.clone()).await.map_err(QuothError::Internal)?;
                }
            }

            let key = doc
                .doc_type
                .map(doc_type_label)
                .unwrap_or("uncategorized")
                .to_string();
            *breakdown.entry(key).or_insert(0) += 1;

            let hashes = self
                .store
                .stored_chunk_hashes(doc.id)
                .await
                .map_err(QuothError::Internal)?;
            if !hashes.is_empty() {
                with_embeddings += 1;
            }
        }

        let total_documentable = documents.len() as i64;
        let coverage_percentage = if total_documentable == 0 {
            0.0
        } else {
            with_embeddings as f32 / total_documentable as f32
        };

        let snapshot = CoverageSnapshot {
            id: Uuid::new_v4(),
            project_id,
            total_documentable,
            total_documented: with_embeddings,
            coverage_percentage,
            breakdown: serde_json::to_value(&breakdown).unwrap_or(serde_json::Value::Null),
            scan_type,
            created_at: Utc::now(),
        };

        self.store.insert_coverage_snapshot(snapshot).await.map_err(QuothError::Internal)
    }
}

fn doc_type_label(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Architecture => "architecture",
        DocType::TestingPattern => "testing_pattern",
        DocType::Contract => "contract",
        DocType::Meta => "meta",
        DocType::Template => "template",
    }
}

fn trend_from_halves(daily: &[f64]) -> MissRateTrend {
    if daily.len() < 2 {
        return MissRateTrend::Stable;
    }
    let mid = daily.len() / 2;
    let (first_half, second_half) = daily.split_at(mid);
    let avg = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let first_avg = avg(first_half);
    let second_avg = avg(second_half);

    if second_avg < first_avg - 5.0 {
        MissRateTrend::Improving
    } else if second_avg > first_avg + 5.0 {
        MissRateTrend::Degrading
    } else {
        MissRateTrend::Stable
    }
}

/// Extracts the first `N` from a `"N day(s)"`/`"N days"` pattern in
/// free text, case-insensitively.
fn parse_days(description: &str) -> Option<i64> {
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        if let Ok(n) = word.parse::<i64>() {
            if let Some(next) = words.get(i + 1) {
                if next.starts_with("day") {
                    return Some(n);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoth_core::models::{Document, DocumentChunk, ChunkMetadata, Organization, Project, Tier, Visibility};
    use quoth_core::store::memory::InMemoryStore;

    fn doc(project_id: Uuid, file_path: &str, last_updated: DateTime<Utc>, doc_type: Option<DocType>) -> Document {
        Document {
            id: Uuid::new_v4(),
            project_id,
            file_path: file_path.into(),
            title: "Title".into(),
            content: "content".into(),
            checksum: Document::checksum_for("content"),
            doc_type,
            visibility: Visibility::Project,
            version: 0,
            last_updated,
            agent_id: None,
        }
    }

    async fn seeded_project() -> (Arc<dyn Store>, Uuid) {
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
        let project = store
            .create_project(Project {
                id: Uuid::new_v4(),
                slug: "docs".into(),
                organization_id: org_id,
                owner_user_id: owner_id,
                is_public: false,
                require_approval: false,
                tier: Tier::Free,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (store, project.id)
    }

    #[test]
    fn staleness_level_thresholds() {
        assert_eq!(StalenessLevel::for_days(0), StalenessLevel::Fresh);
        assert_eq!(StalenessLevel::for_days(13), StalenessLevel::Fresh);
        assert_eq!(StalenessLevel::for_days(14), StalenessLevel::Aging);
        assert_eq!(StalenessLevel::for_days(29), StalenessLevel::Aging);
        assert_eq!(StalenessLevel::for_days(30), StalenessLevel::Stale);
        assert_eq!(StalenessLevel::for_days(59), StalenessLevel::Stale);
        assert_eq!(StalenessLevel::for_days(60), StalenessLevel::Critical);
        assert!(StalenessLevel::Fresh.suggested_action().is_none());
        assert!(StalenessLevel::Aging.suggested_action().is_some());
    }

    #[tokio::test]
    async fn health_score_averages_staleness_weights() {
        let (store, project_id) = seeded_project().await;
        store.upsert_document(doc(project_id, "a.md", Utc::now(), None)).await.unwrap();
        store
            .upsert_document(doc(project_id, "b.md", Utc::now() - Duration::days(70), None))
            .await
            .unwrap();

        let analytics = Analytics::new(store);
        let score = analytics.health_score(project_id).await.unwrap().unwrap();
        assert_eq!(score, 50.0);
    }

    #[tokio::test]
    async fn health_score_is_none_without_documents() {
        let (store, project_id) = seeded_project().await;
        let analytics = Analytics::new(store);
        assert!(analytics.health_score(project_id).await.unwrap().is_none());
    }

    #[test]
    fn drift_severity_mapping() {
        assert_eq!(Analytics::drift_severity(DriftType::PatternViolation, ""), Severity::Critical);
        assert_eq!(Analytics::drift_severity(DriftType::CodeDiverged, ""), Severity::Warning);
        assert_eq!(Analytics::drift_severity(DriftType::MissingDoc, ""), Severity::Warning);
        assert_eq!(
            Analytics::drift_severity(DriftType::StaleDoc, "last touched 95 days ago"),
            Severity::Critical
        );
        assert_eq!(
            Analytics::drift_severity(DriftType::StaleDoc, "last touched 65 days ago"),
            Severity::Warning
        );
        assert_eq!(
            Analytics::drift_severity(DriftType::StaleDoc, "last touched 10 days ago"),
            Severity::Info
        );
    }

    #[tokio::test]
    async fn coverage_snapshot_infers_doc_type_and_persists() {
        let (store, project_id) = seeded_project().await;
        let uncategorized = doc(project_id, "architecture/overview.md", Utc::now(), None);
        let doc_id = uncategorized.id;
        store.upsert_document(uncategorized).await.unwrap();

        let analytics = Analytics::new(store.clone());
        let snapshot = analytics.coverage_snapshot(project_id, ScanType::Manual).await.unwrap();

        assert_eq!(snapshot.total_documentable, 1);
        let reloaded = store.get_document_by_id(doc_id).await.unwrap().unwrap();
        assert_eq!(reloaded.doc_type, Some(DocType::Architecture));
    }

    #[tokio::test]
    async fn coverage_counts_documents_with_embeddings() {
        let (store, project_id) = seeded_project().await;
        let d = doc(project_id, "architecture/overview.md", Utc::now(), Some(DocType::Architecture));
        let doc_id = d.id;
        store.upsert_document(d).await.unwrap();
        store
            .insert_chunk(DocumentChunk {
                id: Uuid::new_v4(),
                document_id: doc_id,
                content_chunk: "body".into(),
                chunk_hash: "h".into(),
                embedding: vec![0.1],
                embedding_model: "test".into(),
                metadata: ChunkMetadata {
                    chunk_index: 0,
                    language: None,
                    start_line: None,
                    end_line: None,
                    parent_context: None,
                    source: "test".into(),
                },
            })
            .await
            .unwrap();

        let analytics = Analytics::new(store);
        let snapshot = analytics.coverage_snapshot(project_id, ScanType::Manual).await.unwrap();
        assert_eq!(snapshot.total_documented, 1);
        assert_eq!(snapshot.coverage_percentage, 1.0);
    }

    #[test]
    fn parse_days_extracts_leading_number() {
        assert_eq!(parse_days("stale for 45 days"), Some(45));
        assert_eq!(parse_days("1 day overdue"), Some(1));
        assert_eq!(parse_days("no duration mentioned"), None);
    }
}
