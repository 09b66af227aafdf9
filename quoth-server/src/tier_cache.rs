//! Tier & Usage Meter (C6, §4.6).
//!
//! Wraps `quoth_core::tier`'s pure lookup table with the stateful parts the
//! spec calls out as process-local: a 5-minute tier cache and per-day usage
//! counters keyed by `(project_id, limit_type, today_utc)`. Divergence
//! across horizontally-scaled replicas is explicitly permitted (§4.6), so
//! no attempt is made to share this state via Postgres or Redis.
//!
//! Grounded on `ryanmaclean-tundra/at-harness/src/rate_limiter.rs` for the
//! `DashMap`-backed per-key counter idiom.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use quoth_core::models::{LimitType, Tier};
use quoth_core::store::Store;
use quoth_core::tier::{self, CheckResult};
use quoth_core::QuothError;

const TIER_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedTier {
    tier: Tier,
    fetched_at: Instant,
}

pub struct TierMeter {
    store: Arc<dyn Store>,
    tier_cache: DashMap<Uuid, CachedTier>,
    counters: DashMap<(Uuid, LimitType), (chrono::NaiveDate, i64)>,
}

impl TierMeter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            tier_cache: DashMap::new(),
            counters: DashMap::new(),
        }
    }

    /// §4.6 `tier`: cached for 5 minutes; on miss reads `projects.tier`,
    /// defaulting to `free` if the project has vanished underneath us.
    pub async fn tier(&self, project_id: Uuid) -> Result<Tier, QuothError> {
        if let Some(cached) = self.tier_cache.get(&project_id) {
            if cached.fetched_at.elapsed() < TIER_CACHE_TTL {
                return Ok(cached.tier);
            }
        }

        let tier = self
            .store
            .get_project(project_id)
            .await
            .map_err(QuothError::Internal)?
            .map(|p| p.tier)
            .unwrap_or(Tier::Free);

        self.tier_cache.insert(
            project_id,
            CachedTier {
                tier,
                fetched_at: Instant::now(),
            },
        );
        Ok(tier)
    }

    /// Forces the next `tier()` call to re-read from the store — used
    /// after a tier change (e.g. a billing webhook) so the cache doesn't
    /// serve a stale tier for up to 5 minutes.
    pub fn invalidate(&self, project_id: Uuid) {
        self.tier_cache.remove(&project_id);
    }

    /// §4.6 `check`: unlimited is always allowed; otherwise compares
    /// against today's in-memory counter.
    pub async fn check(
        &self,
        project_id: Uuid,
        limit_type: LimitType,
    ) -> Result<CheckResult, QuothError> {
        let tier = self.tier(project_id).await?;
        let limit = tier::limit_for(tier, limit_type);
        let used_today = self.count_used_today(project_id, limit_type);
        Ok(tier::check(limit, used_today))
    }

    /// §4.6 `increment`: idempotent across a UTC-day rollover — the
    /// counter resets to 1 rather than accumulating from a stale day.
    pub fn increment(&self, project_id: Uuid, limit_type: LimitType) {
        let today = quoth_core::store::today_utc();
        self.counters
            .entry((project_id, limit_type))
            .and_modify(|(date, count)| {
                if *date == today {
                    *count += 1;
                } else {
                    *date = today;
                    *count = 1;
                }
            })
            .or_insert((today, 1));
    }

    fn count_used_today(&self, project_id: Uuid, limit_type: LimitType) -> i64 {
        let today = quoth_core::store::today_utc();
        match self.counters.get(&(project_id, limit_type)) {
            Some(entry) if entry.0 == today => entry.1,
            _ => 0,
        }
    }

    pub async fn should_rerank(&self, project_id: Uuid, is_genesis: bool) -> Result<bool, QuothError> {
        let tier = self.tier(project_id).await?;
        Ok(tier::should_rerank(tier, is_genesis))
    }

    pub async fn format_footer(
        &self,
        project_id: Uuid,
        limit_type: LimitType,
    ) -> Result<Option<String>, QuothError> {
        let tier = self.tier(project_id).await?;
        let check = self.check(project_id, limit_type).await?;
        Ok(tier::format_footer(tier, limit_type, check.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quoth_core::models::{Organization, Project};
    use quoth_core::store::memory::InMemoryStore;

    async fn project_with_tier(tier: Tier) -> (Arc<dyn Store>, Uuid) {
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
                require_approval: true,
                tier,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (store, project.id)
    }

    #[tokio::test]
    async fn free_tier_admits_five_then_denies() {
        let (store, project_id) = project_with_tier(Tier::Free).await;
        let meter = TierMeter::new(store);

        for _ in 0..5 {
            let check = meter.check(project_id, LimitType::SemanticSearch).await.unwrap();
            assert!(check.allowed);
            meter.increment(project_id, LimitType::SemanticSearch);
        }

        let sixth = meter.check(project_id, LimitType::SemanticSearch).await.unwrap();
        assert!(!sixth.allowed);
    }

    #[tokio::test]
    async fn pro_tier_is_unlimited() {
        let (store, project_id) = project_with_tier(Tier::Pro).await;
        let meter = TierMeter::new(store);
        for _ in 0..100 {
            meter.increment(project_id, LimitType::RagAnswer);
        }
        let check = meter.check(project_id, LimitType::RagAnswer).await.unwrap();
        assert!(check.allowed);
    }

    #[tokio::test]
    async fn tier_cache_serves_stale_value_within_ttl() {
        let (store, project_id) = project_with_tier(Tier::Free).await;
        let meter = TierMeter::new(store.clone());

        assert_eq!(meter.tier(project_id).await.unwrap(), Tier::Free);

        store.update_project_tier(project_id, Tier::Pro).await.unwrap();
        // Cache hasn't expired yet, so we still observe the old tier.
        assert_eq!(meter.tier(project_id).await.unwrap(), Tier::Free);

        meter.invalidate(project_id);
        assert_eq!(meter.tier(project_id).await.unwrap(), Tier::Pro);
    }

    #[tokio::test]
    async fn footer_only_rendered_for_free_tier() {
        let (store, project_id) = project_with_tier(Tier::Pro).await;
        let meter = TierMeter::new(store);
        let footer = meter
            .format_footer(project_id, LimitType::SemanticSearch)
            .await
            .unwrap();
        assert!(footer.is_none());
    }
}
