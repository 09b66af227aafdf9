//! The static per-tier usage table (C6, §4.6). Pure data plus the lookup
//! helpers that `quoth-server`'s `tier_cache` wraps with caching and
//! process-local counters.

use crate::models::{LimitType, Tier};

/// `-1` means unlimited.
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub semantic_searches_per_day: i64,
    pub rag_answers_per_day: i64,
    pub rerank: bool,
    pub rerank_during_genesis: bool,
}

pub fn limits_for(tier: Tier) -> TierLimits {
    match tier {
        Tier::Free => TierLimits {
            semantic_searches_per_day: 5,
            rag_answers_per_day: 3,
            rerank: false,
            rerank_during_genesis: true,
        },
        Tier::Pro => TierLimits {
            semantic_searches_per_day: UNLIMITED,
            rag_answers_per_day: UNLIMITED,
            rerank: true,
            rerank_during_genesis: true,
        },
        Tier::Team => TierLimits {
            semantic_searches_per_day: UNLIMITED,
            rag_answers_per_day: UNLIMITED,
            rerank: true,
            rerank_during_genesis: true,
        },
    }
}

pub fn limit_for(tier: Tier, limit_type: LimitType) -> i64 {
    let limits = limits_for(tier);
    match limit_type {
        LimitType::SemanticSearch => limits.semantic_searches_per_day,
        LimitType::RagAnswer => limits.rag_answers_per_day,
    }
}

/// §4.6 `should_rerank`: enabled by the tier outright, or by the tier's
/// genesis-rerank allowance when the caller is the Genesis persona.
pub fn should_rerank(tier: Tier, is_genesis: bool) -> bool {
    let limits = limits_for(tier);
    limits.rerank || (is_genesis && limits.rerank_during_genesis)
}

/// Outcome of a [`crate::tier`] admission check, independent of how the
/// caller tracks the counter.
#[derive(Debug, Clone, Copy)]
pub struct CheckResult {
    pub allowed: bool,
    pub remaining: i64,
    pub limit: i64,
}

/// Pure admission decision given a tier's limit and the count already used
/// today. `quoth-server`'s `tier_cache` owns the actual counter storage and
/// UTC-date rollover.
pub fn check(limit: i64, count_used_today: i64) -> CheckResult {
    if limit == UNLIMITED {
        return CheckResult {
            allowed: true,
            remaining: UNLIMITED,
            limit,
        };
    }
    let remaining = (limit - count_used_today).max(0);
    CheckResult {
        allowed: count_used_today < limit,
        remaining,
        limit,
    }
}

/// §4.6 `format_footer`: only the free tier gets a trailing quota message.
pub fn format_footer(tier: Tier, limit_type: LimitType, remaining: i64) -> Option<String> {
    if !matches!(tier, Tier::Free) {
        return None;
    }
    let what = match limit_type {
        LimitType::SemanticSearch => "semantic searches",
        LimitType::RagAnswer => "RAG answers",
    };
    Some(format!(
        "Free tier: {remaining} {what} remaining today. Upgrade to pro for unlimited search."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_table_matches_spec() {
        let limits = limits_for(Tier::Free);
        assert_eq!(limits.semantic_searches_per_day, 5);
        assert_eq!(limits.rag_answers_per_day, 3);
        assert!(!limits.rerank);
        assert!(limits.rerank_during_genesis);
    }

    #[test]
    fn pro_and_team_are_unlimited_and_rerank_enabled() {
        for tier in [Tier::Pro, Tier::Team] {
            let limits = limits_for(tier);
            assert_eq!(limits.semantic_searches_per_day, UNLIMITED);
            assert_eq!(limits.rag_answers_per_day, UNLIMITED);
            assert!(limits.rerank);
        }
    }

    #[test]
    fn should_rerank_genesis_override_only_applies_when_genesis() {
        assert!(!should_rerank(Tier::Free, false));
        assert!(should_rerank(Tier::Free, true));
        assert!(should_rerank(Tier::Pro, false));
    }

    #[test]
    fn check_unlimited_always_allows() {
        let r = check(UNLIMITED, 999);
        assert!(r.allowed);
        assert_eq!(r.remaining, UNLIMITED);
    }

    #[test]
    fn check_free_tier_overflow_at_five() {
        // Seed scenario S4: 5 searches succeed, the 6th is denied.
        for used in 0..5 {
            assert!(check(5, used).allowed);
        }
        let sixth = check(5, 5);
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
    }

    #[test]
    fn footer_only_for_free_tier() {
        assert!(format_footer(Tier::Pro, LimitType::SemanticSearch, 0).is_none());
        assert!(format_footer(Tier::Free, LimitType::SemanticSearch, 2).is_some());
    }
}
