//! The error kinds every caller of a tool or HTTP endpoint can observe.
//!
//! One enum, mapped to an HTTP status at the transport edge and to an MCP
//! tool error content block at the dispatcher edge. Internal code keeps
//! using `anyhow::Result` for ordinary fallible operations and converts
//! into a specific [`QuothError`] variant only where the boundary needs one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuothError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Not a hard error — callers degrade to the keyword-fallback path and
    /// surface `tier_message` rather than aborting the request.
    #[error("tier limited: {0}")]
    TierLimited(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl QuothError {
    pub fn status_code(&self) -> u16 {
        match self {
            QuothError::Unauthenticated => 401,
            QuothError::Forbidden(_) => 403,
            QuothError::NotFound(_) => 404,
            QuothError::ValidationError(_) => 400,
            QuothError::Conflict(_) => 409,
            QuothError::RateLimited { .. } => 429,
            QuothError::TierLimited(_) => 200,
            QuothError::BackendUnavailable(_) => 503,
            QuothError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            QuothError::Unauthenticated => "unauthenticated",
            QuothError::Forbidden(_) => "forbidden",
            QuothError::NotFound(_) => "not_found",
            QuothError::ValidationError(_) => "validation_error",
            QuothError::Conflict(_) => "conflict",
            QuothError::RateLimited { .. } => "rate_limited",
            QuothError::TierLimited(_) => "tier_limited",
            QuothError::BackendUnavailable(_) => "backend_unavailable",
            QuothError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(QuothError::Unauthenticated.status_code(), 401);
        assert_eq!(QuothError::Forbidden("viewer".into()).status_code(), 403);
        assert_eq!(QuothError::NotFound("doc".into()).status_code(), 404);
        assert_eq!(
            QuothError::RateLimited {
                retry_after_secs: 30
            }
            .status_code(),
            429
        );
        assert_eq!(QuothError::TierLimited("free".into()).status_code(), 200);
    }
}
