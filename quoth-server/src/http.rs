//! HTTP/SSE Transport (C15, §4.15).
//!
//! Grounded directly on the teacher's `server.rs`: the same `AppState`-via-
//! `State` extractor shape, the same permissive `CorsLayer`, the same
//! `AppError`-implements-`IntoResponse` error contract. Generalized from
//! four REST-ish routes to the MCP JSON-RPC dispatch routes `rmcp`'s
//! streamable-HTTP transport provides, plus bearer extraction that accepts
//! either the `Authorization` header or a `?token=` query parameter for
//! transports (SSE) that can't set headers.
//!
//! Also owns §5's HTTP-layer rate limit map: fixed-window counters keyed by
//! caller IP, with a background reaper sweeping expired windows every five
//! minutes — a concern the teacher's REST server never needed since it had
//! no concept of a multi-tenant caller population.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use dashmap::DashMap;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AuthVerifier;
use crate::mcp::{ConnectionId, McpBridge};
use crate::tools::AppState;

/// §5: fixed-window counters. 60 requests/minute per caller key by default;
/// generous enough not to bother a legitimate single agent connection but
/// present so a single caller can't monopolize the process.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const RATE_LIMIT_MAX_REQUESTS: u32 = 120;
const RATE_LIMIT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct Window {
    count: u32,
    started_at: Instant,
}

/// Process-local, IP-or-bearer-keyed request counter. Reaped periodically
/// rather than on every request, matching §5's "background reaper every 5
/// minutes" description exactly rather than an eager per-request sweep.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, key: &str) -> Result<(), u64> {
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            started_at: Instant::now(),
        });

        if entry.started_at.elapsed() >= RATE_LIMIT_WINDOW {
            entry.count = 0;
            entry.started_at = Instant::now();
        }

        entry.count += 1;
        if entry.count > RATE_LIMIT_MAX_REQUESTS {
            let retry_after = RATE_LIMIT_WINDOW.saturating_sub(entry.started_at.elapsed());
            return Err(retry_after.as_secs().max(1));
        }
        Ok(())
    }

    fn reap_expired(&self) {
        self.windows
            .retain(|_, window| window.started_at.elapsed() < RATE_LIMIT_WINDOW);
    }
}

pub async fn run_reaper(limiter: Arc<RateLimiter>) {
    let mut ticker = tokio::time::interval(RATE_LIMIT_REAP_INTERVAL);
    loop {
        ticker.tick().await;
        limiter.reap_expired();
    }
}

#[derive(Clone)]
struct HttpState {
    app: Arc<AppState>,
    verifier: Arc<AuthVerifier>,
    limiter: Arc<RateLimiter>,
}

/// Builds the full router: CORS, rate limiting, bearer auth, and the MCP
/// streamable-HTTP service mounted at `/mcp`.
pub fn build_router(app: Arc<AppState>, verifier: Arc<AuthVerifier>, limiter: Arc<RateLimiter>) -> Router {
    let state = HttpState {
        app: app.clone(),
        verifier,
        limiter,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let tools = Arc::new(crate::tools::ToolRegistry::with_builtins());
    let bridge_app = app.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok(McpBridge::new(bridge_app.clone(), tools.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let guarded_mcp = ServiceBuilder::new()
        .layer(middleware::from_fn_with_state(state.clone(), auth_and_rate_limit))
        .service(mcp_service);

    Router::new()
        .route("/health", axum::routing::get(handle_health))
        .nest_service("/mcp", guarded_mcp)
        .layer(cors)
        .with_state(state)
}

/// §4.15 bearer extraction: `Authorization: Bearer <token>` preferred;
/// `?token=<token>` accepted for transports that can't set headers (SSE).
/// Also the §5 rate-limit gate, keyed on the caller's socket address since
/// the bearer isn't verified yet at this point in the middleware chain.
async fn auth_and_rate_limit(
    State(state): State<HttpState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let rate_key = addr.ip().to_string();
    if let Err(retry_after) = state.limiter.check(&rate_key) {
        return rate_limited_response(retry_after);
    }

    let bearer = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or(query.token);

    let Some(bearer) = bearer else {
        return unauthenticated_response();
    };

    let auth = match state.verifier.verify(&bearer).await {
        Ok(auth) => auth,
        Err(_) => return unauthenticated_response(),
    };

    // The bearer itself is a stable enough per-connection key: the same
    // token reused across a streamable-HTTP session's requests lands on
    // the same Session Manager entry, which is what C8 requires.
    let connection_id = ConnectionId(md5_hex(&bearer));

    request.extensions_mut().insert(auth);
    request.extensions_mut().insert(connection_id);

    next.run(request).await
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

fn unauthenticated_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: ErrorDetail {
                code: "unauthenticated".to_string(),
                message: "missing or invalid bearer token".to_string(),
            },
        }),
    )
        .into_response()
}

fn rate_limited_response(retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            error: ErrorDetail {
                code: "rate_limited".to_string(),
                message: format!("rate limit exceeded, retry after {retry_after_secs}s"),
            },
        }),
    )
        .into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers_mut().insert("Retry-After", value);
    }
    response
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_until_threshold_then_denies() {
        let limiter = RateLimiter::new();
        for _ in 0..RATE_LIMIT_MAX_REQUESTS {
            assert!(limiter.check("1.2.3.4").is_ok());
        }
        assert!(limiter.check("1.2.3.4").is_err());
    }

    #[test]
    fn rate_limiter_tracks_keys_independently() {
        let limiter = RateLimiter::new();
        for _ in 0..RATE_LIMIT_MAX_REQUESTS {
            assert!(limiter.check("a").is_ok());
        }
        assert!(limiter.check("b").is_ok());
    }
}
