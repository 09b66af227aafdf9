//! Configuration, sourced from environment variables per §6's env var
//! table (the teacher reads a TOML file; this server reads `std::env`
//! instead, since every config knob here is a per-deployment secret or
//! endpoint rather than a tunable retrieval parameter).

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub app_url: String,
    pub jwt_secret: String,
    pub identity_provider_url: Option<String>,
    pub identity_provider_service_key: Option<String>,
    pub embedding: EmbeddingConfig,
    pub reranker: Option<RerankerConfig>,
    pub rag_worker: Option<RagWorkerConfig>,
    pub bus_signing_secret: String,
    pub database_url: String,
    pub server: ServerConfig,
    pub indexer: IndexerConfig,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider_url: String,
    pub provider_key: String,
}

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub provider_key: String,
}

#[derive(Debug, Clone)]
pub struct RagWorkerConfig {
    pub url: String,
    pub key: String,
    /// Optional fallback endpoint, per §6.
    pub fallback_url: Option<String>,
    pub fallback_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Inter-chunk embed pacing. Default ~4s (conservative mode); 0 in
    /// burst mode, per §4.4 step 9.
    pub embed_pacing: std::time::Duration,
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

const DEFAULT_BUS_SECRET: &str = "quoth-dev-insecure-bus-secret";

/// Load configuration from the process environment, per §6.
pub fn load_from_env() -> Result<Config> {
    let app_url = env_var("APP_URL")?;
    let jwt_secret = env_var("JWT_SECRET")?;
    let database_url = env_var("DATABASE_URL")?;

    let identity_provider_url = std::env::var("IDENTITY_PROVIDER_URL").ok();
    let identity_provider_service_key = std::env::var("IDENTITY_PROVIDER_SERVICE_KEY").ok();

    let embedding = EmbeddingConfig {
        provider_url: env_var("EMBEDDING_PROVIDER_URL")?,
        provider_key: env_var("EMBEDDING_PROVIDER_KEY")?,
    };

    let reranker = std::env::var("RERANKER_PROVIDER_KEY")
        .ok()
        .map(|provider_key| RerankerConfig { provider_key });

    let rag_worker = match (
        std::env::var("RAG_WORKER_URL").ok(),
        std::env::var("RAG_WORKER_KEY").ok(),
    ) {
        (Some(url), Some(key)) => Some(RagWorkerConfig {
            url,
            key,
            fallback_url: std::env::var("RAG_WORKER_FALLBACK_URL").ok(),
            fallback_key: std::env::var("RAG_WORKER_FALLBACK_KEY").ok(),
        }),
        _ => None,
    };

    let bus_signing_secret = match std::env::var("BUS_SIGNING_SECRET") {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(
                "BUS_SIGNING_SECRET not set; falling back to an insecure default. \
                 Agent envelope signatures will not be trustworthy across restarts."
            );
            DEFAULT_BUS_SECRET.to_string()
        }
    };

    let server = ServerConfig {
        bind: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
    };

    let pacing_ms: u64 = std::env::var("INDEXER_EMBED_PACING_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4_000);
    let indexer = IndexerConfig {
        embed_pacing: std::time::Duration::from_millis(pacing_ms),
    };

    let config = Config {
        app_url,
        jwt_secret,
        identity_provider_url,
        identity_provider_service_key,
        embedding,
        reranker,
        rag_worker,
        bus_signing_secret,
        database_url,
        server,
        indexer,
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.app_url.trim().is_empty() {
        anyhow::bail!("APP_URL must not be empty");
    }
    if config.jwt_secret.len() < 16 {
        anyhow::bail!("JWT_SECRET must be at least 16 characters");
    }
    if config.database_url.trim().is_empty() {
        anyhow::bail!("DATABASE_URL must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_jwt_secret() {
        let config = Config {
            app_url: "https://example.com".into(),
            jwt_secret: "short".into(),
            identity_provider_url: None,
            identity_provider_service_key: None,
            embedding: EmbeddingConfig {
                provider_url: "https://embed.example.com".into(),
                provider_key: "k".into(),
            },
            reranker: None,
            rag_worker: None,
            bus_signing_secret: "secret".into(),
            database_url: "postgres://localhost/quoth".into(),
            server: ServerConfig {
                bind: "0.0.0.0:8080".into(),
            },
            indexer: IndexerConfig {
                embed_pacing: std::time::Duration::from_secs(4),
            },
        };
        assert!(validate(&config).is_err());
    }
}
