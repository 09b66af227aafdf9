//! `quoth` — the operational CLI for the quoth-mcp server.
//!
//! Grounded directly on the teacher's `ctx` binary (`main.rs`'s clap
//! `Cli`/`Commands` derive pattern), trimmed to the three operational
//! subcommands this spec's scope needs: `serve` (start the HTTP/MCP
//! server), `migrate` (run schema migrations), and `tier show` (print the
//! static per-tier usage table). The ingestion/connector/embed-CLI surface
//! the teacher exposes has no counterpart here — `quoth_propose_update` is
//! the only document-write path this spec describes, and agents push
//! content over MCP rather than the server pulling it from connectors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use quoth_core::rerank::RerankProvider;
use quoth_core::store::Store;

use quoth_server::activity::ActivityLogger;
use quoth_server::agent_bus::AgentBus;
use quoth_server::analytics::Analytics;
use quoth_server::auth::AuthVerifier;
use quoth_server::config::{self, Config};
use quoth_server::db;
use quoth_server::embedding_client::HttpEmbeddingProvider;
use quoth_server::http::{self, RateLimiter};
use quoth_server::indexer::Indexer;
use quoth_server::migrate;
use quoth_server::postgres_store::PostgresStore;
use quoth_server::proposal::ProposalEngine;
use quoth_server::rerank_client::HttpRerankProvider;
use quoth_server::retrieval::RetrievalPipeline;
use quoth_server::session::{self, SessionManager};
use quoth_server::tier_cache::TierMeter;
use quoth_server::tools::AppState;

#[derive(Parser)]
#[command(name = "quoth", about = "quoth-mcp — multi-tenant MCP documentation server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/MCP server (C15).
    Serve,

    /// Run database schema migrations and exit.
    Migrate,

    /// Print the static per-tier usage table (C6).
    Tier {
        #[command(subcommand)]
        action: TierAction,
    },
}

#[derive(Subcommand)]
enum TierAction {
    /// Show the semantic-search/rag-answer/rerank table for every tier.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            let config = config::load_from_env()?;
            migrate::run_migrations(&config).await?;
            tracing::info!("database schema migrated");
        }
        Commands::Tier { action } => match action {
            TierAction::Show => print_tier_table(),
        },
        Commands::Serve => {
            run_serve().await?;
        }
    }

    Ok(())
}

fn print_tier_table() {
    use quoth_core::models::Tier;
    use quoth_core::tier::limits_for;

    println!("{:<6} {:>10} {:>10} {:>7} {:>10}", "tier", "searches", "rag", "rerank", "genesis");
    for tier in [Tier::Free, Tier::Pro, Tier::Team] {
        let limits = limits_for(tier);
        let fmt = |n: i64| if n < 0 { "unlimited".to_string() } else { n.to_string() };
        println!(
            "{:<6} {:>10} {:>10} {:>7} {:>10}",
            format!("{tier:?}").to_lowercase(),
            fmt(limits.semantic_searches_per_day),
            fmt(limits.rag_answers_per_day),
            limits.rerank,
            limits.rerank_during_genesis,
        );
    }
}

/// Wires every collaborator (§4's C1-C15) into one [`AppState`], then binds
/// the HTTP/MCP transport. Grounded on the teacher's `server::run_server`
/// entry point, generalized from a single `AppState { config }` to the
/// full multi-tenant collaborator graph this spec's tools need.
async fn run_serve() -> anyhow::Result<()> {
    let config = config::load_from_env()?;
    let config = Arc::new(config);

    migrate::run_migrations(&config).await?;
    let pool = db::connect(&config).await?;
    let store: Arc<dyn Store> = Arc::new(PostgresStore::new(pool));

    let embedder = Arc::new(HttpEmbeddingProvider::new(&config.embedding)?);

    let reranker: Option<Arc<dyn RerankProvider>> = match &config.reranker {
        Some(reranker_config) => {
            tracing::info!("reranker enabled");
            Some(Arc::new(HttpRerankProvider::new(reranker_config)?) as Arc<dyn RerankProvider>)
        }
        None => {
            tracing::warn!("RERANKER_PROVIDER_KEY not set; reranking disabled globally");
            None
        }
    };

    let tier_meter = Arc::new(TierMeter::new(store.clone()));
    let retrieval = Arc::new(RetrievalPipeline::new(store.clone(), embedder.clone(), reranker, tier_meter.clone()));
    let indexer = Arc::new(Indexer::new(store.clone(), embedder, config.indexer.embed_pacing));
    let proposals = Arc::new(ProposalEngine::new(store.clone(), indexer.clone(), config.bus_signing_secret.clone()));
    let agent_bus = Arc::new(AgentBus::new(store.clone(), config.bus_signing_secret.clone()));
    let activity = ActivityLogger::new(store.clone());
    let analytics = Arc::new(Analytics::new(store.clone()));
    let sessions = Arc::new(SessionManager::new());

    let templates_dir = std::env::var("QUOTH_TEMPLATES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("templates"));

    let app_state = Arc::new(AppState {
        store,
        config: config.clone(),
        sessions: sessions.clone(),
        retrieval,
        tier_meter,
        indexer,
        proposals,
        agent_bus,
        activity,
        analytics,
        templates_dir,
    });

    let verifier = Arc::new(AuthVerifier::new(config.clone()));
    let limiter = Arc::new(RateLimiter::new());

    tokio::spawn(session::run_reaper(sessions, std::time::Duration::from_secs(60 * 60)));
    tokio::spawn(http::run_reaper(limiter.clone()));

    let router = http::build_router(app_state, verifier, limiter);
    let bind_addr: SocketAddr = config.server.bind.parse()?;

    tracing::info!(%bind_addr, "quoth-server listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
