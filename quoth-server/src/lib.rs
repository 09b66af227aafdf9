//! # quoth-server
//!
//! The stateful application half of quoth-mcp: configuration, the Postgres
//! `Store` implementation, auth verification, the per-connection session
//! manager, the tier cache and usage counters, the embedding/reranker HTTP
//! gateway clients, the retrieval pipeline and incremental indexer, the
//! proposal engine, the agent bus, Genesis persona delivery, the activity
//! log, health/coverage/drift analytics, the MCP tool registry, and the
//! HTTP/SSE transport.
//!
//! `quoth-core` holds everything pure (models, chunking, the cutoff
//! algorithm, the tier table, signing); this crate wires those against
//! tokio, sqlx, reqwest, axum, and rmcp.

pub mod activity;
pub mod agent_bus;
pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod embedding_client;
pub mod genesis;
pub mod http;
pub mod indexer;
pub mod mcp;
pub mod migrate;
pub mod postgres_store;
pub mod proposal;
pub mod rerank_client;
pub mod retrieval;
pub mod session;
pub mod tier_cache;
pub mod tools;

pub use config::Config;
