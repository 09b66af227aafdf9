//! # quoth-core
//!
//! Shared, WASM-safe logic for the quoth-mcp server: data models, chunking,
//! store abstraction, search/cutoff algorithm, embedding and rerank traits,
//! the static tier table, and HMAC signing helpers.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. It compiles to both native targets and
//! `wasm32-unknown-unknown`.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod rerank;
pub mod search;
pub mod signing;
pub mod store;
pub mod tier;

pub use error::QuothError;
