//! # repo-insight
//!
//! Fingerprints source repositories and searches them. An analysis pulls a
//! repository's important files from the source host, asks a language model
//! for its features, structure and tech stack, and extracts a syntax summary
//! of every code file. Searches are scored lexically against those summaries
//! and then re-ranked with the model's help.
//!
//! ## Analysis
//!
//! ```text
//!   tree ─▶ select ─▶ fetch ─▶ features ─▶ structure ─▶ tech stack
//!                                                          │
//!                  store ◀─ summary ◀─ AST artifacts ∥ metrics
//! ```
//!
//! ## Search
//!
//! ```text
//!   query ─▶ intent ─▶ patterns ─▶ matcher ─▶ ranker (0.3 heuristic + 0.7 model) ─▶ summary
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration
//! - [`error`] - Error taxonomy: local, stage-fatal and not-found
//! - [`models`] - Repository, Analysis, search and event types
//! - [`selector`] - Picks the files worth fetching from a repository tree
//! - [`extract`] - tree-sitter syntax summaries for Rust, JavaScript/TypeScript and Python
//! - [`summarize`] - Model-backed feature, structure, tech-stack and repository summaries
//! - [`metrics`] - Code metrics and the searchable keyword index
//! - [`pipeline`] - The analysis state machine and its progress events
//! - [`search`] - Intent gating, pattern generation, matching and ranking
//! - [`llm`] - The `Generator` capability with Ollama and OpenAI-compatible adapters
//! - [`source`] - The `SourceBrowser` capability and its GitHub adapter
//! - [`store`] - The `ArtifactStore` capability and its JSON-file implementation
//! - [`events`] - Bounded progress channels feeding SSE responses
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod selector;
pub mod source;
pub mod state;
pub mod store;
pub mod summarize;
