//! # Knowledge Search Core
//!
//! Runtime-agnostic retrieval and ranking for knowledge-graph records:
//! data model, BM25 index and cache, intent routing, rank fusion, domain
//! scoring, and the per-type and cross-type search pipelines.
//!
//! This crate has no tokio, sqlx or filesystem dependencies. Concurrency is
//! expressed with `futures` combinators; timers and storage backends are
//! supplied by the application.
//!
//! | Module | Role |
//! |--------|------|
//! | [`models`] | Record sum type, filters, search results |
//! | [`bm25`] | Okapi BM25 index and tokenizer |
//! | [`text`] | Weighted lexical documents per record type |
//! | [`cache`] | TTL + LRU cache of built indexes |
//! | [`lexical`] | Per-type BM25 search over the record store |
//! | [`intent`] | Query intent classifier |
//! | [`strategy`] | Intent → per-type retrieval weights |
//! | [`fusion`] | Weighted Reciprocal Rank Fusion |
//! | [`scoring`] | Domain relevance scorer |
//! | [`orchestrator`] | Per-type search pipeline |
//! | [`aggregate`] | Fan-out, deadline and global budget |
//! | [`store`] | Record / vector store traits, in-memory backend |
//! | [`embedding`] | Embedder trait, hashing embedder, vector helpers |

pub mod aggregate;
pub mod bm25;
pub mod cache;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod intent;
pub mod lexical;
pub mod models;
pub mod orchestrator;
pub mod scoring;
pub mod store;
pub mod strategy;
pub mod text;
