//! # Knowledge Search
//!
//! Hybrid BM25 + vector retrieval over knowledge-graph records (entities,
//! relations, topics, startups, focus initiatives, meeting notes and
//! regulations), with query-intent routing, reciprocal rank fusion and a
//! global result budget.
//!
//! The ranking pipeline itself lives in the `knowledge-search-core` crate;
//! this crate wires it to SQLite, embedding providers, persisted settings
//! and the `ksearch` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────────────┐
//! │  import  │──▶│    SQLite     │◀──│ SearchEngine             │
//! │  (JSON)  │   │ records+vecs  │   │  router → 7× orchestrator │
//! └──────────┘   └──────────────┘   │  → budgeted merge         │
//!                                    └────────────┬─────────────┘
//!                                                 ▼
//!                                          ┌──────────┐
//!                                          │   CLI    │
//!                                          │(ksearch) │
//!                                          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ksearch init                          # create database
//! ksearch import records.json           # load records
//! ksearch search "トヨタとホンダの関係" --explain
//! ksearch settings set --enable-router false
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Record, vector and settings storage |
//! | [`embedding`] | Embedding provider selection |
//! | [`settings`] | Persisted search toggles |
//! | [`engine`] | Top-level search and cache invalidation |
//! | [`import`] | JSON record import |
//! | [`search`] | CLI search, classify and cache commands |
//! | [`settings_cmd`] | CLI settings commands |

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod import;
pub mod migrate;
pub mod search;
pub mod settings;
pub mod settings_cmd;
pub mod sqlite_store;
