//! # Repo Indexer
//!
//! Turns GitHub repositories into searchable semantic code chunks stored
//! in a hosted vector index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  GitHub  │──▶│   Archive    │──▶│    Entity     │──▶│ Vector index │
//! │ tarball  │   │   ingest     │   │   extractor   │   │  (Upstash)   │
//! └──────────┘   └──────────────┘   └───────────────┘   └──────┬───────┘
//!                        job records (SQLite)                   │
//!                      ┌──────────────────────┬─────────────────┤
//!                      ▼                      ▼                 ▼
//!                 ┌──────────┐          ┌──────────┐       ┌──────────┐
//!                 │   CLI    │          │   HTTP   │       │  search  │
//!                 │ (rindex) │          │   API    │       │          │
//!                 └──────────┘          └──────────┘       └──────────┘
//! ```
//!
//! Parsing, truncation, chunk ids and the vector gateway live in
//! `repo-indexer-core`; this crate wires them to SQLite, GitHub and the
//! network.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite job and credential stores |
//! | [`github`] | GitHub metadata and tarball client |
//! | [`archive`] | Tarball decompression and filtering |
//! | [`upstash`] | Upstash Vector REST backend |
//! | [`ingest`] | Indexing pipeline orchestration |
//! | [`progress`] | Progress reporting |
//! | [`state`] | Shared application state |
//! | [`server`] | HTTP API |
//! | [`search`] | CLI search |
//! | [`status_cmd`] | CLI status and delete |

pub mod archive;
pub mod config;
pub mod db;
pub mod github;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod state;
pub mod status_cmd;
pub mod upstash;
