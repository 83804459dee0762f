//! # repo-indexer core
//!
//! I/O-free logic for repo-indexer: data models, the heuristic entity
//! extractor, content truncation, deterministic chunk ids, the vector
//! index abstraction with its scoped gateway, and the job store traits.
//!
//! Nothing in this crate touches the network, the filesystem or a
//! database. Backends live in the application crate; in-memory versions
//! of every backend trait are provided here for tests.

pub mod chunk;
pub mod extract;
pub mod models;
pub mod status;
pub mod store;
pub mod truncate;
pub mod vector;
