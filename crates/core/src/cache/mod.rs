//! SQLite-backed versioned cache store for response snapshots.
//!
//! This module provides the durable store behind the offline agent, using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - One store per cache version, keyed by an opaque version string
//! - Request-identity addressing using SHA-256 hashing
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Atomic all-or-nothing version commits for precaching

pub mod connection;
pub mod entries;
pub mod key;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheStore;
pub use entries::Entry;
