//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Versioned cache store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStore, Entry};
pub use config::AppConfig;
pub use error::Error;
