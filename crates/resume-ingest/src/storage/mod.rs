//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for candidates, parsed resume data and
//! pipeline status.

mod database;

pub use database::IngestDb;
