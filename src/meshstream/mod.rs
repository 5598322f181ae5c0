//! MESHJOIN stream-to-relation enrichment engine.

pub mod config;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod types;
