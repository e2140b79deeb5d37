//! Lazily-maintained full-text search over indexed sessions
//!
//! The cache is brought up to date by the orchestration layer before each
//! query (see [`crate::adapters::SourceRegistry::search`]); this module owns
//! the durable store and the ranking math.

pub mod bm25;
pub mod cache;

pub use bm25::SearchParams;
pub use cache::{SearchCache, SearchResult};
