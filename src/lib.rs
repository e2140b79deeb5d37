//! coderecall - unified browsing and search over AI coding sessions
//!
//! This library normalizes the heterogeneous session logs written by AI
//! coding CLIs (JSONL event streams, flat JSON files, SQLite databases)
//! into one Session/Message model, and provides paginated retrieval plus
//! lazily-maintained BM25 full-text search over it.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `model`: Normalized Session/Message records and content-part resolution
//! - `adapters`: Per-tool source adapters and the source registry
//! - `paginate`: Pure pagination window arithmetic, including reverse addressing
//! - `search`: Durable BM25 index cache with lazy freshness maintenance
//! - `config`: Resolved filesystem layout for sources and the cache
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use coderecall::{Config, SourceRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::resolve()?;
//!     let registry = SourceRegistry::from_config(&config);
//!     let sessions = registry.list_sessions(None, None, 10)?;
//!     for session in sessions {
//!         println!("{} {}", session.source, session.id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod paginate;
pub mod search;

// Re-export commonly used types
pub use adapters::{PaginatedSource, SessionPage, SessionSource, SourceRegistry};
pub use config::Config;
pub use error::{CoderecallError, Result};
pub use model::{Message, PartKind, Role, Session};
pub use search::{SearchCache, SearchParams, SearchResult};
