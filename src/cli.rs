//! Command-line interface definition for coderecall
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for listing, reading, and searching sessions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// coderecall - browse and search AI coding assistant sessions
///
/// Unifies session logs from Copilot CLI, Mistral Vibe, and opencode into
/// one normalized listing with paginated reading and ranked full-text
/// search.
#[derive(Parser, Debug, Clone)]
#[command(name = "coderecall")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the search index cache database path
    #[arg(long, env = "CODERECALL_CACHE_DB")]
    pub cache_db: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for coderecall
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List which session sources are available
    Sources,

    /// List recent sessions, newest first
    List {
        /// Filter by source (copilot, mistral, opencode)
        #[arg(short, long)]
        source: Option<String>,

        /// Filter by project directory path
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Maximum number of sessions to return (0 = unbounded)
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one session's messages, with pagination
    Show {
        /// The source that created the session (copilot, mistral, opencode)
        source: String,

        /// The session ID to read
        session_id: String,

        /// Page number, 0-indexed
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Messages per page
        #[arg(long, default_value_t = 20)]
        page_size: usize,

        /// Address pages from the end: page 0 is the last page
        ///
        /// Only sources with exact message counts support this (opencode).
        #[arg(long)]
        from_end: bool,

        /// Emit JSON instead of a transcript
        #[arg(long)]
        json: bool,
    },

    /// Search session content with BM25 ranking
    Search {
        /// Search query
        query: String,

        /// Filter by source (copilot, mistral, opencode)
        #[arg(short, long)]
        source: Option<String>,

        /// Filter by project directory path
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Maximum number of matches to return (0 = unbounded)
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
