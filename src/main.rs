//! coderecall - unified AI coding session browser
//!
//! Main entry point for the coderecall CLI.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coderecall::adapters::SourceRegistry;
use coderecall::cli::{Cli, Commands};
use coderecall::commands;
use coderecall::config::Config;
use coderecall::search::SearchCache;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let mut config = Config::resolve()?;
    if let Some(cache_db) = &cli.cache_db {
        config = config.with_cache_db(cache_db.clone());
        tracing::debug!(path = ?config.cache_db_path, "using cache DB override");
    }

    let registry = SourceRegistry::from_config(&config);

    match cli.command {
        Commands::Sources => commands::handle_sources(&registry),
        Commands::List {
            source,
            project,
            limit,
            json,
        } => commands::handle_list(
            &registry,
            source.as_deref(),
            project.as_deref(),
            limit,
            json,
        ),
        Commands::Show {
            source,
            session_id,
            page,
            page_size,
            from_end,
            json,
        } => commands::handle_show(
            &registry,
            &source,
            &session_id,
            page,
            page_size.max(1),
            from_end,
            json,
        ),
        Commands::Search {
            query,
            source,
            project,
            limit,
            json,
        } => {
            let cache = SearchCache::new(config.cache_db_path.clone())?;
            commands::handle_search(
                &registry,
                &cache,
                &query,
                source.as_deref(),
                project.as_deref(),
                limit,
                json,
            )
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
