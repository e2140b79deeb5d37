//! Session source adapters
//!
//! Each adapter projects one tool's on-disk session logs into the
//! normalized [`Session`]/[`Message`] model. Adapters are registered in a
//! [`SourceRegistry`], which fans requests out across sources, merges
//! newest-first, and keeps the search index fresh before queries.
//!
//! Extended pagination (exact totals, reverse addressing) is an optional
//! capability: an adapter either exposes it through [`PaginatedSource`] or
//! it does not, and callers probe for it dynamically via
//! [`SessionSource::pagination`] instead of assuming support.

pub mod copilot;
pub mod mistral;
pub mod opencode;

pub use copilot::CopilotSource;
pub use mistral::MistralSource;
pub use opencode::OpencodeSource;

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::error::{CoderecallError, Result};
use crate::model::{Message, Session};
use crate::search::{SearchCache, SearchResult};

/// Page size used when an entire session must be read in one call, e.g. for
/// indexing.
pub const ALL_MESSAGES_PAGE_SIZE: usize = 100_000;

/// One page of messages plus pagination metadata.
///
/// `total` is `None` when the serving source cannot count cheaply; in that
/// case `has_more` comes from over-fetching and `resolved_page` echoes the
/// request.
#[derive(Debug, Clone)]
pub struct SessionPage {
    pub messages: Vec<Message>,
    pub total: Option<usize>,
    pub resolved_page: i64,
    pub has_more: bool,
}

/// Operation set every backend adapter implements.
pub trait SessionSource {
    /// Stable source tag, also the registry key.
    fn name(&self) -> &'static str;

    /// Sessions newest first. `limit == 0` means unbounded. A per-item parse
    /// failure is skipped, never aborting the whole listing; a missing root
    /// directory yields an empty list.
    fn list_sessions(&self, project: Option<&Path>, limit: usize) -> Result<Vec<Session>>;

    /// Forward-only message window for one session.
    fn get_session(&self, session_id: &str, page: usize, page_size: usize)
        -> Result<Vec<Message>>;

    /// Extended-pagination capability probe; `None` when unsupported.
    fn pagination(&self) -> Option<&dyn PaginatedSource> {
        None
    }
}

/// Optional capability: exact counts and reverse addressing.
pub trait PaginatedSource {
    fn get_session_page(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
        from_end: bool,
    ) -> Result<SessionPage>;
}

/// Registry of session sources, keyed by source tag.
pub struct SourceRegistry {
    sources: BTreeMap<&'static str, Box<dyn SessionSource>>,
}

impl SourceRegistry {
    /// Empty registry; sources are added with [`SourceRegistry::register`].
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }

    /// Registry with every built-in source, rooted per `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CopilotSource::new(
            config.copilot_sessions_dir.clone(),
        )));
        registry.register(Box::new(MistralSource::new(
            config.mistral_sessions_dir.clone(),
        )));
        registry.register(Box::new(OpencodeSource::new(
            config.opencode_db_path.clone(),
            config.opencode_storage_dir.clone(),
        )));
        registry
    }

    pub fn register(&mut self, source: Box<dyn SessionSource>) {
        self.sources.insert(source.name(), source);
    }

    /// Registered source tags, sorted.
    pub fn sources(&self) -> Vec<&'static str> {
        self.sources.keys().copied().collect()
    }

    fn select(&self, source: Option<&str>) -> Result<Vec<&dyn SessionSource>> {
        match source {
            Some(name) => {
                let adapter = self
                    .sources
                    .get(name)
                    .ok_or_else(|| CoderecallError::SourceNotFound(name.to_string()))?;
                Ok(vec![adapter.as_ref()])
            }
            None => Ok(self.sources.values().map(|s| s.as_ref()).collect()),
        }
    }

    /// List sessions across the selected sources, newest first.
    ///
    /// One failing source is logged and skipped; the listing succeeds with
    /// whatever the remaining sources produced. Only an unknown source key
    /// is a hard error.
    pub fn list_sessions(
        &self,
        source: Option<&str>,
        project: Option<&Path>,
        limit: usize,
    ) -> Result<Vec<Session>> {
        let mut all = Vec::new();
        for adapter in self.select(source)? {
            match adapter.list_sessions(project, limit) {
                Ok(sessions) => all.extend(sessions),
                Err(e) => {
                    tracing::warn!(source = adapter.name(), error = %e, "failed to list sessions");
                }
            }
        }

        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if limit > 0 && all.len() > limit {
            all.truncate(limit);
        }
        Ok(all)
    }

    /// Fetch one page of a session's messages.
    ///
    /// Uses the extended capability when the source has it. Otherwise the
    /// page is served forward-only: `from_end` is rejected, the total is
    /// unknown, and `has_more` is determined by probing one message past the
    /// returned window.
    pub fn get_session_page(
        &self,
        source: &str,
        session_id: &str,
        page: usize,
        page_size: usize,
        from_end: bool,
    ) -> Result<SessionPage> {
        let adapter = self
            .sources
            .get(source)
            .ok_or_else(|| CoderecallError::SourceNotFound(source.to_string()))?;

        if let Some(paginated) = adapter.pagination() {
            return paginated.get_session_page(session_id, page, page_size, from_end);
        }

        if from_end {
            return Err(CoderecallError::ReverseUnsupported(source.to_string()).into());
        }

        let messages = adapter.get_session(session_id, page, page_size)?;
        let has_more = if messages.len() < page_size {
            false
        } else {
            // A size-1 page at index N starts at raw offset N, so this probes
            // exactly the first message after the returned window.
            let probe_offset = page * page_size + messages.len();
            !adapter.get_session(session_id, probe_offset, 1)?.is_empty()
        };

        Ok(SessionPage {
            messages,
            total: None,
            resolved_page: page as i64,
            has_more,
        })
    }

    /// Ranked full-text search over the selected sources.
    ///
    /// Runs the lazy freshness sweep first, then queries the index. Sweep
    /// failures degrade the result set; they never fail the search.
    pub fn search(
        &self,
        cache: &SearchCache,
        query: &str,
        source: Option<&str>,
        project: Option<&Path>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        self.refresh_index(cache, source, project)?;
        cache.search(query, source, project, limit)
    }

    /// Reindex every session in scope whose fingerprint went stale.
    ///
    /// Sessions are swept sequentially; latency is linear in the number of
    /// stale sessions touched. A single session's failure is logged and
    /// skipped.
    pub fn refresh_index(
        &self,
        cache: &SearchCache,
        source: Option<&str>,
        project: Option<&Path>,
    ) -> Result<()> {
        for adapter in self.select(source)? {
            let sessions = match adapter.list_sessions(project, 0) {
                Ok(sessions) => sessions,
                Err(e) => {
                    tracing::warn!(source = adapter.name(), error = %e, "skipping source during index sweep");
                    continue;
                }
            };

            for session in sessions {
                match cache.needs_reindex(&session.id, &session.file_path) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(e) => {
                        tracing::warn!(session = %session.id, error = %e, "freshness check failed");
                        continue;
                    }
                }

                let messages = match adapter.get_session(&session.id, 0, ALL_MESSAGES_PAGE_SIZE) {
                    Ok(messages) => messages,
                    Err(e) => {
                        tracing::warn!(session = %session.id, error = %e, "failed to read session for indexing");
                        continue;
                    }
                };

                let mut content = Vec::with_capacity(messages.len() + 2);
                if !session.first_message.is_empty() {
                    content.push(session.first_message.clone());
                }
                if !session.summary.is_empty() {
                    content.push(session.summary.clone());
                }
                for message in &messages {
                    if !message.content.is_empty() {
                        content.push(message.content.clone());
                    }
                }

                if let Err(e) = cache.index_session(&session, &content.join(" ")) {
                    tracing::warn!(session = %session.id, error = %e, "failed to index session");
                }
            }
        }
        Ok(())
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
