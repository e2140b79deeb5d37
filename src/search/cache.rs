//! Durable full-text index cache
//!
//! One SQLite table holds a document per indexed session: the raw Session
//! columns, the concatenated searchable text, and a fingerprint of the
//! backing file (mtime + size) used to detect staleness without reading it.
//! Entries are replaced on reindex, never appended. The cache lags live
//! files until the freshness sweep before the next search brings the
//! sessions in scope up to date.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{CoderecallError, Result};
use crate::model::Session;

use super::bm25::{self, SearchParams};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Consecutive missing-file observations before an orphaned entry is
/// dropped.
const MISSING_GC_THRESHOLD: i64 = 3;

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub session: Session,
    pub score: f64,
    pub snippet: String,
}

/// Lazily-maintained search index over normalized sessions.
pub struct SearchCache {
    db_path: PathBuf,
    params: SearchParams,
}

impl SearchCache {
    /// Open (creating if needed) the cache at `db_path` with default ranking
    /// parameters.
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        Self::with_params(db_path, SearchParams::default())
    }

    /// Open the cache with caller-tuned ranking parameters.
    pub fn with_params<P: Into<PathBuf>>(db_path: P, params: SearchParams) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache directory {:?}", parent))?;
        }
        let cache = Self { db_path, params };
        cache.init()?;
        Ok(cache)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                session_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                project_path TEXT NOT NULL,
                first_message TEXT NOT NULL,
                summary TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                file_path TEXT NOT NULL,
                user_message_count INTEGER NOT NULL,
                file_mtime_ms INTEGER NOT NULL,
                file_size INTEGER NOT NULL,
                indexed_at TEXT NOT NULL,
                missing_streak INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source);
            CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_path);",
        )?;
        Ok(())
    }

    /// Whether `session_id` must be (re)indexed before it is searchable.
    ///
    /// True when no entry exists or the stored fingerprint no longer matches
    /// the backing file. A vanished backing file reports `false` (there is
    /// nothing to read); after [`MISSING_GC_THRESHOLD`] consecutive such
    /// observations the orphaned entry is dropped.
    pub fn needs_reindex(&self, session_id: &str, file_path: &Path) -> Result<bool> {
        let conn = self.open()?;

        let row: Option<(i64, i64, i64)> = conn
            .query_row(
                "SELECT file_mtime_ms, file_size, missing_streak
                 FROM documents WHERE session_id = ?1",
                [session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((stored_mtime, stored_size, streak)) = row else {
            return Ok(true);
        };

        match fingerprint(file_path) {
            Ok((mtime_ms, size)) => {
                if streak != 0 {
                    conn.execute(
                        "UPDATE documents SET missing_streak = 0 WHERE session_id = ?1",
                        [session_id],
                    )?;
                }
                Ok(mtime_ms != stored_mtime || size != stored_size)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let streak = streak + 1;
                if streak >= MISSING_GC_THRESHOLD {
                    conn.execute(
                        "DELETE FROM documents WHERE session_id = ?1",
                        [session_id],
                    )?;
                    tracing::debug!(session = %session_id, "dropped index entry for vanished backing file");
                } else {
                    conn.execute(
                        "UPDATE documents SET missing_streak = ?1 WHERE session_id = ?2",
                        params![streak, session_id],
                    )?;
                }
                Ok(false)
            }
            Err(e) => Err(e).with_context(|| format!("failed to stat {:?}", file_path)),
        }
    }

    /// Upsert the document for `session`, replacing any prior entry.
    ///
    /// Idempotent: indexing identical input twice leaves queryable behavior
    /// unchanged.
    pub fn index_session(&self, session: &Session, full_text: &str) -> Result<()> {
        let (mtime_ms, size) = fingerprint(&session.file_path).map_err(|e| {
            CoderecallError::Index(format!(
                "failed to fingerprint {:?}: {}",
                session.file_path, e
            ))
        })?;
        let token_count = bm25::tokenize(full_text).len();

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO documents (
                session_id, source, project_path, first_message, summary,
                timestamp, file_path, user_message_count,
                file_mtime_ms, file_size, indexed_at, missing_streak,
                content, token_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?13)
             ON CONFLICT(session_id) DO UPDATE SET
                source = excluded.source,
                project_path = excluded.project_path,
                first_message = excluded.first_message,
                summary = excluded.summary,
                timestamp = excluded.timestamp,
                file_path = excluded.file_path,
                user_message_count = excluded.user_message_count,
                file_mtime_ms = excluded.file_mtime_ms,
                file_size = excluded.file_size,
                indexed_at = excluded.indexed_at,
                missing_streak = 0,
                content = excluded.content,
                token_count = excluded.token_count",
            params![
                session.id,
                session.source,
                session.project_path,
                session.first_message,
                session.summary,
                session.timestamp.to_rfc3339(),
                session.file_path.to_string_lossy(),
                session.user_message_count as i64,
                mtime_ms,
                size,
                Utc::now().to_rfc3339(),
                full_text,
                token_count as i64,
            ],
        )?;
        Ok(())
    }

    /// Ranked BM25 search over the indexed documents.
    ///
    /// Source and project filters are applied in SQL; scoring and snippet
    /// extraction happen over the filtered candidates, which also form the
    /// IDF corpus. `limit == 0` means unbounded.
    pub fn search(
        &self,
        query: &str,
        source: Option<&str>,
        project: Option<&Path>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_terms = bm25::tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.load_candidates(source, project)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let doc_terms: Vec<HashMap<String, u32>> = candidates
            .iter()
            .map(|doc| bm25::term_counts(&bm25::tokenize(&doc.content)))
            .collect();

        let avg_len = candidates
            .iter()
            .map(|doc| doc.token_count as f64)
            .sum::<f64>()
            / candidates.len() as f64;

        let mut idfs = HashMap::new();
        for term in &query_terms {
            if idfs.contains_key(term) {
                continue;
            }
            let containing = doc_terms
                .iter()
                .filter(|terms| terms.contains_key(term))
                .count();
            idfs.insert(term.clone(), bm25::idf(candidates.len(), containing));
        }

        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .zip(doc_terms.iter())
            .filter_map(|(doc, terms)| {
                let score = bm25::score(
                    &self.params,
                    &query_terms,
                    terms,
                    doc.token_count,
                    avg_len,
                    &idfs,
                );
                if score <= 0.0 {
                    return None;
                }
                let snippet =
                    bm25::snippet(&doc.content, &query_terms, self.params.snippet_radius);
                Some(SearchResult {
                    session: doc.session,
                    score,
                    snippet,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.session.timestamp.cmp(&a.session.timestamp))
        });
        if limit > 0 && results.len() > limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn load_candidates(
        &self,
        source: Option<&str>,
        project: Option<&Path>,
    ) -> Result<Vec<CandidateDoc>> {
        let conn = self.open()?;

        let mut query = String::from(
            "SELECT session_id, source, project_path, first_message, summary,
                    timestamp, file_path, user_message_count, content, token_count
             FROM documents WHERE 1 = 1",
        );
        let mut args: Vec<SqlValue> = Vec::new();
        if let Some(source) = source {
            query.push_str(" AND source = ?");
            args.push(SqlValue::Text(source.to_string()));
        }
        if let Some(project) = project {
            query.push_str(" AND project_path = ?");
            args.push(SqlValue::Text(project.to_string_lossy().into_owned()));
        }

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, i64>(9)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (
                session_id,
                source,
                project_path,
                first_message,
                summary,
                timestamp_raw,
                file_path,
                user_message_count,
                content,
                token_count,
            ) = row?;

            let timestamp = match DateTime::parse_from_rfc3339(&timestamp_raw) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "skipping document with unparseable timestamp");
                    continue;
                }
            };

            candidates.push(CandidateDoc {
                session: Session {
                    id: session_id,
                    source,
                    project_path,
                    first_message,
                    summary,
                    timestamp,
                    file_path: PathBuf::from(file_path),
                    user_message_count: user_message_count.max(0) as usize,
                },
                content,
                token_count: token_count.max(0) as usize,
            });
        }
        Ok(candidates)
    }
}

struct CandidateDoc {
    session: Session,
    content: String,
    token_count: usize,
}

/// Cheap proxy for content identity: mtime in Unix milliseconds plus size.
fn fingerprint(path: &Path) -> std::io::Result<(i64, i64)> {
    let meta = std::fs::metadata(path)?;
    let mtime_ms = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok((mtime_ms, meta.len() as i64))
}
