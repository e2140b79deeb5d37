//! opencode session adapter
//!
//! opencode keeps sessions in a SQLite database
//! (`~/.local/share/opencode/opencode.db`). Older installations used a flat
//! file tree under `~/.local/share/opencode/storage/`:
//!
//! - `project/[PROJECT_ID].json` - project metadata (worktree path)
//! - `session/[PROJECT_ID]/ses_*.json` - session metadata (title, timestamps)
//! - `message/ses_*/msg_*.json` - individual messages
//!
//! One logical source wraps both stores. Every call tries the database
//! first and falls through entirely to the file tree on any failure; the two
//! are never mixed within one response, and only both failing surfaces an
//! error. No state survives between calls, so a database that appears after
//! a later run is picked up automatically.
//!
//! This is the one source with the extended pagination capability: both
//! backends can count a session's messages exactly, so reverse addressing
//! is cheap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{CoderecallError, Result};
use crate::model::{
    first_line_preview, mtime_timestamp, timestamp_from_millis, Message, PartBuffer, Role,
    Session,
};
use crate::paginate::{resolve_window, window_slice};

use super::{PaginatedSource, SessionPage, SessionSource};

const SOURCE_NAME: &str = "opencode";
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Dual-backend opencode source: canonical database, legacy file tree.
pub struct OpencodeSource {
    db: OpencodeDb,
    storage: OpencodeStorage,
}

impl OpencodeSource {
    pub fn new(db_path: PathBuf, storage_dir: PathBuf) -> Self {
        Self {
            db: OpencodeDb { db_path },
            storage: OpencodeStorage { storage_dir },
        }
    }

    /// Run the two-step fallback. The canonical attempt's failure is data,
    /// not a control-flow escape: it is kept and reported alongside the
    /// legacy failure when both backends come up empty-handed.
    fn fallback<T>(
        &self,
        canonical: Result<T>,
        legacy: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let canonical_err = match canonical {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        tracing::debug!(error = %canonical_err, "opencode database unavailable, trying legacy storage");
        match legacy() {
            Ok(value) => Ok(value),
            Err(legacy_err) => Err(CoderecallError::BothBackendsFailed {
                canonical: canonical_err.to_string(),
                legacy: legacy_err.to_string(),
            }
            .into()),
        }
    }
}

impl SessionSource for OpencodeSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn list_sessions(&self, project: Option<&Path>, limit: usize) -> Result<Vec<Session>> {
        self.fallback(self.db.list_sessions(project, limit), || {
            self.storage.list_sessions(project, limit)
        })
    }

    fn get_session(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        let page = self.get_session_page(session_id, page, page_size, false)?;
        Ok(page.messages)
    }

    fn pagination(&self) -> Option<&dyn PaginatedSource> {
        Some(self)
    }
}

impl PaginatedSource for OpencodeSource {
    fn get_session_page(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
        from_end: bool,
    ) -> Result<SessionPage> {
        self.fallback(
            self.db.session_page(session_id, page, page_size, from_end),
            || {
                self.storage
                    .session_page(session_id, page, page_size, from_end)
            },
        )
    }
}

fn paged(messages: Vec<Message>, page: usize, page_size: usize, from_end: bool) -> SessionPage {
    let total = messages.len();
    let window = resolve_window(total, page, page_size, from_end);
    let (window_messages, has_more) = window_slice(&messages, window, page_size);
    SessionPage {
        messages: window_messages,
        total: Some(total),
        resolved_page: window.resolved_page,
        has_more,
    }
}

// ---------------------------------------------------------------------------
// Canonical backend: opencode.db
// ---------------------------------------------------------------------------

struct OpencodeDb {
    db_path: PathBuf,
}

impl OpencodeDb {
    fn open(&self) -> Result<Connection> {
        if !self.db_path.exists() {
            return Err(CoderecallError::BackendUnavailable(format!(
                "opencode database not found at {:?}",
                self.db_path
            ))
            .into());
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn list_sessions(&self, project: Option<&Path>, limit: usize) -> Result<Vec<Session>> {
        let conn = self.open()?;

        let mut query = String::from(
            "SELECT s.id, s.title, s.time_created, p.worktree
             FROM session s
             JOIN project p ON p.id = s.project_id",
        );
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(project) = project {
            query.push_str(" WHERE p.worktree = ?");
            args.push(SqlValue::Text(project.to_string_lossy().into_owned()));
        }
        query.push_str(" ORDER BY s.time_created DESC");
        if limit > 0 {
            query.push_str(" LIMIT ?");
            args.push(SqlValue::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_id, title, created_ms, worktree) = row?;

            // Metadata extraction is best effort; a session with unreadable
            // messages still lists.
            let (first_message, user_count) = self
                .first_user_message_and_count(&conn, &session_id)
                .unwrap_or_default();

            let timestamp = timestamp_from_millis(created_ms)
                .or_else(|| mtime_timestamp(&self.db_path))
                .unwrap_or_else(Utc::now);

            sessions.push(Session {
                id: session_id,
                source: SOURCE_NAME.to_string(),
                project_path: worktree,
                first_message,
                summary: title,
                timestamp,
                file_path: self.db_path.clone(),
                user_message_count: user_count,
            });
        }

        Ok(sessions)
    }

    fn first_user_message_and_count(
        &self,
        conn: &Connection,
        session_id: &str,
    ) -> Result<(String, usize)> {
        let first_text: Option<String> = conn
            .query_row(
                "SELECT json_extract(p.data, '$.text')
                 FROM message m
                 JOIN part p ON p.message_id = m.id
                 WHERE m.session_id = ?1
                   AND json_extract(m.data, '$.role') = 'user'
                   AND json_extract(p.data, '$.type') = 'text'
                 ORDER BY m.time_created ASC, p.time_created ASC
                 LIMIT 1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let user_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT m.id)
             FROM message m
             JOIN part p ON p.message_id = m.id
             WHERE m.session_id = ?1
               AND json_extract(m.data, '$.role') = 'user'
               AND json_extract(p.data, '$.type') = 'text'
               AND trim(COALESCE(json_extract(p.data, '$.text'), '')) <> ''",
            [session_id],
            |row| row.get(0),
        )?;

        let first_message = first_text
            .map(|text| first_line_preview(&text))
            .unwrap_or_default();

        Ok((first_message, user_count.max(0) as usize))
    }

    fn session_exists(&self, conn: &Connection, session_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM session WHERE id = ?1 LIMIT 1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn session_page(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
        from_end: bool,
    ) -> Result<SessionPage> {
        let conn = self.open()?;
        let messages = self.read_all_messages(&conn, session_id)?;

        if messages.is_empty() && !self.session_exists(&conn, session_id)? {
            return Err(CoderecallError::SessionNotFound(session_id.to_string()).into());
        }

        Ok(paged(messages, page, page_size, from_end))
    }

    fn read_all_messages(&self, conn: &Connection, session_id: &str) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare(
            "SELECT id, time_created, data
             FROM message
             WHERE session_id = ?1
             ORDER BY time_created ASC, id ASC",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (message_id, created_ms, raw) = row?;

            let data: Value = match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(message = %message_id, error = %e, "skipping malformed opencode message row");
                    continue;
                }
            };

            let Some(role) = data.get("role").and_then(Value::as_str).and_then(Role::from_tag)
            else {
                tracing::warn!(message = %message_id, "skipping opencode message without a known role");
                continue;
            };

            let mut parts = PartBuffer::new();
            self.collect_parts(conn, &message_id, &mut parts)?;

            let timestamp = data
                .get("time")
                .and_then(|time| time.get("created"))
                .and_then(Value::as_i64)
                .and_then(timestamp_from_millis)
                .or_else(|| timestamp_from_millis(created_ms))
                .unwrap_or_else(Utc::now);

            let mut msg = Message::from_parts(role, timestamp, parts);
            attach_opencode_metadata(&mut msg, &data);
            messages.push(msg);
        }

        Ok(messages)
    }

    fn collect_parts(
        &self,
        conn: &Connection,
        message_id: &str,
        parts: &mut PartBuffer,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT data FROM part
             WHERE message_id = ?1
             ORDER BY time_created ASC, id ASC",
        )?;
        let rows = stmt.query_map([message_id], |row| row.get::<_, String>(0))?;

        for row in rows {
            let raw = row?;
            let part: Value = match serde_json::from_str(&raw) {
                Ok(part) => part,
                Err(_) => continue,
            };
            let tag = part
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_owned);
            match tag {
                Some(tag) => parts.push_raw(&tag, part),
                None => parts.push_unknown(part),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Legacy backend: storage/ file tree
// ---------------------------------------------------------------------------

struct OpencodeStorage {
    storage_dir: PathBuf,
}

impl OpencodeStorage {
    fn list_sessions(&self, project: Option<&Path>, limit: usize) -> Result<Vec<Session>> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }

        let target_project = match project {
            Some(path) => match self.find_project_id_by_path(path)? {
                Some(id) => Some(id),
                // No matching project means no sessions, not an error.
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let session_root = self.storage_dir.join("session");
        let mut sessions = Vec::new();

        for entry in std::fs::read_dir(&session_root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let project_id = entry.file_name().to_string_lossy().into_owned();

            if let Some(target) = &target_project {
                if &project_id != target {
                    continue;
                }
            }

            let worktree = match self.load_project_worktree(&project_id) {
                Ok(worktree) => worktree,
                Err(e) => {
                    tracing::warn!(project = %project_id, error = %e, "skipping opencode project without metadata");
                    continue;
                }
            };

            if let Err(e) = self.collect_project_sessions(&entry.path(), &worktree, &mut sessions)
            {
                tracing::warn!(project = %project_id, error = %e, "skipping unreadable opencode project sessions");
            }
        }

        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if limit > 0 && sessions.len() > limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    fn find_project_id_by_path(&self, target: &Path) -> Result<Option<String>> {
        let target = target.to_string_lossy();
        let pattern = self.storage_dir.join("project").join("*.json");
        for entry in glob::glob(&pattern.to_string_lossy())
            .map_err(|e| CoderecallError::BackendUnavailable(e.to_string()))?
        {
            let Ok(file_path) = entry else { continue };
            let Ok(data) = std::fs::read_to_string(&file_path) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<Value>(&data) else {
                continue;
            };
            if parsed.get("worktree").and_then(Value::as_str) == Some(target.as_ref()) {
                if let Some(id) = parsed.get("id").and_then(Value::as_str) {
                    return Ok(Some(id.to_string()));
                }
            }
        }
        Ok(None)
    }

    fn load_project_worktree(&self, project_id: &str) -> Result<String> {
        let file_path = self
            .storage_dir
            .join("project")
            .join(format!("{}.json", project_id));
        let data = std::fs::read_to_string(&file_path)?;
        let parsed: Value = serde_json::from_str(&data)?;
        Ok(parsed
            .get("worktree")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    fn collect_project_sessions(
        &self,
        session_dir: &Path,
        worktree: &str,
        sessions: &mut Vec<Session>,
    ) -> Result<()> {
        let pattern = session_dir.join("ses_*.json");
        for entry in glob::glob(&pattern.to_string_lossy())
            .map_err(|e| CoderecallError::BackendUnavailable(e.to_string()))?
        {
            let Ok(file_path) = entry else { continue };
            let Ok(data) = std::fs::read_to_string(&file_path) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<Value>(&data) else {
                continue;
            };

            let Some(session_id) = parsed.get("id").and_then(Value::as_str) else {
                continue;
            };

            let (first_message, user_count) = self
                .first_user_message_and_count(session_id)
                .unwrap_or_default();

            let timestamp = parsed
                .get("time")
                .and_then(|time| time.get("created"))
                .and_then(Value::as_i64)
                .and_then(timestamp_from_millis)
                .or_else(|| mtime_timestamp(&file_path))
                .unwrap_or_else(Utc::now);

            sessions.push(Session {
                id: session_id.to_string(),
                source: SOURCE_NAME.to_string(),
                project_path: worktree.to_string(),
                first_message,
                summary: parsed
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                timestamp,
                file_path,
                user_message_count: user_count,
            });
        }
        Ok(())
    }

    fn message_files(&self, session_id: &str) -> Result<Vec<PathBuf>> {
        let pattern = self
            .storage_dir
            .join("message")
            .join(session_id)
            .join("msg_*.json");
        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| CoderecallError::BackendUnavailable(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .collect();
        // Filenames carry a sortable timestamp component.
        files.sort();
        Ok(files)
    }

    fn first_user_message_and_count(&self, session_id: &str) -> Result<(String, usize)> {
        let mut first_message = String::new();
        let mut user_count = 0usize;

        for file_path in self.message_files(session_id)? {
            let Ok(data) = std::fs::read_to_string(&file_path) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<Value>(&data) else {
                continue;
            };
            if parsed.get("role").and_then(Value::as_str) != Some("user") {
                continue;
            }

            let mut parts = PartBuffer::new();
            if let Some(content) = parsed.get("content") {
                parts.push_content_value(content);
            }
            let (content, _, _) = parts.finish();
            if content.trim().is_empty() {
                continue;
            }

            user_count += 1;
            if first_message.is_empty() {
                first_message = first_line_preview(&content);
            }
        }

        Ok((first_message, user_count))
    }

    fn session_page(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
        from_end: bool,
    ) -> Result<SessionPage> {
        let message_dir = self.storage_dir.join("message").join(session_id);
        if !message_dir.exists() {
            return Err(CoderecallError::SessionNotFound(session_id.to_string()).into());
        }

        let messages = self.read_all_messages(session_id)?;
        Ok(paged(messages, page, page_size, from_end))
    }

    fn read_all_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        for file_path in self.message_files(session_id)? {
            let Ok(data) = std::fs::read_to_string(&file_path) else {
                continue;
            };
            let parsed: Value = match serde_json::from_str(&data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(file = ?file_path, error = %e, "skipping malformed opencode message file");
                    continue;
                }
            };

            let Some(role) = parsed
                .get("role")
                .and_then(Value::as_str)
                .and_then(Role::from_tag)
            else {
                tracing::warn!(file = ?file_path, "skipping opencode message without a known role");
                continue;
            };

            let mut parts = PartBuffer::new();
            if let Some(content) = parsed.get("content") {
                parts.push_content_value(content);
            }

            let timestamp = parsed
                .get("time")
                .and_then(|time| time.get("created"))
                .and_then(Value::as_i64)
                .and_then(timestamp_from_millis)
                .or_else(|| mtime_timestamp(&file_path))
                .unwrap_or_else(Utc::now);

            let mut msg = Message::from_parts(role, timestamp, parts);
            attach_opencode_metadata(&mut msg, &parsed);
            messages.push(msg);
        }

        Ok(messages)
    }
}

/// Lift model/mode/cost/token fields out of a raw opencode message.
fn attach_opencode_metadata(msg: &mut Message, data: &Value) {
    if let Some(model) = data.get("modelID").and_then(Value::as_str) {
        if !model.is_empty() {
            msg.insert_metadata("model", Value::String(model.to_string()));
        }
    }
    if let Some(mode) = data.get("mode").and_then(Value::as_str) {
        if !mode.is_empty() {
            msg.insert_metadata("mode", Value::String(mode.to_string()));
        }
    }
    if let Some(cost) = data.get("cost").and_then(Value::as_f64) {
        if cost > 0.0 {
            if let Some(number) = serde_json::Number::from_f64(cost) {
                msg.insert_metadata("cost", Value::Number(number));
            }
        }
    }
    if let Some(tokens) = data.get("tokens") {
        if tokens.is_object() {
            msg.insert_metadata("tokens", tokens.clone());
        }
    }
}
