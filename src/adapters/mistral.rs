//! Mistral Vibe CLI session adapter
//!
//! Mistral Vibe stores each session as one flat JSON file
//! (`session_*.json`) in `~/.vibe/logs/session/`. Timestamps arrive in
//! several shapes (Python naive datetimes with and without timezone,
//! RFC 3339), so parsing is layered and falls back to the file's mtime.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CoderecallError, Result};
use crate::model::{
    first_line_preview, mtime_timestamp, Message, PartBuffer, Role, Session,
};
use crate::paginate::{resolve_window, window_slice};

use super::SessionSource;

const SOURCE_NAME: &str = "mistral";

/// Adapter over the Mistral Vibe session log directory.
pub struct MistralSource {
    sessions_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct MistralSession {
    #[serde(default)]
    metadata: MistralMetadata,
    #[serde(default)]
    messages: Vec<MistralMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct MistralMetadata {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    environment: MistralEnvironment,
}

#[derive(Debug, Default, Deserialize)]
struct MistralEnvironment {
    #[serde(default)]
    working_directory: String,
}

#[derive(Debug, Deserialize)]
struct MistralMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<MistralToolCall>,
    #[serde(default)]
    tool_call_results: Vec<MistralToolResult>,
}

#[derive(Debug, Deserialize)]
struct MistralToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: MistralToolFunction,
}

#[derive(Debug, Default, Deserialize)]
struct MistralToolFunction {
    #[serde(default)]
    name: String,
    /// JSON encoded argument object, kept as the source wrote it
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct MistralToolResult {
    #[serde(default)]
    tool_call_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    is_error: bool,
}

impl MistralSource {
    pub fn new(sessions_dir: PathBuf) -> Self {
        Self { sessions_dir }
    }

    fn session_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sessions_dir.join("session_*.json");
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| CoderecallError::BackendUnavailable(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .collect();
        Ok(paths)
    }

    fn load_session_file(&self, file_path: &Path) -> Result<MistralSession> {
        let data = std::fs::read_to_string(file_path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn parse_session_metadata(&self, file_path: &Path) -> Result<Session> {
        let parsed = self.load_session_file(file_path)?;

        let timestamp = parse_start_time(&parsed.metadata.start_time)
            .or_else(|| mtime_timestamp(file_path))
            .ok_or_else(|| {
                CoderecallError::BackendUnavailable(format!(
                    "no timestamp resolvable for {:?}",
                    file_path
                ))
            })?;

        let mut first_message = String::new();
        let mut user_count = 0usize;
        for message in &parsed.messages {
            if message.role.trim().to_lowercase() != "user" {
                continue;
            }
            if !message.content.trim().is_empty() {
                user_count += 1;
            }
            if first_message.is_empty() {
                first_message = first_line_preview(&message.content);
            }
        }

        Ok(Session {
            id: parsed.metadata.session_id,
            source: SOURCE_NAME.to_string(),
            project_path: parsed.metadata.environment.working_directory,
            first_message,
            summary: String::new(),
            timestamp,
            file_path: file_path.to_path_buf(),
            user_message_count: user_count,
        })
    }

    fn read_all_messages(&self, file_path: &Path) -> Result<Vec<Message>> {
        let parsed = self.load_session_file(file_path)?;
        let fallback = parse_start_time(&parsed.metadata.start_time)
            .or_else(|| mtime_timestamp(file_path))
            .unwrap_or_else(Utc::now);

        let mut messages = Vec::with_capacity(parsed.messages.len());
        for raw in &parsed.messages {
            let Some(role) = Role::from_tag(&raw.role) else {
                tracing::warn!(file = ?file_path, role = %raw.role, "skipping message with unknown role");
                continue;
            };
            // System prompts are plumbing, not transcript.
            if role == Role::System {
                continue;
            }

            let mut parts = PartBuffer::new();
            parts.push_text(&raw.content);
            for call in &raw.tool_calls {
                parts.push_raw(
                    "tool_call",
                    serde_json::json!({
                        "id": &call.id,
                        "name": &call.function.name,
                        "arguments": &call.function.arguments,
                    }),
                );
            }
            for result in &raw.tool_call_results {
                parts.push_raw(
                    "tool_result",
                    serde_json::json!({
                        "tool_call_id": &result.tool_call_id,
                        "content": &result.content,
                        "is_error": result.is_error,
                    }),
                );
            }

            let mut msg = Message::from_parts(role, fallback, parts);

            if !raw.tool_calls.is_empty() {
                let calls: Vec<Value> = raw
                    .tool_calls
                    .iter()
                    .map(|call| {
                        serde_json::json!({
                            "id": &call.id,
                            "name": &call.function.name,
                            "arguments": &call.function.arguments,
                        })
                    })
                    .collect();
                msg.insert_metadata("tool_calls", Value::Array(calls));
            }
            if !raw.tool_call_results.is_empty() {
                let results: Vec<Value> = raw
                    .tool_call_results
                    .iter()
                    .map(|result| {
                        serde_json::json!({
                            "tool_call_id": &result.tool_call_id,
                            "content": &result.content,
                            "is_error": result.is_error,
                        })
                    })
                    .collect();
                msg.insert_metadata("tool_results", Value::Array(results));
            }

            messages.push(msg);
        }

        Ok(messages)
    }

    fn find_session_file(&self, session_id: &str) -> Result<PathBuf> {
        for file_path in self.session_files()? {
            let parsed = match self.load_session_file(&file_path) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            if parsed.metadata.session_id == session_id {
                return Ok(file_path);
            }
        }
        Err(CoderecallError::SessionNotFound(session_id.to_string()).into())
    }
}

impl SessionSource for MistralSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn list_sessions(&self, project: Option<&Path>, limit: usize) -> Result<Vec<Session>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for file_path in self.session_files()? {
            let session = match self.parse_session_metadata(&file_path) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(file = ?file_path, error = %e, "skipping unparseable mistral session");
                    continue;
                }
            };

            if let Some(project) = project {
                if Path::new(&session.project_path) != project {
                    continue;
                }
            }

            sessions.push(session);
        }

        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if limit > 0 && sessions.len() > limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    fn get_session(
        &self,
        session_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        let file_path = self.find_session_file(session_id)?;
        let messages = self.read_all_messages(&file_path)?;
        let window = resolve_window(messages.len(), page, page_size, false);
        let (page, _) = window_slice(&messages, window, page_size);
        Ok(page)
    }
}

/// Parse the `start_time` field, which may be a Python naive datetime
/// (`2024-03-01T10:00:00.123456`) or RFC 3339 with an offset.
fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
