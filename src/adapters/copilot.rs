//! GitHub Copilot CLI session adapter
//!
//! Copilot CLI stores each session as a JSONL event stream in
//! `~/.copilot/session-state/`. Session metadata is spread across events:
//! the id and start time come from `session.start`, the project path from a
//! `folder_trust` info message (or, failing that, from the common directory
//! of absolute paths seen in tool arguments), and the transcript from
//! `user.message` / `assistant.message` / `tool.execution_complete` events.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CoderecallError, Result};
use crate::model::{
    first_line_preview, mtime_timestamp, Message, PartBuffer, Role, Session,
};
use crate::paginate::{resolve_window, window_slice};

use super::SessionSource;

const SOURCE_NAME: &str = "copilot";

/// Adapter over the Copilot CLI session-state directory.
pub struct CopilotSource {
    sessions_dir: PathBuf,
    folder_trust: Regex,
}

#[derive(Debug, Deserialize)]
struct CopilotEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionStartData {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    start_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfoData {
    #[serde(default)]
    info_type: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelChangeData {
    #[serde(default)]
    new_model: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserMessageData {
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssistantMessageData {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_requests: Vec<ToolRequestData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolRequestData {
    #[serde(default)]
    tool_call_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolExecutionData {
    #[serde(default)]
    tool_call_id: String,
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    arguments: Value,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
}

impl CopilotSource {
    pub fn new(sessions_dir: PathBuf) -> Self {
        Self {
            sessions_dir,
            folder_trust: Regex::new(r"Folder (.+) has been added to trusted folders")
                .expect("folder trust pattern"),
        }
    }

    fn session_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sessions_dir.join("*.jsonl");
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| CoderecallError::BackendUnavailable(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .collect();
        Ok(paths)
    }

    /// One pass over the event stream, collecting session metadata.
    fn parse_session_metadata(&self, file_path: &Path) -> Result<Session> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);

        let mut id = String::new();
        let mut timestamp: Option<DateTime<Utc>> = None;
        let mut project_path = String::new();
        let mut first_message = String::new();
        let mut seen_paths: Vec<String> = Vec::new();
        let mut user_count = 0usize;

        for line in reader.lines() {
            let line = line?;
            let event: CopilotEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(_) => continue,
            };

            match event.kind.as_str() {
                "session.start" => {
                    if let Ok(data) = serde_json::from_value::<SessionStartData>(event.data) {
                        id = data.session_id;
                        timestamp = parse_rfc3339(&data.start_time);
                    }
                }
                "session.info" => {
                    if let Ok(data) = serde_json::from_value::<SessionInfoData>(event.data) {
                        if data.info_type == "folder_trust" {
                            if let Some(captures) = self.folder_trust.captures(&data.message) {
                                project_path = captures[1].to_string();
                            }
                        }
                    }
                }
                "user.message" => {
                    if let Ok(data) = serde_json::from_value::<UserMessageData>(event.data) {
                        if !data.content.trim().is_empty() {
                            user_count += 1;
                        }
                        if first_message.is_empty() {
                            first_message = first_line_preview(&data.content);
                        }
                    }
                }
                "tool.execution_start" => {
                    if let Ok(data) = serde_json::from_value::<ToolExecutionData>(event.data) {
                        if let Some(path) = data.arguments.get("path").and_then(Value::as_str) {
                            if path.starts_with('/') {
                                seen_paths.push(path.to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if project_path.is_empty() && !seen_paths.is_empty() {
            project_path = common_directory(&seen_paths);
        }

        let timestamp = timestamp
            .or_else(|| mtime_timestamp(file_path))
            .ok_or_else(|| {
                CoderecallError::BackendUnavailable(format!(
                    "no timestamp resolvable for {:?}",
                    file_path
                ))
            })?;

        if id.is_empty() {
            id = file_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }

        Ok(Session {
            id,
            source: SOURCE_NAME.to_string(),
            project_path,
            first_message,
            summary: String::new(),
            timestamp,
            file_path: file_path.to_path_buf(),
            user_message_count: user_count,
        })
    }

    fn read_all_messages(&self, file_path: &Path) -> Result<Vec<Message>> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);
        let fallback = mtime_timestamp(file_path).unwrap_or_else(Utc::now);

        let mut messages = Vec::new();
        let mut current_model = String::new();

        for line in reader.lines() {
            let line = line?;
            let event: CopilotEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(_) => continue,
            };

            let timestamp = parse_rfc3339(&event.timestamp).unwrap_or(fallback);

            match event.kind.as_str() {
                "session.model_change" => {
                    if let Ok(data) = serde_json::from_value::<ModelChangeData>(event.data) {
                        current_model = data.new_model;
                    }
                }
                "user.message" => {
                    if let Ok(data) = serde_json::from_value::<UserMessageData>(event.data) {
                        let mut parts = PartBuffer::new();
                        parts.push_text(&data.content);
                        for attachment in &data.attachments {
                            parts.push_raw("attachment", attachment.clone());
                        }
                        let mut msg = Message::from_parts(Role::User, timestamp, parts);
                        if !current_model.is_empty() {
                            msg.insert_metadata("model", Value::String(current_model.clone()));
                        }
                        messages.push(msg);
                    }
                }
                "assistant.message" => {
                    if let Ok(data) = serde_json::from_value::<AssistantMessageData>(event.data) {
                        let mut parts = PartBuffer::new();
                        parts.push_text(&data.content);
                        let mut tool_calls = Vec::with_capacity(data.tool_requests.len());
                        for request in &data.tool_requests {
                            let call = serde_json::json!({
                                "id": &request.tool_call_id,
                                "name": &request.name,
                                "arguments": &request.arguments,
                            });
                            parts.push_raw("tool_call", call.clone());
                            tool_calls.push(call);
                        }
                        let mut msg = Message::from_parts(Role::Assistant, timestamp, parts);
                        if !current_model.is_empty() {
                            msg.insert_metadata("model", Value::String(current_model.clone()));
                        }
                        if !tool_calls.is_empty() {
                            msg.insert_metadata("tool_calls", Value::Array(tool_calls));
                        }
                        messages.push(msg);
                    }
                }
                "tool.execution_complete" => {
                    if let Ok(data) = serde_json::from_value::<ToolExecutionData>(event.data) {
                        let content = match &data.result {
                            Value::String(text) => text.clone(),
                            Value::Null => String::new(),
                            other => serde_json::to_string(other).unwrap_or_default(),
                        };
                        let mut parts = PartBuffer::new();
                        parts.push_raw(
                            "tool_result",
                            serde_json::json!({
                                "tool_call_id": &data.tool_call_id,
                                "tool_name": &data.tool_name,
                                "result": &data.result,
                            }),
                        );
                        parts.push_text(&content);
                        let mut msg = Message::from_parts(Role::Tool, timestamp, parts);
                        msg.insert_metadata(
                            "tool_call_id",
                            Value::String(data.tool_call_id.clone()),
                        );
                        msg.insert_metadata("tool_name", Value::String(data.tool_name.clone()));
                        msg.insert_metadata("success", Value::Bool(data.success));
                        msg.insert_metadata("result", data.result);
                        messages.push(msg);
                    }
                }
                _ => {}
            }
        }

        Ok(messages)
    }
}

impl SessionSource for CopilotSource {
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
                    tracing::warn!(file = ?file_path, error = %e, "skipping unparseable copilot session");
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
        let file_path = self.sessions_dir.join(format!("{}.jsonl", session_id));
        if !file_path.exists() {
            return Err(CoderecallError::SessionNotFound(session_id.to_string()).into());
        }

        let messages = self.read_all_messages(&file_path)?;
        let window = resolve_window(messages.len(), page, page_size, false);
        let (page, _) = window_slice(&messages, window, page_size);
        Ok(page)
    }
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Longest common directory of a set of absolute file paths.
fn common_directory(paths: &[String]) -> String {
    let Some(first) = paths.first() else {
        return String::new();
    };
    if paths.len() == 1 {
        return parent_of(first);
    }

    let mut common = parent_of(first);
    for path in &paths[1..] {
        let dir = parent_of(path);
        while !dir.starts_with(&common) && common != "/" && !common.is_empty() {
            common = parent_of(&common);
        }
    }
    common
}

fn parent_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}
