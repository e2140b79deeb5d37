//! Normalized session and message model
//!
//! Every adapter projects its on-disk format into [`Session`] and
//! [`Message`]. Both are stateless projections recomputed from the backing
//! store on every call; nothing here holds a long-lived mutable copy.
//!
//! Dynamically-shaped message content (plain text, a list of typed parts, a
//! single part object) is resolved once at ingestion through [`PartBuffer`],
//! which joins text parts into `content` and retains everything else
//! verbatim in `non_text_parts` so no payload is lost in normalization.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length of the first-message preview, in characters.
pub const PREVIEW_MAX_CHARS: usize = 200;

/// One recorded coding session, normalized across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique within its source
    pub id: String,
    /// Source tag ("copilot", "mistral", "opencode")
    pub source: String,
    /// Absolute project path, or empty when the session is unscoped
    pub project_path: String,
    /// Preview of the first user-authored content
    pub first_message: String,
    /// Free-text title, empty when the source records none
    pub summary: String,
    /// Creation time; falls back to the backing file's mtime
    pub timestamp: DateTime<Utc>,
    /// Provenance pointer into the backing store, used for freshness checks
    pub file_path: PathBuf,
    /// User messages with non-empty trimmed content
    pub user_message_count: usize,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    /// Map a source's role tag onto the normalized set.
    ///
    /// Returns `None` for tags outside the set; callers treat such records
    /// as malformed and skip them.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            "system" => Some(Role::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

/// One message within a session, normalized across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Normalized text; multiple text parts joined by newline
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Open mapping: model id, mode, cost, token counts, tool payloads
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    /// Content-part kind -> occurrence count; always present, possibly empty
    #[serde(default)]
    pub part_types: BTreeMap<String, u32>,
    /// Verbatim non-text parts, for lossless round-trip
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_text_parts: Vec<Value>,
    pub has_non_text_parts: bool,
}

impl Message {
    /// Build a message from an ingested part buffer.
    pub fn from_parts(role: Role, timestamp: DateTime<Utc>, parts: PartBuffer) -> Self {
        let (content, part_types, non_text_parts) = parts.finish();
        let has_non_text_parts = !non_text_parts.is_empty();
        Self {
            role,
            content,
            timestamp,
            metadata: serde_json::Map::new(),
            part_types,
            non_text_parts,
            has_non_text_parts,
        }
    }

    /// Insert a metadata entry, skipping JSON nulls.
    pub fn insert_metadata(&mut self, key: &str, value: Value) {
        if !value.is_null() {
            self.metadata.insert(key.to_string(), value);
        }
    }
}

/// Canonical kinds of content parts.
///
/// Sources tag parts with their own vocabulary; the kind decides only how a
/// part is routed during ingestion (text joins `content`, everything else is
/// retained). The original tag is what gets counted in `part_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Text,
    ToolCall,
    ToolResult,
    Unknown,
}

impl PartKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" => PartKind::Text,
            "tool" | "tool_call" | "tool-call" => PartKind::ToolCall,
            "tool_result" | "tool-result" => PartKind::ToolResult,
            _ => PartKind::Unknown,
        }
    }
}

/// Ingestion accumulator resolving dynamically-shaped content.
#[derive(Debug, Default)]
pub struct PartBuffer {
    texts: Vec<String>,
    part_types: BTreeMap<String, u32>,
    non_text: Vec<Value>,
}

impl PartBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plain text part. Blank text is not counted.
    pub fn push_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        *self.part_types.entry("text".to_string()).or_insert(0) += 1;
        self.texts.push(text.to_string());
    }

    /// Record a typed part from a source's raw JSON.
    ///
    /// Text parts contribute their `text` field to the joined content; all
    /// other kinds are retained verbatim.
    pub fn push_raw(&mut self, tag: &str, raw: Value) {
        match PartKind::from_tag(tag) {
            PartKind::Text => {
                if let Some(text) = raw.get("text").and_then(Value::as_str) {
                    self.push_text(text);
                } else {
                    self.retain(tag, raw);
                }
            }
            _ => self.retain(tag, raw),
        }
    }

    /// Record a part whose shape was not recognized at all.
    pub fn push_unknown(&mut self, raw: Value) {
        self.retain("unknown", raw);
    }

    /// Resolve a whole content value: a string, a list of typed parts, or a
    /// single part object.
    pub fn push_content_value(&mut self, content: &Value) {
        match content {
            Value::String(text) => self.push_text(text),
            Value::Array(items) => {
                for item in items {
                    match item.get("text").and_then(Value::as_str) {
                        Some(text) => self.push_text(text),
                        None => self.push_unknown(item.clone()),
                    }
                }
            }
            Value::Object(map) => match map.get("text").and_then(Value::as_str) {
                Some(text) => self.push_text(text),
                None => self.push_unknown(content.clone()),
            },
            Value::Null => {}
            other => self.push_unknown(other.clone()),
        }
    }

    fn retain(&mut self, tag: &str, raw: Value) {
        *self.part_types.entry(tag.to_string()).or_insert(0) += 1;
        self.non_text.push(raw);
    }

    /// Joined content, part-kind counts, and the retained non-text parts.
    pub fn finish(self) -> (String, BTreeMap<String, u32>, Vec<Value>) {
        (self.texts.join("\n"), self.part_types, self.non_text)
    }
}

/// First non-empty line of `text`, truncated to [`PREVIEW_MAX_CHARS`]
/// characters with an ellipsis marker when clipped.
pub fn first_line_preview(text: &str) -> String {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > PREVIEW_MAX_CHARS {
            let clipped: String = trimmed.chars().take(PREVIEW_MAX_CHARS).collect();
            return format!("{}...", clipped);
        }
        return trimmed.to_string();
    }
    String::new()
}

/// Modification time of the backing file, as the timestamp of last resort.
pub fn mtime_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Convert Unix milliseconds into a timestamp, rejecting non-positive and
/// out-of-range values.
pub fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}
