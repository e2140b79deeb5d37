//! Shared fixtures: throwaway source trees and databases shaped like the
//! real tools write them.

use std::fs;
use std::path::PathBuf;

use coderecall::config::Config;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use tempfile::TempDir;

/// A fixture home directory plus the config rooted at it.
#[allow(dead_code)]
pub fn fixture_config() -> (TempDir, Config) {
    let dir = TempDir::new().expect("failed to create tempdir");
    let config = Config::with_root(dir.path());
    (dir, config)
}

/// One copilot event line.
#[allow(dead_code)]
pub fn copilot_event(kind: &str, data: Value, timestamp: &str) -> Value {
    json!({
        "type": kind,
        "data": data,
        "id": format!("evt_{}", kind.replace('.', "_")),
        "timestamp": timestamp,
    })
}

/// Write a copilot JSONL session file from event values.
#[allow(dead_code)]
pub fn write_copilot_session(config: &Config, file_stem: &str, events: &[Value]) -> PathBuf {
    fs::create_dir_all(&config.copilot_sessions_dir).expect("create copilot dir");
    let path = config
        .copilot_sessions_dir
        .join(format!("{}.jsonl", file_stem));
    let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
    fs::write(&path, lines.join("\n")).expect("write copilot session");
    path
}

/// Write a raw (possibly malformed) copilot session file.
#[allow(dead_code)]
pub fn write_copilot_raw(config: &Config, file_stem: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(&config.copilot_sessions_dir).expect("create copilot dir");
    let path = config
        .copilot_sessions_dir
        .join(format!("{}.jsonl", file_stem));
    fs::write(&path, contents).expect("write copilot session");
    path
}

/// Write a mistral session JSON file.
#[allow(dead_code)]
pub fn write_mistral_session(config: &Config, file_name: &str, session: &Value) -> PathBuf {
    fs::create_dir_all(&config.mistral_sessions_dir).expect("create mistral dir");
    let path = config.mistral_sessions_dir.join(file_name);
    fs::write(&path, session.to_string()).expect("write mistral session");
    path
}

/// Write an opencode legacy project metadata file.
#[allow(dead_code)]
pub fn write_opencode_project(config: &Config, project_id: &str, worktree: &str) {
    let dir = config.opencode_storage_dir.join("project");
    fs::create_dir_all(&dir).expect("create project dir");
    let body = json!({"id": project_id, "worktree": worktree, "vcs": "git"});
    fs::write(dir.join(format!("{}.json", project_id)), body.to_string())
        .expect("write project file");
}

/// Write an opencode legacy session metadata file, returning its path.
#[allow(dead_code)]
pub fn write_opencode_session_file(
    config: &Config,
    project_id: &str,
    session_id: &str,
    title: &str,
    created_ms: i64,
) -> PathBuf {
    let dir = config.opencode_storage_dir.join("session").join(project_id);
    fs::create_dir_all(&dir).expect("create session dir");
    let body = json!({
        "id": session_id,
        "projectID": project_id,
        "title": title,
        "time": {"created": created_ms, "updated": created_ms},
    });
    let path = dir.join(format!("{}.json", session_id));
    fs::write(&path, body.to_string()).expect("write session file");
    path
}

/// Write one opencode legacy message file.
#[allow(dead_code)]
pub fn write_opencode_message_file(
    config: &Config,
    session_id: &str,
    message_id: &str,
    role: &str,
    content: Value,
    created_ms: i64,
) {
    let dir = config.opencode_storage_dir.join("message").join(session_id);
    fs::create_dir_all(&dir).expect("create message dir");
    let body = json!({
        "id": message_id,
        "role": role,
        "content": content,
        "time": {"created": created_ms},
    });
    fs::write(dir.join(format!("{}.json", message_id)), body.to_string())
        .expect("write message file");
}

/// Create the canonical opencode database with its schema, returning an open
/// connection for inserts.
#[allow(dead_code)]
pub fn init_opencode_db(config: &Config) -> Connection {
    if let Some(parent) = config.opencode_db_path.parent() {
        fs::create_dir_all(parent).expect("create opencode data dir");
    }
    let conn = Connection::open(&config.opencode_db_path).expect("open opencode db");
    conn.execute_batch(
        "CREATE TABLE project (id TEXT PRIMARY KEY, worktree TEXT NOT NULL);
         CREATE TABLE session (
             id TEXT PRIMARY KEY,
             project_id TEXT NOT NULL,
             title TEXT NOT NULL,
             time_created INTEGER NOT NULL
         );
         CREATE TABLE message (
             id TEXT PRIMARY KEY,
             session_id TEXT NOT NULL,
             time_created INTEGER NOT NULL,
             data TEXT NOT NULL
         );
         CREATE TABLE part (
             id TEXT PRIMARY KEY,
             message_id TEXT NOT NULL,
             time_created INTEGER NOT NULL,
             data TEXT NOT NULL
         );",
    )
    .expect("create opencode schema");
    conn
}

#[allow(dead_code)]
pub fn db_insert_project(conn: &Connection, id: &str, worktree: &str) {
    conn.execute(
        "INSERT INTO project (id, worktree) VALUES (?1, ?2)",
        params![id, worktree],
    )
    .expect("insert project");
}

#[allow(dead_code)]
pub fn db_insert_session(
    conn: &Connection,
    id: &str,
    project_id: &str,
    title: &str,
    created_ms: i64,
) {
    conn.execute(
        "INSERT INTO session (id, project_id, title, time_created) VALUES (?1, ?2, ?3, ?4)",
        params![id, project_id, title, created_ms],
    )
    .expect("insert session");
}

#[allow(dead_code)]
pub fn db_insert_message(
    conn: &Connection,
    id: &str,
    session_id: &str,
    created_ms: i64,
    data: &Value,
) {
    conn.execute(
        "INSERT INTO message (id, session_id, time_created, data) VALUES (?1, ?2, ?3, ?4)",
        params![id, session_id, created_ms, data.to_string()],
    )
    .expect("insert message");
}

#[allow(dead_code)]
pub fn db_insert_part(
    conn: &Connection,
    id: &str,
    message_id: &str,
    created_ms: i64,
    data: &Value,
) {
    conn.execute(
        "INSERT INTO part (id, message_id, time_created, data) VALUES (?1, ?2, ?3, ?4)",
        params![id, message_id, created_ms, data.to_string()],
    )
    .expect("insert part");
}

/// A user/assistant exchange inserted into the canonical database: one user
/// message with a text part, one assistant reply with a text part.
#[allow(dead_code)]
pub fn db_insert_exchange(
    conn: &Connection,
    session_id: &str,
    seq: usize,
    base_ms: i64,
    user_text: &str,
    assistant_text: &str,
) {
    let user_id = format!("msg_{}_{}_u", session_id, seq);
    let assistant_id = format!("msg_{}_{}_a", session_id, seq);

    db_insert_message(
        conn,
        &user_id,
        session_id,
        base_ms,
        &json!({"role": "user", "time": {"created": base_ms}}),
    );
    db_insert_part(
        conn,
        &format!("prt_{}_{}_u", session_id, seq),
        &user_id,
        base_ms,
        &json!({"type": "text", "text": user_text}),
    );

    db_insert_message(
        conn,
        &assistant_id,
        session_id,
        base_ms + 1000,
        &json!({"role": "assistant", "modelID": "claude-sonnet", "time": {"created": base_ms + 1000}}),
    );
    db_insert_part(
        conn,
        &format!("prt_{}_{}_a", session_id, seq),
        &assistant_id,
        base_ms + 1000,
        &json!({"type": "text", "text": assistant_text}),
    );
}
