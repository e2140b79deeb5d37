//! Command handlers for the CLI
//!
//! These handlers are intentionally small: they drive the library
//! components (the source registry and the search cache) and render the
//! results as tables, transcripts, or JSON.

use std::path::Path;

use colored::Colorize;
use prettytable::{format, Table};
use serde_json::json;

use crate::adapters::{SessionPage, SourceRegistry};
use crate::error::Result;
use crate::model::{Message, Role, Session};
use crate::search::SearchCache;

/// `coderecall sources`
pub fn handle_sources(registry: &SourceRegistry) -> Result<()> {
    println!("\nAvailable session sources:");
    for name in registry.sources() {
        println!("  {}", name.cyan());
    }
    println!();
    Ok(())
}

/// `coderecall list`
pub fn handle_list(
    registry: &SourceRegistry,
    source: Option<&str>,
    project: Option<&Path>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let sessions = registry.list_sessions(source, project, limit)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "sessions": &sessions,
                "count": sessions.len(),
            }))?
        );
        return Ok(());
    }

    if sessions.is_empty() {
        println!("{}", "No sessions found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Source".bold(),
        "ID".bold(),
        "When".bold(),
        "Project".bold(),
        "First message".bold()
    ]);

    for session in &sessions {
        table.add_row(prettytable::row![
            session.source.cyan(),
            shorten(&session.id, 24),
            session.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            shorten(&session.project_path, 32),
            shorten(preview_of(session), 48)
        ]);
    }

    table.printstd();
    println!();
    println!(
        "Use {} to read a session.",
        "coderecall show <source> <session-id>".cyan()
    );
    println!();
    Ok(())
}

/// `coderecall show`
pub fn handle_show(
    registry: &SourceRegistry,
    source: &str,
    session_id: &str,
    page: usize,
    page_size: usize,
    from_end: bool,
    json: bool,
) -> Result<()> {
    let result = registry.get_session_page(source, session_id, page, page_size, from_end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page_json(source, session_id, page, page_size, from_end, &result))?);
        return Ok(());
    }

    if result.messages.is_empty() {
        println!("{}", "No messages on this page.".yellow());
        return Ok(());
    }

    println!();
    for message in &result.messages {
        print_message(message);
    }

    let position = match result.total {
        Some(total) => format!(
            "page {} of {} ({} messages total)",
            result.resolved_page,
            total_pages(total, page_size),
            total
        ),
        None => format!("page {}", result.resolved_page),
    };
    let more = if result.has_more { ", more available" } else { "" };
    println!("{}", format!("-- {}{}", position, more).dimmed());
    println!();
    Ok(())
}

/// `coderecall search`
pub fn handle_search(
    registry: &SourceRegistry,
    cache: &SearchCache,
    query: &str,
    source: Option<&str>,
    project: Option<&Path>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let matches = registry.search(cache, query, source, project, limit)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "query": query,
                "matches": &matches,
                "count": matches.len(),
            }))?
        );
        return Ok(());
    }

    if matches.is_empty() {
        println!("{}", "No matching sessions.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Score".bold(),
        "Source".bold(),
        "ID".bold(),
        "Snippet".bold()
    ]);
    for result in &matches {
        table.add_row(prettytable::row![
            format!("{:.3}", result.score),
            result.session.source.cyan(),
            shorten(&result.session.id, 24),
            shorten(&result.snippet, 64)
        ]);
    }
    table.printstd();
    println!();
    Ok(())
}

fn page_json(
    source: &str,
    session_id: &str,
    page: usize,
    page_size: usize,
    from_end: bool,
    result: &SessionPage,
) -> serde_json::Value {
    let mut body = json!({
        "session_id": session_id,
        "source": source,
        "page": page,
        "resolved_page": result.resolved_page,
        "page_size": page_size,
        "from_end": from_end,
        "has_more": result.has_more,
        "messages": &result.messages,
        "count": result.messages.len(),
    });
    if let Some(total) = result.total {
        body["total_messages"] = json!(total);
        body["total_pages"] = json!(total_pages(total, page_size));
    }
    body
}

fn total_pages(total: usize, page_size: usize) -> usize {
    if total == 0 || page_size == 0 {
        return 0;
    }
    (total + page_size - 1) / page_size
}

fn print_message(message: &Message) {
    let role = match message.role {
        Role::User => "user".cyan().bold(),
        Role::Assistant => "assistant".green().bold(),
        Role::Tool => "tool".yellow().bold(),
        Role::System => "system".dimmed().bold(),
    };
    let when = message.timestamp.format("%Y-%m-%d %H:%M:%S");
    println!("{} {}", role, when.to_string().dimmed());
    if !message.content.is_empty() {
        println!("{}", message.content);
    }
    if message.has_non_text_parts {
        let kinds: Vec<String> = message
            .part_types
            .iter()
            .filter(|(kind, _)| kind.as_str() != "text")
            .map(|(kind, count)| format!("{} x{}", kind, count))
            .collect();
        println!("{}", format!("[non-text parts: {}]", kinds.join(", ")).dimmed());
    }
    println!();
}

fn preview_of(session: &Session) -> &str {
    if !session.summary.is_empty() {
        &session.summary
    } else {
        &session.first_message
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let clipped: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", clipped)
}
