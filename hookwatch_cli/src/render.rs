//! Terminal rendering of captured requests

use crate::viewer::ConnectionState;
use console::{style, StyledObject};
use hookwatch_common::CapturedRequestEvent;

/// One-line summary of a request
pub fn request_line(request: &CapturedRequestEvent) -> String {
    format!(
        "{}  {}  {}  {}  {}",
        style(request.timestamp.format("%H:%M:%S")).dim(),
        method_style(&request.method),
        truncate_path(&request.path, 60),
        style(format_bytes(request.content_length)).dim(),
        style(&request.request_id).dim()
    )
}

/// Status line for a connection state change; `retries` counts reconnects
/// since the last successful open
pub fn state_line(state: &ConnectionState, retries: u32) -> String {
    match state {
        ConnectionState::Connecting => style("Connecting...").dim().to_string(),
        ConnectionState::Open => style("Connected, waiting for requests").green().to_string(),
        ConnectionState::Reconnecting { attempt, next_delay } => style(format!(
            "Connection lost, retry {} in {}s",
            attempt + 1,
            next_delay.as_secs()
        ))
        .yellow()
        .to_string(),
        ConnectionState::Failed if retries > 0 => {
            style(format!("Connection failed after {} retries", retries))
                .red()
                .bold()
                .to_string()
        }
        ConnectionState::Failed => style("Connection failed").red().bold().to_string(),
    }
}

/// Full request details
pub fn request_details(request: &CapturedRequestEvent) -> String {
    let mut out = format!(
        "{} {}\n",
        method_style(&request.method),
        style(&request.path).bold()
    );
    out.push_str(&format!("  id:        {}\n", request.request_id));
    out.push_str(&format!("  received:  {}\n", request.timestamp.to_rfc3339()));
    if !request.source_address.is_empty() {
        out.push_str(&format!("  from:      {}\n", request.source_address));
    }

    if !request.query_params.is_empty() {
        out.push_str(&format!("\n{}\n", style("Query").bold()));
        for (key, value) in sorted(&request.query_params) {
            out.push_str(&format!("  {} = {}\n", key, value));
        }
    }

    if !request.headers.is_empty() {
        out.push_str(&format!("\n{}\n", style("Headers").bold()));
        for (key, value) in sorted(&request.headers) {
            out.push_str(&format!("  {}: {}\n", style(key).cyan(), value));
        }
    }

    if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
        out.push_str(&format!("\n{}\n", style("Body").bold()));
        out.push_str(&pretty_body(body));
        out.push('\n');
    }

    out
}

/// Reproduce a request as a curl command against `base_url`
pub fn to_curl(request: &CapturedRequestEvent, base_url: &str) -> String {
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), request.path);
    if !request.query_params.is_empty() {
        let query: Vec<String> = sorted(&request.query_params)
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        url.push('?');
        url.push_str(&query.join("&"));
    }

    let mut parts = vec!["curl".to_string(), "-X".to_string(), request.method.clone()];
    parts.push(shell_quote(&url));

    for (key, value) in sorted(&request.headers) {
        // Recomputed by curl
        if key.eq_ignore_ascii_case("host") || key.eq_ignore_ascii_case("content-length") {
            continue;
        }
        parts.push("-H".to_string());
        parts.push(shell_quote(&format!("{}: {}", key, value)));
    }

    if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
        parts.push("--data-raw".to_string());
        parts.push(shell_quote(body));
    }

    parts.join(" ")
}

fn sorted<'a>(
    map: &'a std::collections::HashMap<String, String>,
) -> Vec<(&'a String, &'a String)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort();
    entries
}

/// Single-quote for POSIX shells
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

fn method_style(method: &str) -> StyledObject<String> {
    let styled = style(format!("{:>6}", method)).bold();
    match method {
        "GET" => styled.green(),
        "POST" => styled.yellow(),
        "PUT" => styled.blue(),
        "PATCH" => styled.magenta(),
        "DELETE" => styled.red(),
        "HEAD" => styled.cyan(),
        _ => styled.white(),
    }
}

fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() > max_len {
        let kept: String = path.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    } else {
        path.to_string()
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
