//! One-shot listing of a session's earlier requests

use crate::render;
use crate::viewer::RelayClient;
use anyhow::Result;

/// List one page of captured requests, newest first
pub async fn run(
    relay_url: &str,
    session_id: &str,
    limit: usize,
    offset: usize,
    json: bool,
) -> Result<()> {
    let client = RelayClient::new(relay_url)?;
    let page = client.fetch(session_id, limit, offset).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.requests.is_empty() {
        println!("No requests captured for session {}.", session_id);
        return Ok(());
    }

    for request in &page.requests {
        println!("{}", render::request_line(request));
    }
    println!();
    println!(
        "Showing {}-{} of {} requests",
        offset + 1,
        offset + page.requests.len(),
        page.total_count
    );

    Ok(())
}
