//! Create a capture session

use crate::commands::watch::{self, WatchOptions};
use crate::viewer::RelayClient;
use anyhow::Result;
use console::style;

/// Create a session, print where to send webhooks, optionally start watching
pub async fn run(relay_url: &str, follow: bool) -> Result<()> {
    let client = RelayClient::new(relay_url)?;
    let session = client.create_session().await?;

    println!("{} {}", style("Session").bold(), style(&session.session_id).cyan().bold());
    println!("  Send webhooks to: {}", style(&session.ingestion_url).green());
    println!("  Expires:          {}", style(&session.expires_at).dim());
    println!();

    if !follow {
        println!("Run `hookwatch watch {}` to follow it.", session.session_id);
        return Ok(());
    }

    // Fresh session, nothing earlier to load
    watch::run(WatchOptions {
        session_id: session.session_id,
        relay_url: relay_url.to_string(),
        limit: 0,
    })
    .await
}
