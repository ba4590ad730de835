//! Details of a single captured request

use crate::render;
use crate::viewer::RelayClient;
use anyhow::Result;
use hookwatch_common::constants::MAX_HISTORY_LIMIT;

/// Show one request, optionally as a curl command replaying it against `target`
pub async fn run(
    relay_url: &str,
    session_id: &str,
    request_id: &str,
    curl: Option<String>,
) -> Result<()> {
    let client = RelayClient::new(relay_url)?;
    let mut offset = 0;

    let request = loop {
        let page = client.fetch(session_id, MAX_HISTORY_LIMIT, offset).await?;
        let count = page.requests.len();

        if let Some(found) = page.requests.into_iter().find(|r| r.request_id == request_id) {
            break found;
        }

        offset += count;
        if count == 0 || offset as u64 >= page.total_count {
            anyhow::bail!("Request {} not found in session {}", request_id, session_id);
        }
    };

    match curl {
        Some(target) => println!("{}", render::to_curl(&request, &target)),
        None => print!("{}", render::request_details(&request)),
    }

    Ok(())
}
