//! Live view of a session's captured requests

use crate::render;
use crate::viewer::{
    ConnectionState, ConsumerError, EventStreamConsumer, RelayClient, RequestStore, SseTransport,
    StoreEvent,
};
use anyhow::{Context, Result};
use console::style;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Watch options
pub struct WatchOptions {
    pub session_id: String,
    pub relay_url: String,
    /// Earlier requests loaded alongside the live feed
    pub limit: usize,
}

enum Exit {
    Interrupted,
    Ended(Result<(), ConsumerError>),
}

/// Stream a session until Ctrl-C or until the feed is given up on
pub async fn run(opts: WatchOptions) -> Result<()> {
    let store = Arc::new(RequestStore::new());
    let mut events = store.subscribe();

    let transport = SseTransport::new(Some(opts.relay_url.clone()))
        .context("Failed to build HTTP client")?;
    let consumer = EventStreamConsumer::new(transport, store.clone());
    let mut subscription = consumer.subscribe(&opts.session_id)?;
    let mut state_rx = subscription.watch_state();

    println!(
        "Watching {} via {}",
        style(&opts.session_id).cyan().bold(),
        style(&opts.relay_url).dim()
    );
    println!("Press Ctrl-C to stop.");
    println!();

    if opts.limit > 0 {
        spawn_history(&opts, store.clone())?;
    }

    // Ids already on screen
    let mut shown: HashSet<String> = HashSet::new();
    let mut watching_state = true;

    let exit = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(StoreEvent::Live(request)) => {
                    shown.insert(request.request_id.clone());
                    println!("{}", render::request_line(&request));
                }
                Ok(StoreEvent::Historical { inserted, total }) => {
                    if inserted > 0 {
                        println!("{}", style(format!("Loaded {} earlier requests ({} stored)", inserted, total)).dim());
                    }
                    // Oldest first so the newest ends up at the bottom
                    for request in store.get_requests().await.iter().rev() {
                        if shown.insert(request.request_id.clone()) {
                            println!("{}", render::request_line(request));
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Display fell behind, {} updates skipped", skipped);
                }
                Err(RecvError::Closed) => break Exit::Interrupted,
            },
            changed = state_rx.changed(), if watching_state => {
                if changed.is_err() {
                    // Task finished; `closed()` yields its result
                    watching_state = false;
                    continue;
                }
                let state = *state_rx.borrow_and_update();
                if state != ConnectionState::Connecting {
                    println!("{}", render::state_line(&state, subscription.retries()));
                }
            }
            result = subscription.closed() => break Exit::Ended(result),
            _ = tokio::signal::ctrl_c() => break Exit::Interrupted,
        }
    };

    match exit {
        Exit::Interrupted => {
            let session_id = subscription.session_id().to_string();
            subscription.unsubscribe().await;
            println!();
            println!("Stopped watching {}.", session_id);
            Ok(())
        }
        Exit::Ended(result) => {
            println!(
                "{}",
                render::state_line(&subscription.state(), subscription.retries())
            );
            match result {
                Err(ConsumerError::Rejected { status: 404 }) => {
                    anyhow::bail!("Session {} not found or expired", opts.session_id)
                }
                Err(ConsumerError::Rejected { status: 503 }) => {
                    anyhow::bail!("Relay has no origin configured (503)")
                }
                result => result.context("Live feed ended"),
            }
        }
    }
}

fn spawn_history(opts: &WatchOptions, store: Arc<RequestStore>) -> Result<()> {
    let history = RelayClient::new(&opts.relay_url)?;
    let session_id = opts.session_id.clone();
    let limit = opts.limit;

    tokio::spawn(async move {
        match history.fetch(&session_id, limit, 0).await {
            Ok(page) => {
                let inserted = store.load_historical(page.requests).await;
                tracing::debug!(
                    session_id = %session_id,
                    inserted,
                    total = page.total_count,
                    "Historical requests loaded"
                );
            }
            Err(e) => tracing::warn!("Could not load earlier requests: {:#}", e),
        }
    });

    Ok(())
}
