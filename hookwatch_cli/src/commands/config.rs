//! Config commands (set-relay, show)

use crate::config::{config_file, Config};
use anyhow::Result;

/// Persist the default relay URL
pub fn set_relay(url: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set_relay(url)?;
    config.save()?;

    if let Some(relay) = &config.relay_url {
        println!("Relay set to {}", relay);
    }
    Ok(())
}

/// Print the effective configuration
pub fn show(cli_relay: Option<&str>) -> Result<()> {
    let config = Config::load()?;

    println!("Config file: {}", config_file().display());
    println!(
        "Saved relay: {}",
        config.relay_url.as_deref().unwrap_or("(not set)")
    );
    match config.resolve_relay(cli_relay) {
        Ok(relay) => println!("Effective relay: {}", relay),
        Err(e) => println!("Effective relay: {}", e),
    }

    Ok(())
}
