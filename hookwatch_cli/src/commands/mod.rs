//! CLI command handlers

pub mod config;
pub mod fetch;
pub mod new;
pub mod show;
pub mod watch;
