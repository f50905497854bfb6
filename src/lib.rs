//! agentdeck - Run AI coding agents in tmux and keep track of them
//!
//! This library crate exposes internal modules for integration testing.

pub mod analytics;
pub mod config;
pub mod error;
pub mod integrations;
pub mod session;
pub mod tmux;
pub mod transcript;
