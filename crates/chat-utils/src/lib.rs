//! Shared utilities for market-chat
//!
//! This crate provides common functionality used across the market-chat workspace:
//! tracing setup and small helpers for reading configuration from the environment.

pub mod config;
pub mod logging;

pub use config::{EnvError, env_list, env_parse};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
