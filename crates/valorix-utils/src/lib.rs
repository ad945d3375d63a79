//! Shared utilities for valorix
//!
//! This crate provides common functionality used across the valorix workspace,
//! including logging setup and configuration loading.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, load_json};
pub use logging::{init_tracing, init_tracing_with};
