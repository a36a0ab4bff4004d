//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{load_config, load_or_default, Config, ConfigError, DEFAULT_CONFIG_PATH};
