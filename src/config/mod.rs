//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    api_key_env_var, load_config, parse_config, AppConfig, ConfigError, FetchSection,
    LedgerSection, LoggingSection, PipelineSection, ProviderConfig,
};
