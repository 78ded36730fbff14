//! Configuration module for the Trellis runtime.
//!
//! Layered loading (defaults, optional TOML file, `TRELLIS_*` environment
//! variables) for processor limits and logging settings.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{LogFormat, LogOutput, LoggingConfig, ProcessorConfig, TrellisConfig};
