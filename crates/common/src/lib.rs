//! Shared error taxonomy, configuration loading and logging init for every
//! crate in the validator node workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ChainConfig, Config, ValidatorConfig};
pub use error::{ConfigError, Error, Result};
