//! Typed configuration for the validator node.
//!
//! Mirrors the core-vs-ambient split in SPEC_FULL.md §6/§6.4: `ValidatorConfig`
//! holds exactly the three settings the Validator and Processor consume
//! (`max_row_count`, `system_table_prefix`, `accepted_column_types`); everything
//! else (chain endpoints, Postgres URL, HTTP bind address, reorg depth) is
//! ambient and lives alongside it in [`Config`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings the core (Validator + Processor) reads directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Per-table row cap enforced after every INSERT. 0 disables the cap.
    #[serde(default)]
    pub max_row_count: u64,

    /// Prefix marking a relation as system-owned and unreachable from user SQL.
    #[serde(default = "default_system_table_prefix")]
    pub system_table_prefix: String,

    /// Allow-listed column type names for CREATE TABLE, including synonyms.
    #[serde(default = "default_accepted_column_types")]
    pub accepted_column_types: Vec<Vec<String>>,
}

fn default_system_table_prefix() -> String {
    "system_".to_string()
}

fn default_accepted_column_types() -> Vec<Vec<String>> {
    vec![
        vec!["int2".into(), "smallint".into()],
        vec!["int4".into(), "int".into(), "integer".into()],
        vec!["int8".into(), "bigint".into()],
        vec!["text".into()],
        vec!["varchar".into(), "character varying".into()],
        vec!["bpchar".into(), "char".into(), "character".into()],
        vec!["date".into()],
        vec!["bool".into(), "boolean".into()],
        vec!["float4".into(), "real".into()],
        vec!["float8".into(), "double precision".into()],
        vec!["numeric".into(), "decimal".into()],
        vec!["timestamp".into()],
        vec!["timestamptz".into()],
        vec!["uuid".into()],
    ]
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_row_count: 0,
            system_table_prefix: default_system_table_prefix(),
            accepted_column_types: default_accepted_column_types(),
        }
    }
}

impl ValidatorConfig {
    /// Flattened, lower-cased set of every accepted type name/synonym.
    pub fn accepted_type_names(&self) -> std::collections::HashSet<String> {
        self.accepted_column_types
            .iter()
            .flatten()
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.system_table_prefix.is_empty() {
            return Err(ConfigError::EmptySystemTablePrefix);
        }
        Ok(())
    }
}

/// Configuration for a single EVM chain the node watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: i64,
    pub name: String,
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub registry_address: String,
    /// Number of blocks an event must age past before the Processor sees it.
    #[serde(default = "default_reorg_depth")]
    pub reorg_depth: u64,
}

fn default_reorg_depth() -> u64 {
    6
}

/// Top-level node configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub validator: ValidatorConfig,
    pub chains: HashMap<String, ChainConfig>,
    pub postgres_url: String,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Parse from a TOML document and validate.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from disk and validate.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validator.validate()?;
        if self.postgres_url.is_empty() {
            return Err(ConfigError::MissingPostgresUrl);
        }

        let mut seen_chain_ids: HashMap<i64, &str> = HashMap::new();
        for (key, chain) in &self.chains {
            if let Some(other_key) = seen_chain_ids.insert(chain.chain_id, key) {
                return Err(ConfigError::ChainIdMismatch {
                    key: key.clone(),
                    config_chain_id: other_key.to_string(),
                });
            }
            if chain.rpc_url.is_empty() {
                return Err(ConfigError::MissingRpcUrl {
                    chain: key.clone(),
                });
            }
            if !chain.rpc_url.starts_with("http://") && !chain.rpc_url.starts_with("https://") {
                return Err(ConfigError::InvalidRpcUrl {
                    chain: key.clone(),
                    url: chain.rpc_url.clone(),
                });
            }
        }
        Ok(())
    }
}
