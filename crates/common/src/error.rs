use thiserror::Error;

/// Result alias used across every crate in the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Ambient error type for configuration, storage plumbing and anything that
/// doesn't belong to the Validator's or the Processor's own error taxonomies.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("chain error ({chain}): {message}")]
    Chain { chain: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    pub fn chain<S1: Into<String>, S2: Into<String>>(chain: S1, message: S2) -> Self {
        Error::Chain {
            chain: chain.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(format!("database error: {err}"))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Storage(format!("migration error: {err}"))
    }
}

/// Errors raised while loading or validating [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chain `{key}` shares its chain_id with chain `{config_chain_id}`")]
    ChainIdMismatch { key: String, config_chain_id: String },

    #[error("chain `{chain}` is missing an rpc_url")]
    MissingRpcUrl { chain: String },

    #[error("chain `{chain}` has an invalid rpc_url: {url}")]
    InvalidRpcUrl { chain: String, url: String },

    #[error("postgres_url must not be empty")]
    MissingPostgresUrl,

    #[error("system_table_prefix must not be empty")]
    EmptySystemTablePrefix,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),
}
