use thiserror::Error;

/// Errors raised while validating names and loading configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid node type name: {0:?}")]
    InvalidTypeName(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid direction: {0:?} (expected out, in, or both)")]
    InvalidDirection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}
