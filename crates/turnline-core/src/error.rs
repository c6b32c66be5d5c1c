//! Error types for turnline

use thiserror::Error;

/// Errors from the fallible edges of the queue: configuration and its files.
///
/// Queue overflow is never an error; `enqueue` reports it as data.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid queue config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("toml error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
