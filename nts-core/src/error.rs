//! Error types for the NTS core.

use thiserror::Error;

pub type Result<T, E = NtsError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum NtsError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("splitter connection lost during disconnect handshake")]
    SplitterLost,
}

impl NtsError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<toml::de::Error> for NtsError {
    fn from(e: toml::de::Error) -> Self {
        NtsError::Config(e.to_string())
    }
}
