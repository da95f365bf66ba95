//! Error types for the media downloader

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("API_ID or API_HASH is missing in .env")]
    MissingCredentials,

    #[error("Session file not found: {0}")]
    SessionNotFound(String),

    #[error("Session is locked by another process")]
    SessionLocked,

    #[error("Failed to acquire session lock: {0}")]
    LockError(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("Failed to resolve chat: {0}")]
    ChatNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<grammers_client::InvocationError> for Error {
    fn from(err: grammers_client::InvocationError) -> Self {
        Error::TelegramError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
