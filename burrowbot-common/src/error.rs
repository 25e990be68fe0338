// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No extension called '{0}' exists in the index")]
    ExtensionNotInIndex(String),

    #[error("The extension '{0}' is already installed")]
    ExtensionAlreadyInstalled(String),

    #[error("The extension '{0}' is not installed")]
    ExtensionNotFound(String),

    #[error("The prefix '{0}' already exists")]
    PrefixAlreadyExists(String),

    #[error("The prefix '{0}' does not exist")]
    PrefixNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Package manager error: {0}")]
    Package(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
