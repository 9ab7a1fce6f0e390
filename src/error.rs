/// Error types shared across the crate
use std::path::PathBuf;

use thiserror::Error;

/// A malformed or unrecognised message on the wire.
///
/// Inbound commands that fail to parse are dropped by the connection
/// adapter; the connection itself stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("`{command}` is missing its {argument} argument")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("`{command}` got a bad {argument}: `{value}`")]
    InvalidNumber {
        command: &'static str,
        argument: &'static str,
        value: String,
    },

    #[error("unknown frame tag `{0}`")]
    UnknownFrameTag(String),

    #[error("malformed record `{0}`")]
    MalformedRecord(String),
}

/// Failure talking to the session hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("session hub has shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
