//! Error types for pop3-tls-client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    /// The server sent something that is neither `+OK` nor `-ERR`.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{command} failed: {message}")]
    CommandFailed {
        command: &'static str,
        message: String,
    },

    /// QUIT was not acknowledged, so messages marked with DELE may
    /// still be in the mailbox. The connection is closed regardless.
    #[error("QUIT was unsuccessful, deletions may not have applied: {0}")]
    QuitFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Session already used; create a new client to reconnect")]
    SessionClosed,

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
