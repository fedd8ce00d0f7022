//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP reply from the server.
    #[error("Failed to parse SMTP reply: {0}")]
    ParseError(String),

    /// The server answered a command with a code we didn't expect.
    #[error("{command} failed: server returned {code}, expected {expected}: {message}")]
    UnexpectedResponse {
        command: String,
        expected: String,
        code: u16,
        message: String,
    },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// None of the AUTH mechanisms we speak were advertised.
    #[error("server does not offer a supported AUTH mechanism (offered: {0})")]
    NoAuthMechanism(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
