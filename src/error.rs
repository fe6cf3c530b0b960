//! Error types for the bot core.
//!
//! This module defines error types for protocol-level failures, message
//! parsing, transport problems, and the reload controller.

use thiserror::Error;

/// Convenience type alias for Results using [`BotError`].
pub type Result<T, E = BotError> = std::result::Result<T, E>;

/// Top-level errors surfaced by the bot core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BotError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an inbound IRC line.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The raw line.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },

    /// Inbound line exceeded the maximum allowed length.
    #[error("message too long: {0} bytes")]
    MessageTooLong(usize),

    /// Illegal control character in an inbound line.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// The configuration value was rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No configuration source was registered for a reload request.
    #[error("no configuration source registered")]
    NoConfigSource,

    /// Worker loops did not reach an idle point within the pause deadline.
    #[error("reload timed out waiting for workers to pause")]
    ReloadTimeout,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Disconnected,

    /// The outbound writer is gone (shutdown in progress).
    #[error("outbound writer closed")]
    WriterClosed,
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was invalid or missing.
    #[error("invalid command")]
    InvalidCommand,

    /// Parsing stopped before consuming the whole line.
    #[error("parsing failed at position {position}")]
    Truncated {
        /// Byte position where parsing failed.
        position: usize,
    },
}

/// Errors from the LLM capability.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LlmError {
    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}
