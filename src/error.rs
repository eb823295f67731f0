//! Error types for Hematite
//!
//! This module defines all error types used throughout the Hematite server.
//! Command errors render the exact RESP error strings the wire protocol
//! promises to clients.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Main error type for Hematite operations
#[derive(Debug)]
pub enum HematiteError {
    /// Protocol-related errors (RESP parsing, serialization)
    Protocol(String),

    /// Command execution errors
    Command(CommandError),

    /// Storage engine errors
    Storage(StorageError),

    /// Network/IO errors
    Io(String),

    /// Configuration errors
    Config(String),

    /// Client connection errors
    Connection(String),

    /// Replication link errors
    Replication(String),

    /// Internal server errors
    Internal(String),
}

/// Command-specific errors that map to RESP error responses
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Unknown or malformed command
    UnknownCommand(String),

    /// Wrong number of arguments for command
    WrongNumberOfArgs(String),

    /// Syntax error in command
    SyntaxError,

    /// Operation against wrong type
    WrongType,

    /// Value is not an integer or out of range
    NotInteger,

    /// Value is not a valid float
    NotFloat,

    /// Coordinates outside the representable range
    InvalidCoordinates(String, String),

    /// Invalid expire time for SET
    InvalidExpireTime(String),

    /// Stream id must be greater than 0-0
    StreamIdZero,

    /// Stream id not greater than the last entry
    StreamIdTooSmall,

    /// EXEC issued with no open transaction
    ExecWithoutMulti,

    /// DISCARD issued with no open transaction
    DiscardWithoutMulti,

    /// MULTI issued inside an open transaction
    MultiNested,

    /// Command not allowed while subscribed
    SubscribedRestriction(String),

    /// Failed authentication
    WrongPass,

    /// Generic command error with message
    Generic(String),
}

/// Storage-related errors
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Key not found
    KeyNotFound,

    /// Wrong data type for operation
    WrongType,
}

/// Type alias for Results throughout Hematite
pub type Result<T> = std::result::Result<T, HematiteError>;

impl fmt::Display for HematiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HematiteError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            HematiteError::Command(err) => write!(f, "{}", err),
            HematiteError::Storage(err) => write!(f, "{}", err),
            HematiteError::Io(msg) => write!(f, "I/O error: {}", msg),
            HematiteError::Config(msg) => write!(f, "Configuration error: {}", msg),
            HematiteError::Connection(msg) => write!(f, "Connection error: {}", msg),
            HematiteError::Replication(msg) => write!(f, "Replication error: {}", msg),
            HematiteError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(cmd) => {
                write!(f, "ERR unknown command '{}'", cmd)
            }
            CommandError::WrongNumberOfArgs(cmd) => {
                write!(f, "ERR wrong number of arguments for '{}' command", cmd)
            }
            CommandError::SyntaxError => write!(f, "ERR syntax error"),
            CommandError::WrongType => {
                write!(f, "WRONGTYPE Operation against a key holding the wrong kind of value")
            }
            CommandError::NotInteger => {
                write!(f, "ERR value is not an integer or out of range")
            }
            CommandError::NotFloat => {
                write!(f, "ERR value is not a valid float")
            }
            CommandError::InvalidCoordinates(lon, lat) => {
                write!(f, "ERR invalid longitude,latitude pair {},{}", lon, lat)
            }
            CommandError::InvalidExpireTime(cmd) => {
                write!(f, "ERR invalid expire time in '{}' command", cmd)
            }
            CommandError::StreamIdZero => {
                write!(f, "ERR The ID specified in XADD must be greater than 0-0")
            }
            CommandError::StreamIdTooSmall => {
                write!(
                    f,
                    "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                )
            }
            CommandError::ExecWithoutMulti => write!(f, "ERR EXEC without MULTI"),
            CommandError::DiscardWithoutMulti => write!(f, "ERR DISCARD without MULTI"),
            CommandError::MultiNested => write!(f, "ERR MULTI inside MULTI"),
            CommandError::SubscribedRestriction(cmd) => {
                write!(
                    f,
                    "ERR Can't execute '{}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context",
                    cmd
                )
            }
            CommandError::WrongPass => {
                write!(f, "WRONGPASS invalid username-password pair or user is disabled.")
            }
            CommandError::Generic(msg) => {
                write!(f, "ERR {}", msg)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::KeyNotFound => write!(f, "Key not found"),
            StorageError::WrongType => {
                write!(f, "WRONGTYPE Operation against a key holding the wrong kind of value")
            }
        }
    }
}

impl StdError for HematiteError {}

impl StdError for CommandError {}
impl StdError for StorageError {}

// Conversion implementations
impl From<io::Error> for HematiteError {
    fn from(err: io::Error) -> Self {
        HematiteError::Io(err.to_string())
    }
}

impl From<CommandError> for HematiteError {
    fn from(err: CommandError) -> Self {
        HematiteError::Command(err)
    }
}

impl From<StorageError> for HematiteError {
    fn from(err: StorageError) -> Self {
        HematiteError::Storage(err)
    }
}
