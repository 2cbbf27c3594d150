//! This module defines client/user visible errors that can be returned by ringlb.

use std::fmt::Display;

use serde::Serialize;

use crate::cluster::ring::ServerId;

pub type Result<T> = std::result::Result<T, Error>;

/// Error enum with all possible variants
#[derive(Debug, Serialize)]
pub enum Error {
    /// store/retrieve issued while no server is part of the ring
    EmptyRing,
    DuplicateServer {
        server_id: ServerId,
    },
    UnknownServer {
        server_id: ServerId,
    },
    /// Two virtual nodes would share the same (hash, server_id) pair
    DuplicateVirtualNode {
        hash: u32,
        server_id: ServerId,
    },
    InvalidConfig {
        reason: String,
    },
    InvalidCommand(InvalidCommand),
    Io {
        reason: String,
    },
    Logic {
        reason: String,
    },
}

impl Error {
    /// Returns true for every error caused by calling an operation in a state that does
    /// not allow it. These errors are always raised before any mutation happens.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Error::EmptyRing
                | Error::DuplicateServer { .. }
                | Error::UnknownServer { .. }
                | Error::DuplicateVirtualNode { .. }
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            reason: err.to_string(),
        }
    }
}

/// Errors produced while parsing a command script line
#[derive(Debug, Serialize)]
pub enum InvalidCommand {
    Empty,
    UnrecognizedCommand { name: String },
    MissingArgument { command: String, argument: String },
    InvalidServerId { got: String },
    TrailingArguments { command: String },
}
