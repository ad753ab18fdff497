//! Domain error types for the server process.

use std::fmt;

/// Errors that stop the server from starting or serving.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration is missing or invalid.
    Config { reason: String },
    /// A component could not be built from its configuration.
    Startup { component: String, reason: String },
    /// The listener could not bind.
    Bind { addr: String, reason: String },
    /// The HTTP server stopped with an error.
    Serve { reason: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Startup { component, reason } => {
                write!(f, "failed to start {component}: {reason}")
            }
            Self::Bind { addr, reason } => write!(f, "failed to bind to {addr}: {reason}"),
            Self::Serve { reason } => write!(f, "server error: {reason}"),
        }
    }
}

impl std::error::Error for ServerError {}
