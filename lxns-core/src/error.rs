//! Error types for lxns

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// lxns error types
///
/// Every variant names the stage that failed; the underlying cause is kept in
/// the message or the source.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Malformed or inconsistent configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// A feature token that does not name a namespace kind
    #[error("Invalid configuration: unrecognised namespace feature `{feature}`")]
    UnrecognizedFeature {
        /// The offending token, as written in the configuration
        feature: String,
    },

    /// Clone or ID-mapping failure
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// The external network helper failed
    #[error("Network attach error: {message}")]
    Attacher {
        /// Error message, including the helper's diagnostics
        message: String,
    },

    /// Control channel read or write failure
    #[error("Control channel error: {message}")]
    Channel {
        /// Error message
        message: String,
    },

    /// Mount or bind-mount failure
    #[error("Mount error: {}: {message}", target.display())]
    Mount {
        /// Mount target
        target: PathBuf,
        /// Error message
        message: String,
    },

    /// `pivot_root` sequence failure
    #[error("Pivot error: {message}")]
    Pivot {
        /// Error message
        message: String,
    },

    /// Network bring-up inside the namespace, or a netlink failure
    #[error("Network error: {message}")]
    Network {
        /// Error message
        message: String,
    },

    /// Target executable not found inside the namespace
    #[error("Executable not found: {program}: {message}")]
    ExecResolution {
        /// Program as given on the command line
        program: String,
        /// Error message
        message: String,
    },

    /// Process image substitution failed
    #[error("Failed to exec {program}: {message}")]
    Exec {
        /// Program being executed
        program: String,
        /// Error message
        message: String,
    },

    /// An operation missed its deadline
    #[error("Timed out after {after:?}: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline that was exceeded
        after: Duration,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidConfig`]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Channel`]
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Network`]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

/// Result type alias for lxns operations
pub type Result<T> = std::result::Result<T, Error>;
