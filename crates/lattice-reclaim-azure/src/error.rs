//! Error types for the Azure listers

use lattice_reclaim::OperationError;
use thiserror::Error;

/// ARM error codes meaning the addressed object (or its resource group) no
/// longer exists. Matched as `(Code)` so wider codes such as
/// `SubscriptionNotFound` or `ParentResourceNotFound` do not qualify.
const NOT_FOUND_CODES: &[&str] = &[
    "(ResourceNotFound)",
    "(ResourceGroupNotFound)",
    "(NotFound)",
];

/// Markers in `az` stderr that retrying will not fix
const FATAL_MARKERS: &[&str] = &[
    "AuthorizationFailed",
    "AuthenticationFailed",
    "InvalidAuthenticationToken",
    "Forbidden",
    "ScopeLocked",
    "SubscriptionNotFound",
    "InvalidSubscriptionId",
    "az login",
];

/// Errors from talking to Azure
#[derive(Debug, Error)]
pub enum AzureError {
    /// An ARM resource ID did not have the expected shape
    #[error("invalid {kind} ID {id:?}: {reason}")]
    InvalidResourceId {
        /// Resource type the ID was expected to name
        kind: &'static str,
        /// The offending ID
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// The `az` binary could not be started
    #[error("failed to run az: {0}")]
    Spawn(String),

    /// `az` exited non-zero
    #[error("az {command} failed: {stderr}")]
    CommandFailed {
        /// Subcommand, e.g. "network vnet list"
        command: String,
        /// Trimmed stderr
        stderr: String,
    },

    /// `az` output was not the JSON we expected
    #[error("failed to parse output of az {command}: {message}")]
    Parse {
        /// Subcommand whose output failed to parse
        command: String,
        /// Parser error
        message: String,
    },
}

impl AzureError {
    /// Create an invalid resource ID error
    pub fn invalid_id(kind: &'static str, id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResourceId {
            kind,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a command failure error
    pub fn command_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether Azure reported the object as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                NOT_FOUND_CODES.iter().any(|c| stderr.contains(c))
                    && !FATAL_MARKERS.iter().any(|m| stderr.contains(m))
            }
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                !self.is_not_found() && !FATAL_MARKERS.iter().any(|m| stderr.contains(m))
            }
            Self::InvalidResourceId { .. } | Self::Spawn(_) | Self::Parse { .. } => false,
        }
    }
}

impl From<AzureError> for OperationError {
    fn from(err: AzureError) -> Self {
        if err.is_not_found() {
            OperationError::already_gone(err.to_string())
        } else if err.is_retryable() {
            OperationError::transient(err.to_string())
        } else {
            OperationError::fatal(err.to_string())
        }
    }
}

/// Result alias for Azure calls
pub type Result<T, E = AzureError> = std::result::Result<T, E>;
