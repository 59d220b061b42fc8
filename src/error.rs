//! Error taxonomy for the validation session.
//!
//! Per-slot failures (`UploadError`, `DeleteError`) are absorbed by the
//! session store into slot state. Session-level failures end up as a single
//! [`SessionFault`] that the presentation layer reads and clears.

use std::fmt;

use thiserror::Error;

use crate::session::SlotId;

/// An upload call failed. The message is shown on the slot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct UploadError {
    pub message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A delete-by-path call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DeleteError {
    pub message: String,
}

impl DeleteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The network or HTTP layer failed. Distinct from a validation run that
/// completed and reported problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { message, .. } => UploadError::new(message),
            other => UploadError::new(other.to_string()),
        }
    }
}

impl From<TransportError> for DeleteError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { message, .. } => DeleteError::new(message),
            other => DeleteError::new(other.to_string()),
        }
    }
}

/// Rejections raised synchronously by the session store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No file slot with id {0}")]
    UnknownSlot(SlotId),

    #[error("File slot {0} is already being removed")]
    AlreadyRemoving(SlotId),

    #[error("Session was already hydrated from the server listing")]
    AlreadyHydrated,

    #[error("'{name}' is not an accepted document type (accepted: {accepted})")]
    RejectedFile { name: String, accepted: String },

    #[error("Slot {0} is not a reference slot")]
    NotAReference(SlotId),
}

/// Why a validation run could not be started or did not finish.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("A validation run is already in progress")]
    AlreadyRunning,

    #[error("Validation is not available yet: {0}")]
    NotEligible(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Which session-level operation produced a [`SessionFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A user-requested removal failed after the slot showed `removing`.
    Removal,
    /// Deleting an input file that was evicted by a newer selection failed.
    Eviction,
    /// Deleting an orphaned upload (slot removed mid-flight) failed.
    Cleanup,
    /// The validate call failed at the transport layer.
    Transport,
    /// The startup listing could not be fetched.
    Listing,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FaultKind::Removal => "removal",
            FaultKind::Eviction => "eviction",
            FaultKind::Cleanup => "cleanup",
            FaultKind::Transport => "transport",
            FaultKind::Listing => "listing",
        };
        f.write_str(label)
    }
}

/// The single session-level error value. A newer fault replaces an older one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFault {
    pub kind: FaultKind,
    pub message: String,
}

impl SessionFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.kind, self.message)
    }
}
