//! Custom error types for interception-mux.
//!
//! This module provides structured error types using `thiserror` for the
//! device, codec and configuration layers.

use std::io;
use thiserror::Error;

use crate::device::ControlCode;
use crate::stroke::Role;

/// Main error type for interception-mux operations.
#[derive(Error, Debug)]
pub enum InterceptionError {
    /// The device resource for a slot could not be opened.
    #[error("failed to open interception device {index}: {source}")]
    HandleCreationFailed {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// The wait event could not be created or bound to the device.
    #[error("failed to bind wait event for device {index}: {reason}")]
    SyncBindingFailed { index: usize, reason: String },

    /// A frame had the wrong length for its role.
    #[error("malformed {role} stroke: expected {expected} bytes, got {actual}")]
    Format {
        role: Role,
        expected: usize,
        actual: usize,
    },

    /// A stroke or device index of the wrong role was supplied.
    #[error("device {index} is a {expected} device, got {found}")]
    RoleMismatch {
        index: usize,
        expected: Role,
        found: Role,
    },

    /// Index outside `0..20`.
    #[error("invalid device index {0} (expected 0..20)")]
    InvalidDeviceIndex(isize),

    /// The driver is not installed or not loaded.
    #[error(
        "Interception driver was not found or is not installed. \
         Please confirm that it has been installed properly and the system was rebooted."
    )]
    DriverNotFound(#[source] io::Error),

    /// The driver rejected a control call.
    #[error("control call {code:?} failed on device {index}")]
    ControlFailed { index: usize, code: ControlCode },

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing configuration file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing configuration file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for interception-mux operations.
pub type Result<T> = std::result::Result<T, InterceptionError>;

impl InterceptionError {
    /// Create a new HandleCreationFailed error.
    pub fn handle_creation_failed(index: usize, source: io::Error) -> Self {
        Self::HandleCreationFailed { index, source }
    }

    /// Create a new SyncBindingFailed error.
    pub fn sync_binding_failed(index: usize, reason: impl Into<String>) -> Self {
        Self::SyncBindingFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Create a new Format error.
    pub fn format(role: Role, actual: usize) -> Self {
        Self::Format {
            role,
            expected: role.frame_size(),
            actual,
        }
    }

    /// Create a new RoleMismatch error.
    pub fn role_mismatch(index: usize, expected: Role, found: Role) -> Self {
        Self::RoleMismatch {
            index,
            expected,
            found,
        }
    }

    /// Create a new ControlFailed error.
    pub fn control_failed(index: usize, code: ControlCode) -> Self {
        Self::ControlFailed { index, code }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// True for the errors that mean "the driver is not there at all".
    pub fn is_driver_missing(&self) -> bool {
        match self {
            Self::DriverNotFound(_) => true,
            Self::HandleCreationFailed { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
