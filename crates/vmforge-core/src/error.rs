// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for vmforge-core.
//!
//! Provides a unified error type for the state layer with stable error codes.

use std::fmt;

use crate::status::VmStatus;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// State-layer errors that can occur while reading or mutating records.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// VM record was not found in the database.
    VmNotFound {
        /// The vmid that was not found.
        vmid: i64,
    },

    /// VM record already exists (duplicate vmid).
    VmAlreadyExists {
        /// The vmid that already exists.
        vmid: i64,
    },

    /// Requested status change is not permitted by the transition table.
    InvalidStatusTransition {
        /// The vmid whose transition was rejected.
        vmid: i64,
        /// Status the record currently holds.
        from: VmStatus,
        /// Status the caller asked for.
        to: VmStatus,
    },

    /// The free IP pool is empty.
    NoFreeAddress,

    /// A stored value failed validation.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::VmNotFound { .. } => "VM_NOT_FOUND",
            Self::VmAlreadyExists { .. } => "VM_ALREADY_EXISTS",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::NoFreeAddress => "NO_FREE_ADDRESS",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VmNotFound { vmid } => {
                write!(f, "VM {} not found", vmid)
            }
            Self::VmAlreadyExists { vmid } => {
                write!(f, "VM {} already exists", vmid)
            }
            Self::InvalidStatusTransition { vmid, from, to } => {
                write!(
                    f,
                    "VM {} cannot transition from '{}' to '{}'",
                    vmid, from, to
                )
            }
            Self::NoFreeAddress => {
                write!(f, "No free IP address available in the inventory")
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
