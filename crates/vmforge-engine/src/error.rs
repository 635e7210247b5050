// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for vmforge-engine.

use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Cluster control plane call failed.
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] crate::control::ControlPlaneError),

    /// State layer operation failed.
    #[error("Core error: {0}")]
    Core(#[from] vmforge_core::CoreError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A cluster task reached a terminal state other than success.
    #[error("Task {upid} failed: {exitstatus}")]
    TaskFailed {
        /// Handle of the failed task.
        upid: String,
        /// Exit status reported by the node.
        exitstatus: String,
    },

    /// A cluster task did not reach a terminal state within the poll bound.
    #[error("Task {upid} still running after {attempts} polls")]
    TaskTimeout {
        /// Handle of the task that was being awaited.
        upid: String,
        /// Number of status reads performed before giving up.
        attempts: u32,
    },

    /// A workflow precondition was not met. Raised before any cluster call.
    #[error("Precondition failed for VM {vmid}: {reason}")]
    Precondition {
        /// VM the workflow was asked to act on.
        vmid: i64,
        /// What was missing or wrong.
        reason: String,
    },

    /// Referenced VM has no local record.
    #[error("VM not found: {vmid}")]
    VmNotFound {
        /// The unknown VM id.
        vmid: i64,
    },

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type using the engine Error.
pub type Result<T> = std::result::Result<T, Error>;
