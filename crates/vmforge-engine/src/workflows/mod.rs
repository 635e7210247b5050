// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! VM lifecycle workflows.
//!
//! Each workflow drives one multi-step operation against the cluster:
//! submit a command, record its task handle on the VM record, await the
//! task where the next step depends on its outcome, and move the record
//! through the status machine. The first failed step stops the workflow
//! and leaves the record in `error`; nothing after the failed step runs.

use std::sync::Arc;
use tracing::warn;

use vmforge_core::{CoreError, Persistence, VmRecord, VmStatus};

use crate::control::ControlPlane;
use crate::error::{Error, Result};
use crate::progress::ProgressChannel;

pub mod destroy;
pub mod migrate;
pub mod power;
pub mod provision;
pub mod reinstall;

pub use destroy::run_destroy;
pub use migrate::{MigrateRequest, run_migrate};
pub use power::run_power;
pub use provision::{CloneRequest, CreateRequest, run_clone, run_create};
pub use reinstall::run_reinstall;

/// Shared dependencies handed to every workflow run.
#[derive(Clone)]
pub struct WorkflowContext {
    /// Durable VM, address, and bandwidth records.
    pub persistence: Arc<dyn Persistence>,
    /// Cluster the workflows drive.
    pub control: Arc<dyn ControlPlane>,
    /// Progress fan-out for panel updates.
    pub progress: ProgressChannel,
}

impl WorkflowContext {
    /// Create a context over the given state layer and control plane.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        control: Arc<dyn ControlPlane>,
        progress: ProgressChannel,
    ) -> Self {
        Self {
            persistence,
            control,
            progress,
        }
    }
}

/// Load a VM record or fail with [`Error::VmNotFound`].
pub(crate) async fn require_vm(ctx: &WorkflowContext, vmid: i64) -> Result<VmRecord> {
    ctx.persistence
        .get_vm(vmid)
        .await?
        .ok_or(Error::VmNotFound { vmid })
}

/// Best-effort move to `error` after a failed step.
///
/// A missing record is tolerated: provisioning can fail before the record
/// exists.
pub(crate) async fn mark_error(ctx: &WorkflowContext, vmid: i64) {
    match ctx.persistence.transition_vm(vmid, VmStatus::Error).await {
        Ok(_) => {}
        Err(CoreError::VmNotFound { .. }) => {}
        Err(e) => warn!(vmid, error = %e, "Could not mark VM as errored"),
    }
}
