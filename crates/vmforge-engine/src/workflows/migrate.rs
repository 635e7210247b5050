// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Migration workflow.

use tracing::{info, instrument, warn};

use vmforge_core::VmStatus;

use crate::error::Result;
use crate::poll::{PollPolicy, await_task};

use super::{WorkflowContext, mark_error, require_vm};

/// Parameters for moving a VM between nodes.
#[derive(Debug, Clone)]
pub struct MigrateRequest {
    /// VM to move.
    pub vmid: i64,
    /// Node the VM currently runs on. The migration task lives here and
    /// its status must be read here; the recorded node may be stale.
    pub source_node: String,
    /// Node to move the VM to.
    pub target_node: String,
}

/// Move a VM to another node.
///
/// The record holds `migrating` for the whole move, which can take tens
/// of minutes with local disks. On success the record's node is updated
/// and the VM is `running` on the target.
#[instrument(skip(ctx, request), fields(vmid = request.vmid))]
pub async fn run_migrate(ctx: &WorkflowContext, request: MigrateRequest) -> Result<()> {
    require_vm(ctx, request.vmid).await?;

    ctx.persistence
        .transition_vm(request.vmid, VmStatus::Migrating)
        .await?;

    match migrate_steps(ctx, &request).await {
        Ok(()) => {
            ctx.persistence
                .update_vm_node(request.vmid, &request.target_node)
                .await?;
            ctx.persistence
                .transition_vm(request.vmid, VmStatus::Running)
                .await?;
            info!(vmid = request.vmid, target = %request.target_node, "VM migrated");
            Ok(())
        }
        Err(e) => {
            warn!(vmid = request.vmid, error = %e, "Migration failed");
            mark_error(ctx, request.vmid).await;
            Err(e)
        }
    }
}

async fn migrate_steps(ctx: &WorkflowContext, request: &MigrateRequest) -> Result<()> {
    let task = ctx
        .control
        .submit_migrate(&request.source_node, request.vmid, &request.target_node)
        .await?;
    ctx.persistence
        .update_vm_upid(request.vmid, &task.upid)
        .await?;
    await_task(ctx.control.as_ref(), &task, PollPolicy::migrate()).await?;
    Ok(())
}
