// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Destroy workflow.

use tracing::{info, instrument, warn};

use vmforge_core::VmRecord;

use crate::control::PowerAction;
use crate::error::Result;
use crate::poll::{PollPolicy, await_task};

use super::{WorkflowContext, mark_error, require_vm};

/// Remove a VM from the fleet.
///
/// Stops the guest (failure tolerated), deletes it from the cluster,
/// returns its addresses to the free pool, and drops the record. Works
/// from any status. A failed remote delete leaves the record in `error`
/// with its addresses still claimed.
#[instrument(skip(ctx))]
pub async fn run_destroy(ctx: &WorkflowContext, vmid: i64) -> Result<()> {
    let vm = require_vm(ctx, vmid).await?;

    match destroy_steps(ctx, &vm).await {
        Ok(()) => {
            let released = ctx.persistence.release_ip_addresses(vmid).await?;
            ctx.persistence.delete_vm(vmid).await?;
            info!(vmid, released, "VM destroyed");
            Ok(())
        }
        Err(e) => {
            warn!(vmid, error = %e, "Destroy failed");
            mark_error(ctx, vmid).await;
            Err(e)
        }
    }
}

async fn destroy_steps(ctx: &WorkflowContext, vm: &VmRecord) -> Result<()> {
    // Tolerated; the guest is often already stopped.
    match ctx
        .control
        .submit_power(&vm.node, vm.vmid, PowerAction::Stop)
        .await
    {
        Ok(task) => {
            ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
            if let Err(e) = await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await {
                warn!(vmid = vm.vmid, error = %e, "Stop before destroy did not complete cleanly");
            }
        }
        Err(e) => {
            warn!(vmid = vm.vmid, error = %e, "Stop before destroy was rejected");
        }
    }

    let task = ctx.control.submit_delete(&vm.node, vm.vmid).await?;
    ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await?;
    Ok(())
}
