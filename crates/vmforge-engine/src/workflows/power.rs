// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Power state workflow.

use tracing::{info, instrument, warn};

use vmforge_core::VmRecord;

use crate::control::PowerAction;
use crate::error::Result;
use crate::poll::{PollPolicy, await_task};

use super::{WorkflowContext, mark_error, require_vm};

/// Change a VM's power state and settle its record.
///
/// The record moves to the action's transitional status first, so an
/// illegal request (starting a running VM, resuming one that is not
/// paused) is rejected by the transition table before any cluster call.
/// On task success the record settles into the action's final status;
/// on failure it moves to `error`.
#[instrument(skip(ctx))]
pub async fn run_power(ctx: &WorkflowContext, vmid: i64, action: PowerAction) -> Result<()> {
    let vm = require_vm(ctx, vmid).await?;

    ctx.persistence
        .transition_vm(vmid, action.transitional_status())
        .await?;

    match power_steps(ctx, &vm, action).await {
        Ok(()) => {
            ctx.persistence
                .transition_vm(vmid, action.final_status())
                .await?;
            info!(vmid, action = action.as_str(), "Power state changed");
            Ok(())
        }
        Err(e) => {
            warn!(vmid, action = action.as_str(), error = %e, "Power command failed");
            mark_error(ctx, vmid).await;
            Err(e)
        }
    }
}

async fn power_steps(ctx: &WorkflowContext, vm: &VmRecord, action: PowerAction) -> Result<()> {
    let task = ctx.control.submit_power(&vm.node, vm.vmid, action).await?;
    ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await?;
    Ok(())
}
