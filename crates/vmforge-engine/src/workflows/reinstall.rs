// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reinstall workflow.

use serde_json::json;
use tracing::{info, instrument, warn};

use vmforge_core::{VmRecord, VmStatus};

use crate::control::PowerAction;
use crate::error::{Error, Result};
use crate::poll::{PollPolicy, await_task};

use super::{WorkflowContext, mark_error, require_vm};

/// Rebuild a VM from its saved configuration snapshot.
///
/// Precondition: the record must hold a configuration snapshot, checked
/// before any cluster call. Without one the VM would be destroyed with no
/// way to rebuild it; the record's status is left untouched in that case.
///
/// The record holds `reinstalling` from the first cluster call to the
/// final start. Steps: stop (failure tolerated, the guest may already be
/// off), delete, recreate from the snapshot, start. Every step is awaited
/// with the longer reinstall poll bound.
#[instrument(skip(ctx))]
pub async fn run_reinstall(ctx: &WorkflowContext, vmid: i64) -> Result<()> {
    let vm = require_vm(ctx, vmid).await?;

    let Some(config) = vm.config.as_deref() else {
        return Err(Error::Precondition {
            vmid,
            reason: "no saved configuration to rebuild from".to_string(),
        });
    };
    let mut params: serde_json::Value =
        serde_json::from_str(config).map_err(|e| Error::Precondition {
            vmid,
            reason: format!("saved configuration is not valid JSON: {e}"),
        })?;
    if !params.is_object() {
        return Err(Error::Precondition {
            vmid,
            reason: "saved configuration is not a parameter object".to_string(),
        });
    }
    params["vmid"] = json!(vmid);

    ctx.persistence
        .transition_vm(vmid, VmStatus::Reinstalling)
        .await?;

    match reinstall_steps(ctx, &vm, &params).await {
        Ok(()) => {
            ctx.persistence
                .transition_vm(vmid, VmStatus::Running)
                .await?;
            info!(vmid, "VM reinstalled");
            Ok(())
        }
        Err(e) => {
            warn!(vmid, error = %e, "Reinstall failed");
            mark_error(ctx, vmid).await;
            Err(e)
        }
    }
}

async fn reinstall_steps(
    ctx: &WorkflowContext,
    vm: &VmRecord,
    params: &serde_json::Value,
) -> Result<()> {
    let policy = PollPolicy::reinstall();

    // Tolerated; the guest may already be off.
    match ctx
        .control
        .submit_power(&vm.node, vm.vmid, PowerAction::Stop)
        .await
    {
        Ok(task) => {
            ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
            if let Err(e) = await_task(ctx.control.as_ref(), &task, policy).await {
                warn!(vmid = vm.vmid, error = %e, "Stop before reinstall did not complete cleanly");
            }
        }
        Err(e) => {
            warn!(vmid = vm.vmid, error = %e, "Stop before reinstall was rejected");
        }
    }

    let task = ctx.control.submit_delete(&vm.node, vm.vmid).await?;
    ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, policy).await?;

    let task = ctx.control.submit_create(&vm.node, params).await?;
    ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, policy).await?;

    let task = ctx
        .control
        .submit_power(&vm.node, vm.vmid, PowerAction::Start)
        .await?;
    ctx.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, policy).await?;
    Ok(())
}
