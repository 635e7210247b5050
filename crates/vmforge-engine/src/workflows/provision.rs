// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning workflows: clone from a template, create from raw parameters.
//!
//! Cloning is the customer path. It clones a template, claims an address
//! from the inventory, pushes the requested configuration, grows the disk
//! past the template size when asked, applies an interface rate limit when
//! the plan carries a traffic quota, and boots the VM. Each step emits a
//! progress event.

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use vmforge_core::{NewVm, VmStatus};

use crate::control::{PowerAction, VmConfigUpdate};
use crate::error::{Error, Result};
use crate::poll::{PollPolicy, await_task};
use crate::progress::WorkflowProgress;

use super::{WorkflowContext, mark_error};

/// Disk size the clone source templates ship with, in GB.
pub const TEMPLATE_DISK_GB: u64 = 20;

/// Interface rate in the node's `rate=` unit that spreads a monthly quota
/// evenly over 30 days. An approximation, not a precise cap: months vary
/// in length, and bursts borrow from quiet hours.
pub fn rate_mbps(quota_tb: i64) -> f64 {
    (quota_tb as f64 * 1024.0 * 8.0) / (30.0 * 86_400.0)
}

/// Parameters for provisioning a VM by cloning a template.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Template to clone.
    pub template_vmid: i64,
    /// Id for the new VM. Must be cluster-unique.
    pub new_vmid: i64,
    /// Node holding the template; the clone lands on the same node.
    pub node: String,
    /// Display name for the new VM.
    pub name: String,
    /// Owner of the new VM.
    pub user_id: Uuid,
    /// CPU cores.
    pub cores: u32,
    /// Memory in GB.
    pub memory_gb: u64,
    /// Disk size in GB. Values above the template size grow the disk.
    pub disk_gb: u64,
    /// Cloud-init root password. `None` keeps the template's credentials.
    pub cipassword: Option<String>,
    /// Monthly traffic quota in TB. `None` means unlimited; no interface
    /// rate limit is applied.
    pub bandwidth_limit_tb: Option<i64>,
}

/// Provision a VM by cloning a template, end to end.
///
/// On any failed step the workflow stops, the record moves to `error`,
/// and a terminal `error` progress event is emitted. Nothing after the
/// failed step runs.
#[instrument(skip(ctx, request), fields(vmid = request.new_vmid))]
pub async fn run_clone(ctx: &WorkflowContext, request: CloneRequest) -> Result<()> {
    if request.name.is_empty() {
        return Err(Error::InvalidRequest(
            "VM name must not be empty".to_string(),
        ));
    }
    if request.cores == 0 {
        return Err(Error::InvalidRequest(
            "VM needs at least one core".to_string(),
        ));
    }

    let mut progress = ctx.progress.for_workflow(request.new_vmid, request.user_id);

    match clone_steps(ctx, &request, &mut progress).await {
        Ok(()) => {
            info!(vmid = request.new_vmid, "VM provisioned");
            progress.success("VM ready");
            Ok(())
        }
        Err(e) => {
            warn!(vmid = request.new_vmid, error = %e, "Provisioning failed");
            mark_error(ctx, request.new_vmid).await;
            progress.error(&format!("Error: {e}"));
            Err(e)
        }
    }
}

async fn clone_steps(
    ctx: &WorkflowContext,
    request: &CloneRequest,
    progress: &mut WorkflowProgress,
) -> Result<()> {
    let vmid = request.new_vmid;
    let node = &request.node;

    progress.step(5, "Preparing clone");
    let task = ctx
        .control
        .submit_clone(node, request.template_vmid, vmid, &request.name, true)
        .await?;
    progress.step(10, "Clone task submitted");

    // Record first; the panel lists the VM as `cloning` while the task runs.
    ctx.persistence
        .create_vm(&NewVm {
            vmid,
            name: request.name.clone(),
            node: node.clone(),
            status: VmStatus::Cloning,
            user_id: request.user_id.to_string(),
            bandwidth_limit: request.bandwidth_limit_tb,
        })
        .await?;
    ctx.persistence.update_vm_upid(vmid, &task.upid).await?;

    progress.step(30, "Cloning template");
    await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await?;

    progress.step(50, "Assigning IP address");
    let ip = ctx.persistence.claim_ip_address(vmid).await?;
    progress.step(55, "IP address assigned");

    progress.step(60, "Applying configuration");
    let mut snapshot = VmConfigUpdate {
        name: Some(request.name.clone()),
        cores: Some(request.cores),
        memory: Some(request.memory_gb * 1024),
        ipconfig0: Some(format!(
            "ip={}/{},gw={}",
            ip.address, ip.netmask, ip.gateway
        )),
        cipassword: request.cipassword.clone(),
        agent: Some("enabled=1".to_string()),
        net0: None,
    };
    // Not awaited; the node applies configuration well before first boot.
    let task = ctx.control.write_vm_config(node, vmid, &snapshot).await?;
    ctx.persistence.update_vm_upid(vmid, &task.upid).await?;
    ctx.persistence
        .update_vm_config(vmid, Some(&serde_json::to_string(&snapshot)?))
        .await?;

    if request.disk_gb > TEMPLATE_DISK_GB {
        progress.step(70, "Resizing disk");
        let grow = format!("+{}G", request.disk_gb - TEMPLATE_DISK_GB);
        let task = ctx.control.submit_resize(node, vmid, "scsi0", &grow).await?;
        ctx.persistence.update_vm_upid(vmid, &task.upid).await?;
        await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await?;
    }

    if let Some(quota_tb) = request.bandwidth_limit_tb {
        progress.step(80, "Applying bandwidth limit");
        let net0 = format!("virtio,bridge=vmbr0,rate={}", rate_mbps(quota_tb));
        let update = VmConfigUpdate {
            net0: Some(net0.clone()),
            ..VmConfigUpdate::default()
        };
        let task = ctx.control.write_vm_config(node, vmid, &update).await?;
        ctx.persistence.update_vm_upid(vmid, &task.upid).await?;

        // Keep the saved snapshot in step with what the node holds.
        snapshot.net0 = Some(net0);
        ctx.persistence
            .update_vm_config(vmid, Some(&serde_json::to_string(&snapshot)?))
            .await?;
    }

    progress.step(90, "Starting VM");
    let task = ctx
        .control
        .submit_power(node, vmid, PowerAction::Start)
        .await?;
    ctx.persistence.update_vm_upid(vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await?;

    ctx.persistence
        .transition_vm(vmid, VmStatus::Running)
        .await?;
    Ok(())
}

/// Parameters for creating a VM from raw node parameters.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Id for the new VM. `None` picks the next free cluster id.
    pub vmid: Option<i64>,
    /// Node to create the VM on.
    pub node: String,
    /// Display name.
    pub name: String,
    /// Owner of the new VM.
    pub user_id: Uuid,
    /// Monthly traffic quota in TB. `None` means unlimited.
    pub bandwidth_limit_tb: Option<i64>,
    /// Raw creation parameters passed to the node verbatim. Must be a
    /// JSON object; `vmid` and `name` are filled in from this request.
    pub params: serde_json::Value,
}

/// Create a VM from raw parameters and leave it stopped.
///
/// The admin path: no template, no address claim, no boot. The creation
/// parameters become the VM's configuration snapshot so a later reinstall
/// can rebuild it. Returns the id the VM was created under.
#[instrument(skip(ctx, request), fields(node = %request.node))]
pub async fn run_create(ctx: &WorkflowContext, request: CreateRequest) -> Result<i64> {
    if !request.params.is_object() {
        return Err(Error::InvalidRequest(
            "creation parameters must be a JSON object".to_string(),
        ));
    }

    let vmid = match request.vmid {
        Some(vmid) => vmid,
        None => ctx.control.next_vmid().await?,
    };

    let mut params = request.params.clone();
    params["vmid"] = json!(vmid);
    params["name"] = json!(request.name);

    ctx.persistence
        .create_vm(&NewVm {
            vmid,
            name: request.name.clone(),
            node: request.node.clone(),
            status: VmStatus::Creating,
            user_id: request.user_id.to_string(),
            bandwidth_limit: request.bandwidth_limit_tb,
        })
        .await?;

    match create_steps(ctx, &request.node, vmid, &params).await {
        Ok(()) => {
            info!(vmid, "VM created");
            Ok(vmid)
        }
        Err(e) => {
            warn!(vmid, error = %e, "Creation failed");
            mark_error(ctx, vmid).await;
            Err(e)
        }
    }
}

async fn create_steps(
    ctx: &WorkflowContext,
    node: &str,
    vmid: i64,
    params: &serde_json::Value,
) -> Result<()> {
    let task = ctx.control.submit_create(node, params).await?;
    ctx.persistence.update_vm_upid(vmid, &task.upid).await?;
    await_task(ctx.control.as_ref(), &task, PollPolicy::default()).await?;

    ctx.persistence
        .update_vm_config(vmid, Some(&serde_json::to_string(params)?))
        .await?;
    ctx.persistence
        .transition_vm(vmid, VmStatus::Stopped)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_spreads_quota_over_thirty_days() {
        assert_eq!(rate_mbps(10), 81_920.0 / 2_592_000.0);
        assert_eq!(rate_mbps(1), 8_192.0 / 2_592_000.0);
    }

    #[test]
    fn test_rate_scales_linearly_with_quota() {
        assert_eq!(rate_mbps(20), 2.0 * rate_mbps(10));
    }
}
