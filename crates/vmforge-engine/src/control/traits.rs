// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control plane trait definitions.
//!
//! Defines the abstract interface for driving a virtualization cluster.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use vmforge_core::VmStatus;

/// Errors from control plane operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControlPlaneError {
    /// Node API answered with a non-success HTTP status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the node.
        message: String,
    },

    /// Request never produced an HTTP response (connect failure, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Request could not be built from the given parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// URL construction failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ControlPlaneError {
    /// Whether the failure may be transient.
    ///
    /// Client errors (4xx) are permanent and must not be retried. Server
    /// errors (5xx) and transport failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

/// Result type for control plane operations.
pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// Reference to an asynchronous task accepted by a node.
///
/// Every mutating command returns one. Task status must be read on the
/// same node the command was submitted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    /// Node the command was submitted to.
    pub node: String,
    /// Opaque task handle (UPID).
    pub upid: String,
}

/// Snapshot of a remote task's state.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTaskStatus {
    /// `"running"` while in flight, `"stopped"` once terminal.
    pub status: String,
    /// Exit indicator, present once the task stopped. `"OK"` means success.
    pub exitstatus: Option<String>,
}

impl RemoteTaskStatus {
    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status == "stopped"
    }

    /// Whether the task finished successfully.
    pub fn is_success(&self) -> bool {
        self.is_terminal() && self.exitstatus.as_deref() == Some("OK")
    }
}

/// One cluster node as reported by the cluster API.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    /// Node name, e.g. `"pve1"`.
    pub node: String,
    /// `"online"` or `"offline"`.
    pub status: String,
}

/// One VM as reported by the cluster resource listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterVm {
    /// Cluster-unique VM id.
    pub vmid: i64,
    /// Node currently hosting the VM.
    pub node: String,
    /// VM name, if set.
    pub name: Option<String>,
    /// Runtime status as the node sees it.
    pub status: String,
}

/// One point of a VM's metrics series.
///
/// Traffic counters are cumulative; usage over a window is the difference
/// between the last and first sample. Gaps in the series leave fields unset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSample {
    /// Unix timestamp of the sample.
    pub time: i64,
    /// Cumulative bytes received.
    pub netin: Option<f64>,
    /// Cumulative bytes sent.
    pub netout: Option<f64>,
}

/// One stored backup archive.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupInfo {
    /// Volume identifier, e.g. `"local:backup/vzdump-qemu-105-....vma.zst"`.
    pub volid: String,
    /// VM the archive belongs to.
    pub vmid: Option<i64>,
    /// Creation time (unix timestamp).
    pub ctime: i64,
    /// Archive size in bytes.
    pub size: Option<i64>,
}

/// One VM snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot name.
    pub name: String,
    /// Creation time (unix timestamp). The implicit `current` entry has none.
    pub snaptime: Option<i64>,
    /// Free-form description.
    pub description: Option<String>,
}

/// One VM firewall rule.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallRule {
    /// Position within the rule chain.
    pub pos: i64,
    /// Rule direction, `"in"`, `"out"` or `"group"`.
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Verdict or security-group name, e.g. `"ACCEPT"`.
    pub action: String,
    /// 1 when active. Disabled rules stay in the chain.
    pub enable: Option<i64>,
    /// Free-form description.
    pub comment: Option<String>,
}

/// Guest agent queries the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentQuery {
    /// Agent version and supported commands.
    Info,
    /// Guest operating system details.
    OsInfo,
    /// Guest filesystem usage.
    Disks,
    /// Guest network interfaces and addresses.
    Network,
}

impl AgentQuery {
    /// Endpoint name under the VM's `agent/` path.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::OsInfo => "get-osinfo",
            Self::Disks => "get-fsinfo",
            Self::Network => "network-get-interfaces",
        }
    }
}

/// Power state commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Power the VM on.
    Start,
    /// Hard stop.
    Stop,
    /// Graceful guest shutdown.
    Shutdown,
    /// Resume a paused VM.
    Resume,
    /// Freeze the VM without releasing its resources.
    Pause,
}

impl PowerAction {
    /// Command name on the wire. `Pause` maps to the node's `suspend` command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
            Self::Resume => "resume",
            Self::Pause => "suspend",
        }
    }

    /// Status a VM record holds while the command's task is in flight.
    pub fn transitional_status(&self) -> VmStatus {
        match self {
            Self::Start | Self::Resume => VmStatus::Starting,
            Self::Stop | Self::Shutdown | Self::Pause => VmStatus::Stopping,
        }
    }

    /// Status a VM record settles into once the command's task succeeds.
    pub fn final_status(&self) -> VmStatus {
        match self {
            Self::Start | Self::Resume => VmStatus::Running,
            Self::Stop | Self::Shutdown => VmStatus::Stopped,
            Self::Pause => VmStatus::Paused,
        }
    }
}

/// Window selector for the metrics series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricTimeframe {
    /// Last hour.
    Hour,
    /// Last day.
    Day,
    /// Last week.
    Week,
    /// Last month.
    Month,
}

impl MetricTimeframe {
    /// Value of the `timeframe` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// Partial VM configuration write. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfigUpdate {
    /// CPU core count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    /// Memory in MiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// Primary interface address, e.g. `"ip=10.0.0.5/24,gw=10.0.0.1"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipconfig0: Option<String>,
    /// Cloud-init root password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipassword: Option<String>,
    /// Guest agent setting, e.g. `"enabled=1"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Primary network device, e.g. `"virtio,bridge=vmbr0,rate=3.16"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net0: Option<String>,
    /// VM display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl VmConfigUpdate {
    /// Wire parameters for the set fields, in a stable order.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(cores) = self.cores {
            params.push(("cores".to_string(), cores.to_string()));
        }
        if let Some(memory) = self.memory {
            params.push(("memory".to_string(), memory.to_string()));
        }
        if let Some(ipconfig0) = &self.ipconfig0 {
            params.push(("ipconfig0".to_string(), ipconfig0.clone()));
        }
        if let Some(cipassword) = &self.cipassword {
            params.push(("cipassword".to_string(), cipassword.clone()));
        }
        if let Some(agent) = &self.agent {
            params.push(("agent".to_string(), agent.clone()));
        }
        if let Some(net0) = &self.net0 {
            params.push(("net0".to_string(), net0.clone()));
        }
        if let Some(name) = &self.name {
            params.push(("name".to_string(), name.clone()));
        }
        params
    }
}

/// Trait for cluster control planes.
///
/// Mutating commands are asynchronous on the remote side: each returns a
/// [`TaskRef`] immediately and the actual work runs as a task on the node.
/// Callers decide per call site whether to await the task (see
/// [`crate::poll::await_task`]) or fire and forget.
///
/// Implementations do NOT touch the local database. Record updates are the
/// caller's responsibility.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List cluster nodes.
    async fn read_nodes(&self) -> Result<Vec<NodeInfo>>;

    /// List all VMs known to the cluster, across nodes.
    async fn read_cluster_vms(&self) -> Result<Vec<ClusterVm>>;

    /// Read a VM's current configuration as raw key/value data.
    async fn read_vm_config(&self, node: &str, vmid: i64) -> Result<Value>;

    /// Read the state of a previously submitted task.
    async fn read_task_status(&self, task: &TaskRef) -> Result<RemoteTaskStatus>;

    /// Read a VM's metrics series for the given window.
    async fn read_metrics_series(
        &self,
        node: &str,
        vmid: i64,
        timeframe: MetricTimeframe,
    ) -> Result<Vec<MetricSample>>;

    /// List backup archives on a storage.
    async fn read_backups(&self, node: &str, storage: &str) -> Result<Vec<BackupInfo>>;

    /// List a VM's snapshots.
    async fn read_snapshots(&self, node: &str, vmid: i64) -> Result<Vec<SnapshotInfo>>;

    /// List a VM's firewall rules.
    async fn read_firewall_rules(&self, node: &str, vmid: i64) -> Result<Vec<FirewallRule>>;

    /// Query the guest agent. Fails while the guest is down or agentless.
    async fn read_guest_agent(&self, node: &str, vmid: i64, query: AgentQuery) -> Result<Value>;

    /// Create a VM from raw creation parameters. `params` must be a JSON
    /// object; its entries are passed through to the node verbatim.
    async fn submit_create(&self, node: &str, params: &Value) -> Result<TaskRef>;

    /// Clone a template into a new VM on the same node.
    async fn submit_clone(
        &self,
        node: &str,
        template_vmid: i64,
        new_vmid: i64,
        name: &str,
        full: bool,
    ) -> Result<TaskRef>;

    /// Apply a partial configuration update to a VM.
    async fn write_vm_config(
        &self,
        node: &str,
        vmid: i64,
        update: &VmConfigUpdate,
    ) -> Result<TaskRef>;

    /// Grow a VM disk. `size` uses the node's syntax, e.g. `"+20G"`.
    async fn submit_resize(
        &self,
        node: &str,
        vmid: i64,
        disk: &str,
        size: &str,
    ) -> Result<TaskRef>;

    /// Move a VM to another node. Submitted on, and polled from, the
    /// source node.
    async fn submit_migrate(
        &self,
        source_node: &str,
        vmid: i64,
        target_node: &str,
    ) -> Result<TaskRef>;

    /// Change a VM's power state.
    async fn submit_power(&self, node: &str, vmid: i64, action: PowerAction) -> Result<TaskRef>;

    /// Destroy a VM and its disks.
    async fn submit_delete(&self, node: &str, vmid: i64) -> Result<TaskRef>;

    /// Back up a VM to a storage.
    async fn submit_backup(&self, node: &str, vmid: i64, storage: &str) -> Result<TaskRef>;

    /// Restore a VM from a backup archive.
    async fn submit_restore(
        &self,
        node: &str,
        vmid: i64,
        volid: &str,
        storage: &str,
    ) -> Result<TaskRef>;

    /// Delete a backup archive from a storage.
    async fn delete_backup(&self, node: &str, storage: &str, volid: &str) -> Result<TaskRef>;

    /// Take a snapshot of a VM.
    async fn submit_snapshot(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef>;

    /// Roll a VM back to a snapshot.
    async fn submit_rollback(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef>;

    /// Delete a VM snapshot.
    async fn delete_snapshot(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef>;

    /// Convert a stopped VM into a clone source template.
    async fn convert_to_template(&self, node: &str, vmid: i64) -> Result<TaskRef>;

    /// Next free cluster-unique VM id. Ids start at 100.
    async fn next_vmid(&self) -> Result<i64> {
        let vms = self.read_cluster_vms().await?;
        let highest = vms.iter().map(|vm| vm.vmid).max().unwrap_or(99);
        Ok(highest.max(99) + 1)
    }
}
