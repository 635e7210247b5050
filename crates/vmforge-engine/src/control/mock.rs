// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock control plane for testing.
//!
//! Simulates a cluster without any network traffic. Commands are recorded
//! for assertions, and each submitted task completes according to a
//! configurable outcome.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::*;

/// What kind of command a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CommandKind {
    Create,
    Clone,
    Config,
    Resize,
    Migrate,
    Power,
    Delete,
    Backup,
    Restore,
    DeleteBackup,
    Snapshot,
    Rollback,
    DeleteSnapshot,
    Template,
}

fn kind_label(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Create => "qmcreate",
        CommandKind::Clone => "qmclone",
        CommandKind::Config => "qmconfig",
        CommandKind::Resize => "qmresize",
        CommandKind::Migrate => "qmigrate",
        CommandKind::Power => "qmpower",
        CommandKind::Delete => "qmdestroy",
        CommandKind::Backup => "vzdump",
        CommandKind::Restore => "qmrestore",
        CommandKind::DeleteBackup => "imgdel",
        CommandKind::Snapshot => "qmsnapshot",
        CommandKind::Rollback => "qmrollback",
        CommandKind::DeleteSnapshot => "qmdelsnapshot",
        CommandKind::Template => "qmtemplate",
    }
}

/// How the mock completes tasks of one command kind.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Report `running` for `polls` status reads, then terminal success.
    Succeed {
        /// Number of non-terminal reads before the task finishes.
        polls: u32,
    },
    /// Terminate immediately with the given exit status.
    Fail {
        /// Exit status reported by the task, e.g. `"ERROR: mock failure"`.
        exitstatus: String,
    },
    /// Never reach a terminal state.
    NeverFinish,
}

/// Record of one submitted command, kept for assertions.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum RecordedCommand {
    Create {
        node: String,
        params: Value,
    },
    Clone {
        node: String,
        template_vmid: i64,
        new_vmid: i64,
        name: String,
        full: bool,
    },
    ConfigUpdate {
        node: String,
        vmid: i64,
        update: VmConfigUpdate,
    },
    Resize {
        node: String,
        vmid: i64,
        disk: String,
        size: String,
    },
    Migrate {
        source_node: String,
        vmid: i64,
        target_node: String,
    },
    Power {
        node: String,
        vmid: i64,
        action: PowerAction,
    },
    Delete {
        node: String,
        vmid: i64,
    },
    Backup {
        node: String,
        vmid: i64,
        storage: String,
    },
    Restore {
        node: String,
        vmid: i64,
        volid: String,
        storage: String,
    },
    DeleteBackup {
        node: String,
        storage: String,
        volid: String,
    },
    Snapshot {
        node: String,
        vmid: i64,
        name: String,
    },
    Rollback {
        node: String,
        vmid: i64,
        name: String,
    },
    DeleteSnapshot {
        node: String,
        vmid: i64,
        name: String,
    },
    ConvertToTemplate {
        node: String,
        vmid: i64,
    },
}

#[derive(Debug, Clone)]
struct MockTask {
    upid: String,
    kind: CommandKind,
    outcome: TaskOutcome,
    polls: u32,
}

#[derive(Default)]
struct MockState {
    commands: Vec<RecordedCommand>,
    tasks: Vec<MockTask>,
    next_task_id: u64,
    default_outcome: Option<TaskOutcome>,
    outcomes: HashMap<CommandKind, TaskOutcome>,
    submit_failures: HashMap<CommandKind, (u16, String)>,
    submit_failures_once: HashMap<CommandKind, Vec<(u16, String)>>,
    nodes: Vec<NodeInfo>,
    cluster_vms: Vec<ClusterVm>,
    vm_configs: HashMap<i64, Value>,
    metrics: HashMap<i64, Vec<MetricSample>>,
    metrics_failures: HashSet<i64>,
    backups: Vec<BackupInfo>,
    snapshots: HashMap<i64, Vec<SnapshotInfo>>,
    firewall_rules: HashMap<i64, Vec<FirewallRule>>,
    agent_responses: HashMap<i64, Value>,
}

/// Mock control plane for testing.
pub struct MockControlPlane {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    /// Create a mock where every task succeeds on its first status read.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock where every task terminates with a failure.
    pub fn failing() -> Self {
        let state = MockState {
            default_outcome: Some(TaskOutcome::Fail {
                exitstatus: "ERROR: mock failure".to_string(),
            }),
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Override the outcome for tasks of one command kind.
    pub async fn set_outcome(&self, kind: CommandKind, outcome: TaskOutcome) {
        self.state.lock().await.outcomes.insert(kind, outcome);
    }

    /// Make submissions of one command kind fail with an API error.
    pub async fn fail_submit(&self, kind: CommandKind, status: u16, message: &str) {
        self.state
            .lock()
            .await
            .submit_failures
            .insert(kind, (status, message.to_string()));
    }

    /// Make the next submission of one command kind fail with an API
    /// error. Later submissions of the same kind go through.
    pub async fn fail_submit_once(&self, kind: CommandKind, status: u16, message: &str) {
        self.state
            .lock()
            .await
            .submit_failures_once
            .entry(kind)
            .or_default()
            .push((status, message.to_string()));
    }

    /// Set the node listing fixture.
    pub async fn set_nodes(&self, nodes: Vec<NodeInfo>) {
        self.state.lock().await.nodes = nodes;
    }

    /// Set the cluster VM listing fixture.
    pub async fn set_cluster_vms(&self, vms: Vec<ClusterVm>) {
        self.state.lock().await.cluster_vms = vms;
    }

    /// Set the configuration returned for one VM.
    pub async fn set_vm_config(&self, vmid: i64, config: Value) {
        self.state.lock().await.vm_configs.insert(vmid, config);
    }

    /// Set the metrics series returned for one VM.
    pub async fn set_metrics(&self, vmid: i64, samples: Vec<MetricSample>) {
        self.state.lock().await.metrics.insert(vmid, samples);
    }

    /// Make metrics reads for one VM fail with a server error.
    pub async fn fail_metrics(&self, vmid: i64) {
        self.state.lock().await.metrics_failures.insert(vmid);
    }

    /// Set the backup listing fixture. Deleted archives are removed from it.
    pub async fn set_backups(&self, backups: Vec<BackupInfo>) {
        self.state.lock().await.backups = backups;
    }

    /// Set the snapshot listing returned for one VM.
    pub async fn set_snapshots(&self, vmid: i64, snapshots: Vec<SnapshotInfo>) {
        self.state.lock().await.snapshots.insert(vmid, snapshots);
    }

    /// Set the firewall rule listing returned for one VM.
    pub async fn set_firewall_rules(&self, vmid: i64, rules: Vec<FirewallRule>) {
        self.state.lock().await.firewall_rules.insert(vmid, rules);
    }

    /// Set the guest agent payload returned for one VM.
    pub async fn set_agent_response(&self, vmid: i64, response: Value) {
        self.state.lock().await.agent_responses.insert(vmid, response);
    }

    /// All commands submitted so far, in order.
    pub async fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().await.commands.clone()
    }

    /// Status read counts for tasks of one kind, in submission order.
    ///
    /// A count of zero means the task was submitted fire-and-forget.
    pub async fn poll_counts(&self, kind: CommandKind) -> Vec<u32> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|task| task.kind == kind)
            .map(|task| task.polls)
            .collect()
    }

    /// Backups currently in the listing fixture.
    pub async fn remaining_backups(&self) -> Vec<BackupInfo> {
        self.state.lock().await.backups.clone()
    }

    async fn submit(
        &self,
        node: &str,
        kind: CommandKind,
        command: RecordedCommand,
    ) -> Result<TaskRef> {
        let mut state = self.state.lock().await;

        if let Some(queue) = state.submit_failures_once.get_mut(&kind)
            && !queue.is_empty()
        {
            let (status, message) = queue.remove(0);
            return Err(ControlPlaneError::Api { status, message });
        }

        if let Some((status, message)) = state.submit_failures.get(&kind) {
            return Err(ControlPlaneError::Api {
                status: *status,
                message: message.clone(),
            });
        }

        state.commands.push(command);
        state.next_task_id += 1;
        let upid = format!(
            "UPID:{}:{:08X}:{}:mock:",
            node,
            state.next_task_id,
            kind_label(kind)
        );

        let outcome = state
            .outcomes
            .get(&kind)
            .or(state.default_outcome.as_ref())
            .cloned()
            .unwrap_or(TaskOutcome::Succeed { polls: 0 });

        state.tasks.push(MockTask {
            upid: upid.clone(),
            kind,
            outcome,
            polls: 0,
        });

        Ok(TaskRef {
            node: node.to_string(),
            upid,
        })
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn read_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.state.lock().await.nodes.clone())
    }

    async fn read_cluster_vms(&self) -> Result<Vec<ClusterVm>> {
        Ok(self.state.lock().await.cluster_vms.clone())
    }

    async fn read_vm_config(&self, _node: &str, vmid: i64) -> Result<Value> {
        Ok(self
            .state
            .lock()
            .await
            .vm_configs
            .get(&vmid)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})))
    }

    async fn read_task_status(&self, task: &TaskRef) -> Result<RemoteTaskStatus> {
        let mut state = self.state.lock().await;
        let entry = state
            .tasks
            .iter_mut()
            .find(|t| t.upid == task.upid)
            .ok_or_else(|| {
                ControlPlaneError::UnexpectedResponse(format!("unknown task {}", task.upid))
            })?;

        entry.polls += 1;
        match &entry.outcome {
            TaskOutcome::Succeed { polls } => {
                if entry.polls > *polls {
                    Ok(RemoteTaskStatus {
                        status: "stopped".to_string(),
                        exitstatus: Some("OK".to_string()),
                    })
                } else {
                    Ok(RemoteTaskStatus {
                        status: "running".to_string(),
                        exitstatus: None,
                    })
                }
            }
            TaskOutcome::Fail { exitstatus } => Ok(RemoteTaskStatus {
                status: "stopped".to_string(),
                exitstatus: Some(exitstatus.clone()),
            }),
            TaskOutcome::NeverFinish => Ok(RemoteTaskStatus {
                status: "running".to_string(),
                exitstatus: None,
            }),
        }
    }

    async fn read_metrics_series(
        &self,
        _node: &str,
        vmid: i64,
        _timeframe: MetricTimeframe,
    ) -> Result<Vec<MetricSample>> {
        let state = self.state.lock().await;
        if state.metrics_failures.contains(&vmid) {
            return Err(ControlPlaneError::Api {
                status: 500,
                message: format!("mock metrics failure for VM {vmid}"),
            });
        }
        Ok(state.metrics.get(&vmid).cloned().unwrap_or_default())
    }

    async fn read_backups(&self, _node: &str, _storage: &str) -> Result<Vec<BackupInfo>> {
        Ok(self.state.lock().await.backups.clone())
    }

    async fn read_snapshots(&self, _node: &str, vmid: i64) -> Result<Vec<SnapshotInfo>> {
        Ok(self
            .state
            .lock()
            .await
            .snapshots
            .get(&vmid)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_firewall_rules(&self, _node: &str, vmid: i64) -> Result<Vec<FirewallRule>> {
        Ok(self
            .state
            .lock()
            .await
            .firewall_rules
            .get(&vmid)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_guest_agent(&self, _node: &str, vmid: i64, _query: AgentQuery) -> Result<Value> {
        Ok(self
            .state
            .lock()
            .await
            .agent_responses
            .get(&vmid)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})))
    }

    async fn submit_create(&self, node: &str, params: &Value) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Create,
            RecordedCommand::Create {
                node: node.to_string(),
                params: params.clone(),
            },
        )
        .await
    }

    async fn submit_clone(
        &self,
        node: &str,
        template_vmid: i64,
        new_vmid: i64,
        name: &str,
        full: bool,
    ) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Clone,
            RecordedCommand::Clone {
                node: node.to_string(),
                template_vmid,
                new_vmid,
                name: name.to_string(),
                full,
            },
        )
        .await
    }

    async fn write_vm_config(
        &self,
        node: &str,
        vmid: i64,
        update: &VmConfigUpdate,
    ) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Config,
            RecordedCommand::ConfigUpdate {
                node: node.to_string(),
                vmid,
                update: update.clone(),
            },
        )
        .await
    }

    async fn submit_resize(
        &self,
        node: &str,
        vmid: i64,
        disk: &str,
        size: &str,
    ) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Resize,
            RecordedCommand::Resize {
                node: node.to_string(),
                vmid,
                disk: disk.to_string(),
                size: size.to_string(),
            },
        )
        .await
    }

    async fn submit_migrate(
        &self,
        source_node: &str,
        vmid: i64,
        target_node: &str,
    ) -> Result<TaskRef> {
        self.submit(
            source_node,
            CommandKind::Migrate,
            RecordedCommand::Migrate {
                source_node: source_node.to_string(),
                vmid,
                target_node: target_node.to_string(),
            },
        )
        .await
    }

    async fn submit_power(&self, node: &str, vmid: i64, action: PowerAction) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Power,
            RecordedCommand::Power {
                node: node.to_string(),
                vmid,
                action,
            },
        )
        .await
    }

    async fn submit_delete(&self, node: &str, vmid: i64) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Delete,
            RecordedCommand::Delete {
                node: node.to_string(),
                vmid,
            },
        )
        .await
    }

    async fn submit_backup(&self, node: &str, vmid: i64, storage: &str) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Backup,
            RecordedCommand::Backup {
                node: node.to_string(),
                vmid,
                storage: storage.to_string(),
            },
        )
        .await
    }

    async fn submit_restore(
        &self,
        node: &str,
        vmid: i64,
        volid: &str,
        storage: &str,
    ) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Restore,
            RecordedCommand::Restore {
                node: node.to_string(),
                vmid,
                volid: volid.to_string(),
                storage: storage.to_string(),
            },
        )
        .await
    }

    async fn delete_backup(&self, node: &str, storage: &str, volid: &str) -> Result<TaskRef> {
        let task = self
            .submit(
                node,
                CommandKind::DeleteBackup,
                RecordedCommand::DeleteBackup {
                    node: node.to_string(),
                    storage: storage.to_string(),
                    volid: volid.to_string(),
                },
            )
            .await?;
        self.state.lock().await.backups.retain(|b| b.volid != volid);
        Ok(task)
    }

    async fn submit_snapshot(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Snapshot,
            RecordedCommand::Snapshot {
                node: node.to_string(),
                vmid,
                name: name.to_string(),
            },
        )
        .await
    }

    async fn submit_rollback(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Rollback,
            RecordedCommand::Rollback {
                node: node.to_string(),
                vmid,
                name: name.to_string(),
            },
        )
        .await
    }

    async fn delete_snapshot(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::DeleteSnapshot,
            RecordedCommand::DeleteSnapshot {
                node: node.to_string(),
                vmid,
                name: name.to_string(),
            },
        )
        .await
    }

    async fn convert_to_template(&self, node: &str, vmid: i64) -> Result<TaskRef> {
        self.submit(
            node,
            CommandKind::Template,
            RecordedCommand::ConvertToTemplate {
                node: node.to_string(),
                vmid,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tasks_succeed_immediately_by_default() {
        let mock = MockControlPlane::new();

        let task = mock
            .submit_power("pve1", 100, PowerAction::Start)
            .await
            .expect("submit");
        let status = mock.read_task_status(&task).await.expect("status");

        assert!(status.is_success());
        assert_eq!(
            mock.commands().await,
            vec![RecordedCommand::Power {
                node: "pve1".to_string(),
                vmid: 100,
                action: PowerAction::Start,
            }]
        );
    }

    #[tokio::test]
    async fn test_succeed_after_polls() {
        let mock = MockControlPlane::new();
        mock.set_outcome(CommandKind::Clone, TaskOutcome::Succeed { polls: 2 })
            .await;

        let task = mock
            .submit_clone("pve1", 9000, 105, "vm-105", true)
            .await
            .expect("submit");

        assert!(!mock.read_task_status(&task).await.expect("poll").is_terminal());
        assert!(!mock.read_task_status(&task).await.expect("poll").is_terminal());
        assert!(mock.read_task_status(&task).await.expect("poll").is_success());
        assert_eq!(mock.poll_counts(CommandKind::Clone).await, vec![3]);
    }

    #[tokio::test]
    async fn test_failing_mock_reports_task_failure() {
        let mock = MockControlPlane::failing();

        let task = mock.submit_delete("pve1", 100).await.expect("submit");
        let status = mock.read_task_status(&task).await.expect("status");

        assert!(status.is_terminal());
        assert!(!status.is_success());
        assert_eq!(status.exitstatus.as_deref(), Some("ERROR: mock failure"));
    }

    #[tokio::test]
    async fn test_never_finishing_task_stays_running() {
        let mock = MockControlPlane::new();
        mock.set_outcome(CommandKind::Power, TaskOutcome::NeverFinish)
            .await;

        let task = mock
            .submit_power("pve1", 100, PowerAction::Start)
            .await
            .expect("submit");

        for _ in 0..5 {
            assert!(!mock.read_task_status(&task).await.expect("poll").is_terminal());
        }
    }

    #[tokio::test]
    async fn test_submit_failure_injection() {
        let mock = MockControlPlane::new();
        mock.fail_submit(CommandKind::Migrate, 500, "cluster not quorate")
            .await;

        let err = mock
            .submit_migrate("pve1", 100, "pve2")
            .await
            .expect_err("must fail");

        assert!(matches!(err, ControlPlaneError::Api { status: 500, .. }));
        assert!(err.is_retryable());
        assert!(mock.commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_next_vmid_scans_cluster_listing() {
        let mock = MockControlPlane::new();
        mock.set_cluster_vms(vec![
            ClusterVm {
                vmid: 100,
                node: "pve1".to_string(),
                name: Some("vm-100".to_string()),
                status: "running".to_string(),
            },
            ClusterVm {
                vmid: 104,
                node: "pve2".to_string(),
                name: None,
                status: "stopped".to_string(),
            },
        ])
        .await;

        assert_eq!(mock.next_vmid().await.expect("next_vmid"), 105);
    }

    #[tokio::test]
    async fn test_next_vmid_starts_at_100() {
        let mock = MockControlPlane::new();
        assert_eq!(mock.next_vmid().await.expect("next_vmid"), 100);
    }

    #[tokio::test]
    async fn test_firewall_rules_come_from_the_fixture() {
        let mock = MockControlPlane::new();
        mock.set_firewall_rules(
            105,
            vec![FirewallRule {
                pos: 0,
                rule_type: "in".to_string(),
                action: "ACCEPT".to_string(),
                enable: Some(1),
                comment: Some("ssh".to_string()),
            }],
        )
        .await;

        let rules = mock.read_firewall_rules("pve1", 105).await.expect("read");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action, "ACCEPT");

        let none = mock.read_firewall_rules("pve1", 106).await.expect("read");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_backups_leave_the_listing() {
        let mock = MockControlPlane::new();
        mock.set_backups(vec![
            BackupInfo {
                volid: "local:backup/vzdump-qemu-100-a.vma.zst".to_string(),
                vmid: Some(100),
                ctime: 1_700_000_000,
                size: Some(1024),
            },
            BackupInfo {
                volid: "local:backup/vzdump-qemu-100-b.vma.zst".to_string(),
                vmid: Some(100),
                ctime: 1_700_086_400,
                size: Some(2048),
            },
        ])
        .await;

        mock.delete_backup("pve1", "local", "local:backup/vzdump-qemu-100-a.vma.zst")
            .await
            .expect("delete");

        let remaining = mock.remaining_backups().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].volid, "local:backup/vzdump-qemu-100-b.vma.zst");
    }

    #[tokio::test]
    async fn test_snapshot_lifecycle_records_each_command() {
        let mock = MockControlPlane::new();
        mock.set_snapshots(
            105,
            vec![SnapshotInfo {
                name: "pre-upgrade".to_string(),
                snaptime: Some(1_700_000_000),
                description: Some("before kernel update".to_string()),
            }],
        )
        .await;

        mock.submit_snapshot("pve1", 105, "pre-upgrade")
            .await
            .expect("snapshot");
        let listed = mock.read_snapshots("pve1", 105).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "pre-upgrade");

        mock.submit_rollback("pve1", 105, "pre-upgrade")
            .await
            .expect("rollback");
        mock.delete_snapshot("pve1", 105, "pre-upgrade")
            .await
            .expect("delete");

        assert_eq!(
            mock.commands().await,
            vec![
                RecordedCommand::Snapshot {
                    node: "pve1".to_string(),
                    vmid: 105,
                    name: "pre-upgrade".to_string(),
                },
                RecordedCommand::Rollback {
                    node: "pve1".to_string(),
                    vmid: 105,
                    name: "pre-upgrade".to_string(),
                },
                RecordedCommand::DeleteSnapshot {
                    node: "pve1".to_string(),
                    vmid: 105,
                    name: "pre-upgrade".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_restore_and_template_conversion_record_commands() {
        let mock = MockControlPlane::new();

        let restore = mock
            .submit_restore("pve1", 105, "local:backup/vzdump-qemu-105-a.vma.zst", "local")
            .await
            .expect("restore");
        assert!(restore.upid.contains("qmrestore"));

        let convert = mock.convert_to_template("pve1", 105).await.expect("convert");
        assert!(convert.upid.contains("qmtemplate"));

        assert_eq!(
            mock.commands().await,
            vec![
                RecordedCommand::Restore {
                    node: "pve1".to_string(),
                    vmid: 105,
                    volid: "local:backup/vzdump-qemu-105-a.vma.zst".to_string(),
                    storage: "local".to_string(),
                },
                RecordedCommand::ConvertToTemplate {
                    node: "pve1".to_string(),
                    vmid: 105,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_guest_agent_payload_comes_from_the_fixture() {
        let mock = MockControlPlane::new();
        mock.set_agent_response(
            105,
            serde_json::json!({"result": [{"name": "eth0", "ip-addresses": []}]}),
        )
        .await;

        let response = mock
            .read_guest_agent("pve1", 105, AgentQuery::Network)
            .await
            .expect("read");
        assert_eq!(response["result"][0]["name"], "eth0");

        let empty = mock
            .read_guest_agent("pve1", 106, AgentQuery::Info)
            .await
            .expect("read");
        assert_eq!(empty, serde_json::json!({}));
    }
}
