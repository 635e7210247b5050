// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for scheduled VM backups.
//!
//! Once per cadence (weekly in production) the worker submits a backup
//! task for every running VM, then trims that VM's archives on the
//! backup storage down to the newest seven. Backup tasks are not
//! awaited; the node runs them for as long as it needs and the task
//! handle is recorded on the VM for later inspection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use vmforge_core::{Persistence, VmRecord, VmStatus};

use crate::control::ControlPlane;
use crate::error::Result;

/// Configuration for the backup worker.
#[derive(Debug, Clone)]
pub struct BackupWorkerConfig {
    /// How often to run a backup cycle.
    pub poll_interval: Duration,
    /// Storage identifier the archives are written to.
    pub storage: String,
    /// How many archives to keep per VM.
    pub retain: usize,
}

impl Default for BackupWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(7 * 24 * 3600), // weekly
            storage: "local".to_string(),
            retain: 7,
        }
    }
}

/// Background worker that backs up running VMs and trims old archives.
pub struct BackupWorker {
    config: BackupWorkerConfig,
    persistence: Arc<dyn Persistence>,
    control: Arc<dyn ControlPlane>,
    shutdown: Arc<Notify>,
}

impl BackupWorker {
    /// Create a new backup worker.
    pub fn new(
        config: BackupWorkerConfig,
        persistence: Arc<dyn Persistence>,
        control: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            config,
            persistence,
            control,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the backup worker loop.
    ///
    /// Runs one backup cycle per poll interval. The loop exits when the
    /// shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            storage = %self.config.storage,
            retain = self.config.retain,
            "Backup worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Backup worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Backup cycle failed");
                    }
                }
            }
        }

        info!("Backup worker stopped");
    }

    /// One backup cycle over all running VMs.
    ///
    /// The loop in [`run`](Self::run) calls this on the poll cadence;
    /// it is also callable directly for an on-demand cycle.
    pub async fn run_cycle(&self) -> Result<()> {
        let vms = self
            .persistence
            .list_vms_by_status(VmStatus::Running)
            .await?;

        let mut submitted = 0u64;
        let mut failed = 0u64;
        for vm in &vms {
            match self.backup_vm(vm).await {
                Ok(()) => submitted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(vmid = vm.vmid, error = %e, "Backup failed for VM");
                }
            }
        }

        info!(submitted, failed, "Backup cycle complete");
        Ok(())
    }

    async fn backup_vm(&self, vm: &VmRecord) -> Result<()> {
        let task = self
            .control
            .submit_backup(&vm.node, vm.vmid, &self.config.storage)
            .await?;
        self.persistence.update_vm_upid(vm.vmid, &task.upid).await?;
        info!(vmid = vm.vmid, upid = %task.upid, "Backup submitted");

        self.enforce_retention(vm).await
    }

    /// Delete everything past the newest `retain` archives for this VM.
    ///
    /// The listing predates the backup submitted just above, so the VM
    /// briefly holds one extra archive until the next cycle trims it.
    async fn enforce_retention(&self, vm: &VmRecord) -> Result<()> {
        let mut backups: Vec<_> = self
            .control
            .read_backups(&vm.node, &self.config.storage)
            .await?
            .into_iter()
            .filter(|b| b.vmid == Some(vm.vmid))
            .collect();
        backups.sort_by(|a, b| b.ctime.cmp(&a.ctime));

        for backup in backups.iter().skip(self.config.retain) {
            match self
                .control
                .delete_backup(&vm.node, &self.config.storage, &backup.volid)
                .await
            {
                Ok(_) => info!(vmid = vm.vmid, volid = %backup.volid, "Deleted expired backup"),
                Err(e) => {
                    warn!(vmid = vm.vmid, volid = %backup.volid, error = %e,
                        "Failed to delete expired backup");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MockControlPlane;
    use tempfile::TempDir;
    use vmforge_core::SqlitePersistence;

    #[test]
    fn test_config_defaults() {
        let config = BackupWorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(604_800));
        assert_eq!(config.storage, "local");
        assert_eq!(config.retain, 7);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown_signal() {
        let temp_dir = TempDir::new().expect("temp dir");
        let persistence = SqlitePersistence::from_path(temp_dir.path().join("test.db"))
            .await
            .expect("persistence");

        let worker = BackupWorker::new(
            BackupWorkerConfig::default(),
            Arc::new(persistence),
            Arc::new(MockControlPlane::new()),
        );

        worker.shutdown_handle().notify_one();
        tokio::time::timeout(Duration::from_secs(1), worker.run())
            .await
            .expect("worker must stop promptly");
    }
}
