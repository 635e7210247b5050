// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for fleet bandwidth accounting.
//!
//! Once per cadence (daily in production) the worker walks the fleet and,
//! for each VM, reads the node's month metrics series, computes the
//! month-to-date traffic from the cumulative counters, replaces the VM's
//! usage counter, and writes a daily history snapshot. Counters roll over
//! on the first pass of a new month. One VM's failure never stops the
//! pass; history older than the retention window is pruned at the end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Months, NaiveDate, NaiveTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use vmforge_core::persistence::month_start;
use vmforge_core::{Persistence, VmRecord, VmStatus};

use crate::control::{ControlPlane, MetricTimeframe};
use crate::error::Result;

/// Configuration for the bandwidth worker.
#[derive(Debug, Clone)]
pub struct BandwidthWorkerConfig {
    /// How often to run an accounting pass.
    pub poll_interval: Duration,
    /// How many months of daily history to keep.
    pub retention_months: u32,
}

impl Default for BandwidthWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(24 * 3600), // daily
            retention_months: 3,
        }
    }
}

/// Background worker that accounts fleet bandwidth usage.
pub struct BandwidthWorker {
    config: BandwidthWorkerConfig,
    persistence: Arc<dyn Persistence>,
    control: Arc<dyn ControlPlane>,
    shutdown: Arc<Notify>,
}

impl BandwidthWorker {
    /// Create a new bandwidth worker.
    pub fn new(
        config: BandwidthWorkerConfig,
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

    /// Run the bandwidth worker loop.
    ///
    /// Runs one accounting pass per poll interval. The loop exits when
    /// the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            retention_months = self.config.retention_months,
            "Bandwidth worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Bandwidth worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.account_fleet().await {
                        error!(error = %e, "Bandwidth accounting pass failed");
                    }
                }
            }
        }

        info!("Bandwidth worker stopped");
    }

    /// One accounting pass over the whole fleet.
    ///
    /// The loop in [`run`](Self::run) calls this on the poll cadence;
    /// it is also callable directly for an on-demand pass.
    pub async fn account_fleet(&self) -> Result<()> {
        let today = Utc::now().date_naive();
        let vms = self.persistence.list_vms().await?;

        let mut accounted = 0u64;
        let mut failed = 0u64;
        for vm in &vms {
            // Templates never boot; there is no traffic to account.
            if vm.status == VmStatus::Template {
                continue;
            }

            match self.account_vm(vm, today).await {
                Ok(()) => accounted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(vmid = vm.vmid, error = %e, "Bandwidth accounting failed for VM");
                }
            }
        }

        if let Some(cutoff) = today.checked_sub_months(Months::new(self.config.retention_months)) {
            let pruned = self.persistence.prune_bandwidth_samples(cutoff).await?;
            if pruned > 0 {
                debug!(pruned, cutoff = %cutoff, "Pruned bandwidth history");
            }
        }

        info!(accounted, failed, "Bandwidth accounting pass complete");
        Ok(())
    }

    async fn account_vm(&self, vm: &VmRecord, today: NaiveDate) -> Result<()> {
        let current_month = month_start(today);

        // Roll the counter over before any new delta lands on it.
        if month_start(vm.bandwidth_reset_date) != current_month {
            debug!(vmid = vm.vmid, month = %current_month, "Monthly bandwidth rollover");
            self.persistence
                .reset_vm_bandwidth(vm.vmid, current_month)
                .await?;
        }

        let series = self
            .control
            .read_metrics_series(&vm.node, vm.vmid, MetricTimeframe::Month)
            .await?;

        // The series reaches back into last month; only this month counts.
        let month_start_ts = current_month.and_time(NaiveTime::MIN).and_utc().timestamp();
        let counters: Vec<(f64, f64)> = series
            .iter()
            .filter(|sample| sample.time >= month_start_ts)
            .filter_map(|sample| match (sample.netin, sample.netout) {
                (Some(netin), Some(netout)) => Some((netin, netout)),
                _ => None,
            })
            .collect();

        // One sample gives nothing to diff; leave the counter alone rather
        // than overwrite it with zero.
        if counters.len() < 2 {
            debug!(vmid = vm.vmid, "Not enough samples this month");
            return Ok(());
        }
        let first = counters[0];
        let last = counters[counters.len() - 1];

        // Counters can shrink when the VM reboots; a negative delta is
        // clamped rather than subtracted.
        let bytes_in = (last.0 - first.0).max(0.0) as i64;
        let bytes_out = (last.1 - first.1).max(0.0) as i64;

        self.persistence
            .update_vm_bandwidth_usage(vm.vmid, bytes_in + bytes_out)
            .await?;
        self.persistence
            .upsert_bandwidth_sample(vm.vmid, today, bytes_in, bytes_out)
            .await?;

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
        let config = BandwidthWorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(86_400));
        assert_eq!(config.retention_months, 3);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown_signal() {
        let temp_dir = TempDir::new().expect("temp dir");
        let persistence = SqlitePersistence::from_path(temp_dir.path().join("test.db"))
            .await
            .expect("persistence");

        let worker = BandwidthWorker::new(
            BandwidthWorkerConfig::default(),
            Arc::new(persistence),
            Arc::new(MockControlPlane::new()),
        );

        worker.shutdown_handle().notify_one();
        tokio::time::timeout(Duration::from_secs(1), worker.run())
            .await
            .expect("worker must stop promptly");
    }
}
