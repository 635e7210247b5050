// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for vmforge-engine.
//!
//! This module provides [`EngineRuntime`] which allows embedding the engine
//! into an existing tokio application instead of running it as a standalone
//! binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmforge_core::persistence::PostgresPersistence;
//! use vmforge_engine::control::proxmox::{ProxmoxClient, ProxmoxClientConfig};
//! use vmforge_engine::runtime::EngineRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgres://...").await?;
//!     let persistence = Arc::new(PostgresPersistence::new(pool));
//!     let control = Arc::new(ProxmoxClient::new(ProxmoxClientConfig::new(
//!         "pve.example.com",
//!         "panel@pve!engine",
//!         "secret",
//!     ))?);
//!
//!     let runtime = EngineRuntime::builder()
//!         .persistence(persistence)
//!         .control(control)
//!         .build()?
//!         .start()
//!         .await;
//!
//!     // ... drive workflows through runtime.context() ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use vmforge_core::Persistence;

use crate::backup_worker::{BackupWorker, BackupWorkerConfig};
use crate::bandwidth_worker::{BandwidthWorker, BandwidthWorkerConfig};
use crate::control::ControlPlane;
use crate::progress::ProgressChannel;
use crate::workflows::WorkflowContext;

/// Builder for creating an [`EngineRuntime`].
pub struct EngineRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    control: Option<Arc<dyn ControlPlane>>,
    progress_capacity: usize,
    bandwidth_config: BandwidthWorkerConfig,
    backup_config: BackupWorkerConfig,
}

impl Default for EngineRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            control: None,
            progress_capacity: 64,
            bandwidth_config: BandwidthWorkerConfig::default(),
            backup_config: BackupWorkerConfig::default(),
        }
    }
}

impl EngineRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the cluster control plane (required).
    pub fn control(mut self, control: Arc<dyn ControlPlane>) -> Self {
        self.control = Some(control);
        self
    }

    /// Set the progress channel capacity.
    ///
    /// Default: 64
    pub fn progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity;
        self
    }

    /// Set the bandwidth worker configuration.
    ///
    /// Default: [`BandwidthWorkerConfig::default()`]
    pub fn bandwidth_config(mut self, config: BandwidthWorkerConfig) -> Self {
        self.bandwidth_config = config;
        self
    }

    /// Set the backup worker configuration.
    ///
    /// Default: [`BackupWorkerConfig::default()`]
    pub fn backup_config(mut self, config: BackupWorkerConfig) -> Self {
        self.backup_config = config;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<EngineRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        let control = self
            .control
            .ok_or_else(|| anyhow::anyhow!("control is required"))?;

        Ok(EngineRuntimeConfig {
            persistence,
            control,
            progress_capacity: self.progress_capacity,
            bandwidth_config: self.bandwidth_config,
            backup_config: self.backup_config,
        })
    }
}

/// Configuration for an [`EngineRuntime`].
pub struct EngineRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    control: Arc<dyn ControlPlane>,
    progress_capacity: usize,
    bandwidth_config: BandwidthWorkerConfig,
    backup_config: BackupWorkerConfig,
}

impl EngineRuntimeConfig {
    /// Start the runtime, spawning the bandwidth and backup worker tasks.
    pub async fn start(self) -> EngineRuntime {
        let progress = ProgressChannel::new(self.progress_capacity);
        let context = WorkflowContext::new(
            self.persistence.clone(),
            self.control.clone(),
            progress.clone(),
        );

        let bandwidth_worker = BandwidthWorker::new(
            self.bandwidth_config,
            self.persistence.clone(),
            self.control.clone(),
        );
        let bandwidth_shutdown = bandwidth_worker.shutdown_handle();

        let bandwidth_handle = tokio::spawn(async move {
            bandwidth_worker.run().await;
        });

        let backup_worker = BackupWorker::new(
            self.backup_config,
            self.persistence.clone(),
            self.control.clone(),
        );
        let backup_shutdown = backup_worker.shutdown_handle();

        let backup_handle = tokio::spawn(async move {
            backup_worker.run().await;
        });

        info!("EngineRuntime started");

        EngineRuntime {
            bandwidth_handle,
            backup_handle,
            bandwidth_shutdown,
            backup_shutdown,
            context,
        }
    }
}

/// A running vmforge-engine instance that can be embedded in an application.
///
/// The runtime manages:
/// - Bandwidth worker for fleet traffic accounting
/// - Backup worker for scheduled backups and archive retention
/// - The [`WorkflowContext`] embedders drive lifecycle workflows through
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct EngineRuntime {
    bandwidth_handle: JoinHandle<()>,
    backup_handle: JoinHandle<()>,
    bandwidth_shutdown: Arc<Notify>,
    backup_shutdown: Arc<Notify>,
    context: WorkflowContext,
}

impl EngineRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new()
    }

    /// Get the workflow context for driving lifecycle operations.
    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    /// Get a handle on the progress fan-out channel.
    pub fn progress(&self) -> ProgressChannel {
        self.context.progress.clone()
    }

    /// Gracefully shut down the runtime.
    ///
    /// This signals the bandwidth and backup workers to stop, then waits
    /// for them to complete.
    pub async fn shutdown(self) -> Result<()> {
        info!("EngineRuntime shutting down...");

        // Signal bandwidth worker shutdown
        self.bandwidth_shutdown.notify_one();

        // Signal backup worker shutdown
        self.backup_shutdown.notify_one();

        // Wait for bandwidth worker
        if let Err(e) = self.bandwidth_handle.await {
            error!("Bandwidth worker task panicked: {}", e);
        }

        // Wait for backup worker
        if let Err(e) = self.backup_handle.await {
            error!("Backup worker task panicked: {}", e);
        }

        info!("EngineRuntime shutdown complete");
        Ok(())
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.bandwidth_handle.is_finished() && !self.backup_handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MockControlPlane;
    use std::time::Duration;
    use tempfile::TempDir;
    use vmforge_core::SqlitePersistence;

    async fn test_persistence(temp_dir: &TempDir) -> Arc<SqlitePersistence> {
        Arc::new(
            SqlitePersistence::from_path(temp_dir.path().join("test.db"))
                .await
                .expect("persistence"),
        )
    }

    #[test]
    fn test_builder_defaults() {
        let builder = EngineRuntimeBuilder::default();
        assert!(builder.persistence.is_none());
        assert!(builder.control.is_none());
        assert_eq!(builder.progress_capacity, 64);
        assert_eq!(
            builder.bandwidth_config.poll_interval,
            Duration::from_secs(86_400)
        );
        assert_eq!(
            builder.backup_config.poll_interval,
            Duration::from_secs(604_800)
        );
    }

    #[tokio::test]
    async fn test_builder_requires_persistence() {
        let builder = EngineRuntimeBuilder::new().control(Arc::new(MockControlPlane::new()));

        let err = builder.build().err().expect("build must fail");
        assert!(err.to_string().contains("persistence is required"));
    }

    #[tokio::test]
    async fn test_builder_requires_control() {
        let temp_dir = TempDir::new().expect("temp dir");
        let builder = EngineRuntimeBuilder::new().persistence(test_persistence(&temp_dir).await);

        let err = builder.build().err().expect("build must fail");
        assert!(err.to_string().contains("control is required"));
    }

    #[tokio::test]
    async fn test_builder_setters_chain() {
        let temp_dir = TempDir::new().expect("temp dir");
        let bandwidth_config = BandwidthWorkerConfig {
            poll_interval: Duration::from_secs(60),
            retention_months: 1,
        };
        let backup_config = BackupWorkerConfig {
            poll_interval: Duration::from_secs(120),
            storage: "tank".to_string(),
            retain: 3,
        };

        let builder = EngineRuntimeBuilder::new()
            .persistence(test_persistence(&temp_dir).await)
            .control(Arc::new(MockControlPlane::new()))
            .progress_capacity(16)
            .bandwidth_config(bandwidth_config)
            .backup_config(backup_config);

        assert_eq!(builder.progress_capacity, 16);
        assert_eq!(
            builder.bandwidth_config.poll_interval,
            Duration::from_secs(60)
        );
        assert_eq!(builder.backup_config.storage, "tank");
        assert_eq!(builder.backup_config.retain, 3);
        assert!(builder.build().is_ok());
    }

    #[tokio::test]
    async fn test_runtime_start_and_shutdown() {
        let temp_dir = TempDir::new().expect("temp dir");

        let runtime = EngineRuntime::builder()
            .persistence(test_persistence(&temp_dir).await)
            .control(Arc::new(MockControlPlane::new()))
            .build()
            .expect("build")
            .start()
            .await;

        assert!(runtime.is_running());
        runtime.shutdown().await.expect("shutdown");
    }
}
