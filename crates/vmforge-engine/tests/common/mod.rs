// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for vmforge-engine integration tests.
//!
//! Provides TestContext wiring a SQLite state layer and a mock control
//! plane into a workflow context, plus fixture helpers.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use uuid::Uuid;

use vmforge_core::{NewVm, Persistence, SqlitePersistence, VmRecord, VmStatus};
use vmforge_engine::control::MockControlPlane;
use vmforge_engine::progress::{ProgressChannel, ProgressEvent};
use vmforge_engine::workflows::WorkflowContext;

/// Test context bundling persistence, mock control plane, and workflows.
pub struct TestContext {
    pub persistence: Arc<SqlitePersistence>,
    pub control: Arc<MockControlPlane>,
    pub ctx: WorkflowContext,
    _temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Create a new test context over a fresh SQLite database.
    ///
    /// The pool pins a single connection and skips the acquire-time ping:
    /// both otherwise await the connection's worker thread inside the pool's
    /// acquire timeout, which tests running under a paused tokio clock
    /// auto-advance past, failing every query with a spurious pool timeout.
    pub async fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("temp dir");
        let url = format!(
            "sqlite:{}?mode=rwc",
            temp_dir.path().join("test.db").display()
        );
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .test_before_acquire(false)
            .connect(&url)
            .await
            .expect("sqlite pool");
        vmforge_core::migrations::run_sqlite(&pool)
            .await
            .expect("run migrations");
        let persistence = Arc::new(SqlitePersistence::new(pool));
        let control = Arc::new(MockControlPlane::new());

        let ctx = WorkflowContext::new(
            persistence.clone(),
            control.clone(),
            ProgressChannel::new(64),
        );

        Self {
            persistence,
            control,
            ctx,
            _temp_dir: temp_dir,
        }
    }

    /// Subscribe to workflow progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.ctx.progress.subscribe()
    }

    /// Insert a VM record on node `pve1` with the given status.
    pub async fn seed_vm(&self, vmid: i64, status: VmStatus) -> VmRecord {
        self.persistence
            .create_vm(&NewVm {
                vmid,
                name: format!("test-vm-{vmid}"),
                node: "pve1".to_string(),
                status,
                user_id: Uuid::new_v4().to_string(),
                bandwidth_limit: None,
            })
            .await
            .expect("seed vm");
        self.vm(vmid).await
    }

    /// Seed one free address into the inventory.
    pub async fn seed_ip(&self, address: &str) -> i64 {
        self.persistence
            .add_ip_address(address, "10.0.0.1", "24")
            .await
            .expect("seed ip")
    }

    /// Fetch a VM record that must exist.
    pub async fn vm(&self, vmid: i64) -> VmRecord {
        self.persistence
            .get_vm(vmid)
            .await
            .expect("get vm")
            .expect("vm exists")
    }

    /// Fetch a VM's status, if the record exists.
    pub async fn vm_status(&self, vmid: i64) -> Option<VmStatus> {
        self.persistence
            .get_vm(vmid)
            .await
            .expect("get vm")
            .map(|vm| vm.status)
    }
}

/// Collect every progress event buffered on the receiver.
pub fn drain_progress(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
