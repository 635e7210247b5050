// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for vmforge-core persistence tests.
//!
//! Provides a TestContext backed by a throwaway SQLite database file.

#![allow(dead_code)]

use tempfile::TempDir;

use vmforge_core::persistence::{NewVm, Persistence, SqlitePersistence};
use vmforge_core::status::VmStatus;

/// Test context that owns a temporary SQLite database.
///
/// The database file lives inside a TempDir that is removed when the
/// context is dropped.
pub struct TestContext {
    pub persistence: SqlitePersistence,
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a fresh, fully migrated database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db_path = temp_dir.path().join("vmforge-test.db");
        let persistence = SqlitePersistence::from_path(&db_path)
            .await
            .expect("open test database");

        Self {
            persistence,
            _temp_dir: temp_dir,
        }
    }

    /// Insert a VM directly in the given status, bypassing workflows.
    pub async fn seed_vm(&self, vmid: i64, status: VmStatus) {
        self.persistence
            .create_vm(&NewVm {
                vmid,
                name: format!("vm-{}", vmid),
                node: "pve1".to_string(),
                status,
                user_id: "user-1".to_string(),
                bandwidth_limit: None,
            })
            .await
            .expect("seed vm");
    }

    /// Seed `count` addresses 10.0.0.10, 10.0.0.11, ... into the inventory.
    pub async fn seed_ips(&self, count: u8) {
        for i in 0..count {
            self.persistence
                .add_ip_address(&format!("10.0.0.{}", 10 + i), "10.0.0.1", "24")
                .await
                .expect("seed ip");
        }
    }

    /// Current status of a VM, read back through the persistence layer.
    pub async fn status_of(&self, vmid: i64) -> VmStatus {
        self.persistence
            .get_vm(vmid)
            .await
            .expect("get vm")
            .expect("vm exists")
            .status
    }

    /// Number of addresses currently free.
    pub async fn free_ip_count(&self) -> usize {
        self.persistence
            .list_free_ip_addresses()
            .await
            .expect("list free ips")
            .len()
    }
}

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
