// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for vmforge-core.
//!
//! This module defines the persistence abstraction and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::CoreError;
use crate::status::VmStatus;

/// VM record from the state layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VmRecord {
    /// Cluster-unique numeric identifier.
    pub vmid: i64,
    /// Display name, also applied to the remote guest.
    pub name: String,
    /// Node the VM is currently placed on; updated on migration.
    pub node: String,
    /// Current lifecycle status.
    #[sqlx(try_from = "String")]
    pub status: VmStatus,
    /// Saved configuration snapshot (JSON), required by reinstall.
    pub config: Option<String>,
    /// Most recently submitted remote task handle, kept for diagnosis.
    pub upid: Option<String>,
    /// Owning user identifier.
    pub user_id: String,
    /// Monthly traffic quota in TB; empty means unlimited.
    pub bandwidth_limit: Option<i64>,
    /// Bytes consumed in the current billing month.
    pub bandwidth_usage_bytes: i64,
    /// First day of the month the usage counter tracks.
    pub bandwidth_reset_date: NaiveDate,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new VM record.
#[derive(Debug, Clone)]
pub struct NewVm {
    /// Cluster-unique numeric identifier.
    pub vmid: i64,
    /// Display name.
    pub name: String,
    /// Node the VM is placed on.
    pub node: String,
    /// Initial lifecycle status.
    pub status: VmStatus,
    /// Owning user identifier.
    pub user_id: String,
    /// Monthly traffic quota in TB; empty means unlimited.
    pub bandwidth_limit: Option<i64>,
}

/// IP address inventory record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IpAddressRecord {
    /// Database primary key.
    pub id: i64,
    /// The address itself, e.g. "10.0.0.5".
    pub address: String,
    /// Gateway for the subnet the address belongs to.
    pub gateway: String,
    /// Prefix length of the subnet, e.g. "24".
    pub netmask: String,
    /// Whether the address is held back from allocation.
    pub reserved: bool,
    /// VM currently owning the address, if any.
    pub vm_id: Option<i64>,
}

/// Daily bandwidth usage snapshot for one VM.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BandwidthSampleRecord {
    /// Database primary key.
    pub id: i64,
    /// VM the sample belongs to.
    pub vm_id: i64,
    /// Calendar day the sample covers.
    pub day: NaiveDate,
    /// Bytes received during the day.
    pub bytes_in: i64,
    /// Bytes sent during the day.
    pub bytes_out: i64,
    /// Sum of both directions.
    pub total_bytes: i64,
    /// When the row was first written.
    pub created_at: DateTime<Utc>,
}

/// First day of the month containing `day`.
pub fn month_start(day: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month, so the fallback is unreachable.
    day.with_day(1).unwrap_or(day)
}

/// Persistence interface used by workflows and background workers.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_vm(&self, vm: &NewVm) -> Result<(), CoreError>;

    async fn get_vm(&self, vmid: i64) -> Result<Option<VmRecord>, CoreError>;

    async fn list_vms(&self) -> Result<Vec<VmRecord>, CoreError>;

    async fn list_vms_by_status(&self, status: VmStatus) -> Result<Vec<VmRecord>, CoreError>;

    /// Remove a VM record. The caller is responsible for releasing its
    /// addresses first; the row disappears regardless of status.
    async fn delete_vm(&self, vmid: i64) -> Result<(), CoreError>;

    /// Move a VM to `to`, enforcing the transition table.
    ///
    /// The write is guarded by the status that was read, so a concurrent
    /// writer cannot slip between the check and the update. Returns the
    /// status the VM held before the move.
    async fn transition_vm(&self, vmid: i64, to: VmStatus) -> Result<VmStatus, CoreError>;

    async fn update_vm_node(&self, vmid: i64, node: &str) -> Result<(), CoreError>;

    /// Record the handle of the most recently submitted remote task.
    /// Overwritten on every new submission.
    async fn update_vm_upid(&self, vmid: i64, upid: &str) -> Result<(), CoreError>;

    async fn update_vm_config(&self, vmid: i64, config: Option<&str>) -> Result<(), CoreError>;

    /// Seed one address into the inventory. Returns its row id.
    async fn add_ip_address(
        &self,
        address: &str,
        gateway: &str,
        netmask: &str,
    ) -> Result<i64, CoreError>;

    /// Claim one free address for `vmid`.
    ///
    /// Free means not reserved and owned by no VM. The claim marks the row
    /// reserved and owned in a single conditional update, so two concurrent
    /// claimants can never receive the same address. Fails with
    /// [`CoreError::NoFreeAddress`] once the free pool is empty.
    async fn claim_ip_address(&self, vmid: i64) -> Result<IpAddressRecord, CoreError>;

    /// Return every address owned by `vmid` to the free pool. Idempotent;
    /// returns the number of addresses released.
    async fn release_ip_addresses(&self, vmid: i64) -> Result<u64, CoreError>;

    async fn get_ip_for_vm(&self, vmid: i64) -> Result<Option<IpAddressRecord>, CoreError>;

    async fn list_free_ip_addresses(&self) -> Result<Vec<IpAddressRecord>, CoreError>;

    /// Zero the cumulative usage counter and advance the reset marker.
    async fn reset_vm_bandwidth(&self, vmid: i64, reset_date: NaiveDate) -> Result<(), CoreError>;

    /// Replace the cumulative usage counter with `usage_bytes`.
    async fn update_vm_bandwidth_usage(&self, vmid: i64, usage_bytes: i64)
    -> Result<(), CoreError>;

    /// Write the daily snapshot row for `(vmid, day)`, replacing any
    /// existing row for the same day.
    async fn upsert_bandwidth_sample(
        &self,
        vmid: i64,
        day: NaiveDate,
        bytes_in: i64,
        bytes_out: i64,
    ) -> Result<(), CoreError>;

    async fn list_bandwidth_samples(
        &self,
        vmid: i64,
    ) -> Result<Vec<BandwidthSampleRecord>, CoreError>;

    /// Delete snapshot rows older than `cutoff`. Returns the number removed.
    async fn prune_bandwidth_samples(&self, cutoff: NaiveDate) -> Result<u64, CoreError>;
}
