// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::error::CoreError;
use crate::status::VmStatus;

use super::{
    BandwidthSampleRecord, IpAddressRecord, NewVm, Persistence, VmRecord, month_start,
};

/// PostgreSQL-backed persistence provider.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres persistence provider from an existing pool.
    ///
    /// Migrations are not run here; call
    /// [`crate::migrations::run_postgres`] during startup.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn create_vm(&self, vm: &NewVm) -> Result<(), CoreError> {
        let reset_date = month_start(Utc::now().date_naive());

        sqlx::query(
            r#"
            INSERT INTO vms (vmid, name, node, status, user_id, bandwidth_limit,
                             bandwidth_usage_bytes, bandwidth_reset_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, NOW())
            "#,
        )
        .bind(vm.vmid)
        .bind(&vm.name)
        .bind(&vm.node)
        .bind(vm.status.as_str())
        .bind(&vm.user_id)
        .bind(vm.bandwidth_limit)
        .bind(reset_date)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::VmAlreadyExists { vmid: vm.vmid }
            }
            _ => CoreError::from(e),
        })?;

        Ok(())
    }

    async fn get_vm(&self, vmid: i64) -> Result<Option<VmRecord>, CoreError> {
        let record = sqlx::query_as::<_, VmRecord>(
            r#"
            SELECT vmid, name, node, status, config, upid, user_id,
                   bandwidth_limit, bandwidth_usage_bytes, bandwidth_reset_date, created_at
            FROM vms
            WHERE vmid = $1
            "#,
        )
        .bind(vmid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_vms(&self) -> Result<Vec<VmRecord>, CoreError> {
        let records = sqlx::query_as::<_, VmRecord>(
            r#"
            SELECT vmid, name, node, status, config, upid, user_id,
                   bandwidth_limit, bandwidth_usage_bytes, bandwidth_reset_date, created_at
            FROM vms
            ORDER BY vmid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_vms_by_status(&self, status: VmStatus) -> Result<Vec<VmRecord>, CoreError> {
        let records = sqlx::query_as::<_, VmRecord>(
            r#"
            SELECT vmid, name, node, status, config, upid, user_id,
                   bandwidth_limit, bandwidth_usage_bytes, bandwidth_reset_date, created_at
            FROM vms
            WHERE status = $1
            ORDER BY vmid
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_vm(&self, vmid: i64) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM vms WHERE vmid = $1")
            .bind(vmid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VmNotFound { vmid });
        }

        Ok(())
    }

    async fn transition_vm(&self, vmid: i64, to: VmStatus) -> Result<VmStatus, CoreError> {
        // Two attempts: the guard below can only miss when another writer
        // moved the status between our read and our update.
        for _ in 0..2 {
            let current = self
                .get_vm(vmid)
                .await?
                .ok_or(CoreError::VmNotFound { vmid })?
                .status;

            if !current.can_transition(to) {
                return Err(CoreError::InvalidStatusTransition {
                    vmid,
                    from: current,
                    to,
                });
            }

            let result = sqlx::query(
                r#"
                UPDATE vms SET status = $1 WHERE vmid = $2 AND status = $3
                "#,
            )
            .bind(to.as_str())
            .bind(vmid)
            .bind(current.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(current);
            }

            debug!(vmid, from = %current, to = %to, "Status moved concurrently, re-reading");
        }

        Err(CoreError::DatabaseError {
            operation: "transition_vm".to_string(),
            details: format!("status of VM {} kept changing concurrently", vmid),
        })
    }

    async fn update_vm_node(&self, vmid: i64, node: &str) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE vms SET node = $1 WHERE vmid = $2")
            .bind(node)
            .bind(vmid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VmNotFound { vmid });
        }

        Ok(())
    }

    async fn update_vm_upid(&self, vmid: i64, upid: &str) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE vms SET upid = $1 WHERE vmid = $2")
            .bind(upid)
            .bind(vmid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VmNotFound { vmid });
        }

        Ok(())
    }

    async fn update_vm_config(&self, vmid: i64, config: Option<&str>) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE vms SET config = $1 WHERE vmid = $2")
            .bind(config)
            .bind(vmid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VmNotFound { vmid });
        }

        Ok(())
    }

    async fn add_ip_address(
        &self,
        address: &str,
        gateway: &str,
        netmask: &str,
    ) -> Result<i64, CoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ip_addresses (address, gateway, netmask, reserved, vm_id)
            VALUES ($1, $2, $3, FALSE, NULL)
            RETURNING id
            "#,
        )
        .bind(address)
        .bind(gateway)
        .bind(netmask)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim_ip_address(&self, vmid: i64) -> Result<IpAddressRecord, CoreError> {
        loop {
            let candidate = sqlx::query_as::<_, IpAddressRecord>(
                r#"
                SELECT id, address, gateway, netmask, reserved, vm_id
                FROM ip_addresses
                WHERE reserved = FALSE AND vm_id IS NULL
                ORDER BY id
                LIMIT 1
                "#,
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some(candidate) = candidate else {
                return Err(CoreError::NoFreeAddress);
            };

            // Both fields flip together; the guard keeps the claim atomic
            // under concurrent callers.
            let result = sqlx::query(
                r#"
                UPDATE ip_addresses
                SET reserved = TRUE, vm_id = $1
                WHERE id = $2 AND reserved = FALSE AND vm_id IS NULL
                "#,
            )
            .bind(vmid)
            .bind(candidate.id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(IpAddressRecord {
                    reserved: true,
                    vm_id: Some(vmid),
                    ..candidate
                });
            }

            // Lost the race for this row; the next iteration picks another.
            debug!(address = %candidate.address, "Address claimed concurrently, retrying");
        }
    }

    async fn release_ip_addresses(&self, vmid: i64) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ip_addresses
            SET reserved = FALSE, vm_id = NULL
            WHERE vm_id = $1
            "#,
        )
        .bind(vmid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_ip_for_vm(&self, vmid: i64) -> Result<Option<IpAddressRecord>, CoreError> {
        let record = sqlx::query_as::<_, IpAddressRecord>(
            r#"
            SELECT id, address, gateway, netmask, reserved, vm_id
            FROM ip_addresses
            WHERE vm_id = $1
            LIMIT 1
            "#,
        )
        .bind(vmid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_free_ip_addresses(&self) -> Result<Vec<IpAddressRecord>, CoreError> {
        let records = sqlx::query_as::<_, IpAddressRecord>(
            r#"
            SELECT id, address, gateway, netmask, reserved, vm_id
            FROM ip_addresses
            WHERE reserved = FALSE AND vm_id IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn reset_vm_bandwidth(&self, vmid: i64, reset_date: NaiveDate) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE vms
            SET bandwidth_usage_bytes = 0, bandwidth_reset_date = $1
            WHERE vmid = $2
            "#,
        )
        .bind(reset_date)
        .bind(vmid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VmNotFound { vmid });
        }

        Ok(())
    }

    async fn update_vm_bandwidth_usage(
        &self,
        vmid: i64,
        usage_bytes: i64,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE vms SET bandwidth_usage_bytes = $1 WHERE vmid = $2
            "#,
        )
        .bind(usage_bytes)
        .bind(vmid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VmNotFound { vmid });
        }

        Ok(())
    }

    async fn upsert_bandwidth_sample(
        &self,
        vmid: i64,
        day: NaiveDate,
        bytes_in: i64,
        bytes_out: i64,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO bandwidth_samples (vm_id, day, bytes_in, bytes_out, total_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (vm_id, day) DO UPDATE SET
                bytes_in = excluded.bytes_in,
                bytes_out = excluded.bytes_out,
                total_bytes = excluded.total_bytes
            "#,
        )
        .bind(vmid)
        .bind(day)
        .bind(bytes_in)
        .bind(bytes_out)
        .bind(bytes_in + bytes_out)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_bandwidth_samples(
        &self,
        vmid: i64,
    ) -> Result<Vec<BandwidthSampleRecord>, CoreError> {
        let records = sqlx::query_as::<_, BandwidthSampleRecord>(
            r#"
            SELECT id, vm_id, day, bytes_in, bytes_out, total_bytes, created_at
            FROM bandwidth_samples
            WHERE vm_id = $1
            ORDER BY day
            "#,
        )
        .bind(vmid)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn prune_bandwidth_samples(&self, cutoff: NaiveDate) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM bandwidth_samples WHERE day < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            debug!(
                pruned = result.rows_affected(),
                cutoff = %cutoff,
                "Pruned old bandwidth samples"
            );
        }

        Ok(result.rows_affected())
    }
}
