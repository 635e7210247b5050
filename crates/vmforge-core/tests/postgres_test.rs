// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Smoke test for the PostgreSQL backend. Runs only when TEST_DATABASE_URL
//! points at a disposable database.

mod common;

use sqlx::postgres::PgPoolOptions;

use vmforge_core::error::CoreError;
use vmforge_core::migrations;
use vmforge_core::persistence::{NewVm, Persistence, PostgresPersistence};
use vmforge_core::status::VmStatus;

#[tokio::test]
async fn test_postgres_round_trip() {
    skip_if_no_db!();

    let database_url = std::env::var("TEST_DATABASE_URL").expect("checked above");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("connect to postgres");
    migrations::run_postgres(&pool).await.expect("run migrations");

    // Isolate from earlier runs sharing the database.
    sqlx::query("DELETE FROM bandwidth_samples")
        .execute(&pool)
        .await
        .expect("clean samples");
    sqlx::query("DELETE FROM ip_addresses")
        .execute(&pool)
        .await
        .expect("clean ips");
    sqlx::query("DELETE FROM vms")
        .execute(&pool)
        .await
        .expect("clean vms");

    let persistence = PostgresPersistence::new(pool);

    persistence
        .create_vm(&NewVm {
            vmid: 9105,
            name: "pg-smoke".to_string(),
            node: "pve1".to_string(),
            status: VmStatus::Cloning,
            user_id: "user-pg".to_string(),
            bandwidth_limit: Some(5),
        })
        .await
        .expect("create vm");

    persistence
        .add_ip_address("192.0.2.10", "192.0.2.1", "24")
        .await
        .expect("seed ip");

    let ip = persistence.claim_ip_address(9105).await.expect("claim ip");
    assert_eq!(ip.address, "192.0.2.10");
    assert_eq!(ip.vm_id, Some(9105));

    let err = persistence.claim_ip_address(9106).await.unwrap_err();
    assert!(matches!(err, CoreError::NoFreeAddress));

    let previous = persistence
        .transition_vm(9105, VmStatus::Running)
        .await
        .expect("cloning -> running");
    assert_eq!(previous, VmStatus::Cloning);

    let released = persistence
        .release_ip_addresses(9105)
        .await
        .expect("release ip");
    assert_eq!(released, 1);

    persistence.delete_vm(9105).await.expect("delete vm");
}
