// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the SQLite persistence backend: VM records, the
//! IP inventory claim path, and bandwidth sample bookkeeping.

mod common;

use chrono::{Datelike, NaiveDate, Utc};
use common::TestContext;

use vmforge_core::error::CoreError;
use vmforge_core::persistence::{NewVm, Persistence, month_start};
use vmforge_core::status::VmStatus;

#[tokio::test]
async fn test_create_and_get_vm() {
    let ctx = TestContext::new().await;

    ctx.persistence
        .create_vm(&NewVm {
            vmid: 105,
            name: "web-1".to_string(),
            node: "pve1".to_string(),
            status: VmStatus::Cloning,
            user_id: "user-42".to_string(),
            bandwidth_limit: Some(10),
        })
        .await
        .expect("create vm");

    let vm = ctx
        .persistence
        .get_vm(105)
        .await
        .expect("get vm")
        .expect("vm exists");

    assert_eq!(vm.vmid, 105);
    assert_eq!(vm.name, "web-1");
    assert_eq!(vm.node, "pve1");
    assert_eq!(vm.status, VmStatus::Cloning);
    assert_eq!(vm.user_id, "user-42");
    assert_eq!(vm.bandwidth_limit, Some(10));
    assert_eq!(vm.bandwidth_usage_bytes, 0);
    assert_eq!(vm.config, None);
    assert_eq!(vm.upid, None);
    // A fresh record tracks the current billing month from day one.
    assert_eq!(vm.bandwidth_reset_date, month_start(Utc::now().date_naive()));
    assert_eq!(vm.bandwidth_reset_date.day(), 1);
}

#[tokio::test]
async fn test_duplicate_vmid_rejected() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Running).await;

    let err = ctx
        .persistence
        .create_vm(&NewVm {
            vmid: 105,
            name: "other".to_string(),
            node: "pve2".to_string(),
            status: VmStatus::Cloning,
            user_id: "user-2".to_string(),
            bandwidth_limit: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::VmAlreadyExists { vmid: 105 }));
}

#[tokio::test]
async fn test_get_missing_vm_returns_none() {
    let ctx = TestContext::new().await;
    let vm = ctx.persistence.get_vm(999).await.expect("query ok");
    assert!(vm.is_none());
}

#[tokio::test]
async fn test_list_vms_by_status() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(101, VmStatus::Running).await;
    ctx.seed_vm(102, VmStatus::Stopped).await;
    ctx.seed_vm(103, VmStatus::Running).await;

    let running = ctx
        .persistence
        .list_vms_by_status(VmStatus::Running)
        .await
        .expect("list running");
    let vmids: Vec<i64> = running.iter().map(|vm| vm.vmid).collect();
    assert_eq!(vmids, vec![101, 103]);

    let all = ctx.persistence.list_vms().await.expect("list all");
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_transition_follows_table() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Cloning).await;

    let previous = ctx
        .persistence
        .transition_vm(105, VmStatus::Running)
        .await
        .expect("cloning -> running");
    assert_eq!(previous, VmStatus::Cloning);
    assert_eq!(ctx.status_of(105).await, VmStatus::Running);

    // running -> running is not in the table.
    let err = ctx
        .persistence
        .transition_vm(105, VmStatus::Running)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidStatusTransition {
            vmid: 105,
            from: VmStatus::Running,
            to: VmStatus::Running,
        }
    ));

    // The rejected transition must not have touched the record.
    assert_eq!(ctx.status_of(105).await, VmStatus::Running);
}

#[tokio::test]
async fn test_any_status_transitions_to_error() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Migrating).await;

    ctx.persistence
        .transition_vm(105, VmStatus::Error)
        .await
        .expect("migrating -> error");
    assert_eq!(ctx.status_of(105).await, VmStatus::Error);

    // And error is recoverable through reinstall.
    ctx.persistence
        .transition_vm(105, VmStatus::Reinstalling)
        .await
        .expect("error -> reinstalling");
}

#[tokio::test]
async fn test_transition_missing_vm() {
    let ctx = TestContext::new().await;
    let err = ctx
        .persistence
        .transition_vm(999, VmStatus::Error)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::VmNotFound { vmid: 999 }));
}

#[tokio::test]
async fn test_update_node_upid_and_config() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Running).await;

    ctx.persistence
        .update_vm_node(105, "pve3")
        .await
        .expect("update node");
    ctx.persistence
        .update_vm_upid(105, "UPID:pve3:0001:migrate")
        .await
        .expect("update upid");
    ctx.persistence
        .update_vm_config(105, Some(r#"{"cores":2}"#))
        .await
        .expect("update config");

    let vm = ctx
        .persistence
        .get_vm(105)
        .await
        .expect("get vm")
        .expect("vm exists");
    assert_eq!(vm.node, "pve3");
    assert_eq!(vm.upid.as_deref(), Some("UPID:pve3:0001:migrate"));
    assert_eq!(vm.config.as_deref(), Some(r#"{"cores":2}"#));

    // Config can be cleared again.
    ctx.persistence
        .update_vm_config(105, None)
        .await
        .expect("clear config");
    let vm = ctx
        .persistence
        .get_vm(105)
        .await
        .expect("get vm")
        .expect("vm exists");
    assert_eq!(vm.config, None);
}

#[tokio::test]
async fn test_delete_vm() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Stopped).await;

    ctx.persistence.delete_vm(105).await.expect("delete vm");
    assert!(ctx.persistence.get_vm(105).await.expect("query ok").is_none());

    let err = ctx.persistence.delete_vm(105).await.unwrap_err();
    assert!(matches!(err, CoreError::VmNotFound { vmid: 105 }));
}

#[tokio::test]
async fn test_claim_assigns_address_fields() {
    let ctx = TestContext::new().await;
    ctx.seed_ips(1).await;
    ctx.seed_vm(105, VmStatus::Cloning).await;

    let ip = ctx
        .persistence
        .claim_ip_address(105)
        .await
        .expect("claim ip");
    assert_eq!(ip.address, "10.0.0.10");
    assert_eq!(ip.gateway, "10.0.0.1");
    assert_eq!(ip.netmask, "24");
    assert!(ip.reserved);
    assert_eq!(ip.vm_id, Some(105));

    let stored = ctx
        .persistence
        .get_ip_for_vm(105)
        .await
        .expect("get ip")
        .expect("ip assigned");
    assert_eq!(stored.address, "10.0.0.10");
    assert!(stored.reserved);
    assert_eq!(ctx.free_ip_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_claims_receive_distinct_addresses() {
    let ctx = TestContext::new().await;
    ctx.seed_ips(8).await;

    // More claimants than connections in the pool, fewer than addresses.
    let claimants: Vec<i64> = (200..206).collect();
    let mut handles = Vec::new();
    for vmid in &claimants {
        let persistence = ctx.persistence.clone();
        let vmid = *vmid;
        handles.push(tokio::spawn(async move {
            persistence.claim_ip_address(vmid).await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let mut addresses = Vec::new();
    for result in results {
        let ip = result.expect("task join").expect("claim should succeed");
        addresses.push(ip.address);
    }

    let mut unique = addresses.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), claimants.len(), "every claimant gets its own address");

    // N - M addresses remain free.
    assert_eq!(ctx.free_ip_count().await, 8 - claimants.len());
}

#[tokio::test]
async fn test_empty_pool_raises_no_free_address() {
    let ctx = TestContext::new().await;

    let err = ctx.persistence.claim_ip_address(105).await.unwrap_err();
    assert!(matches!(err, CoreError::NoFreeAddress));

    // A fully claimed pool behaves the same as an empty one.
    ctx.seed_ips(2).await;
    ctx.persistence.claim_ip_address(201).await.expect("claim 1");
    ctx.persistence.claim_ip_address(202).await.expect("claim 2");

    let err = ctx.persistence.claim_ip_address(203).await.unwrap_err();
    assert!(matches!(err, CoreError::NoFreeAddress));
    assert_eq!(ctx.free_ip_count().await, 0);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let ctx = TestContext::new().await;
    ctx.seed_ips(1).await;
    ctx.persistence.claim_ip_address(105).await.expect("claim");

    let released = ctx
        .persistence
        .release_ip_addresses(105)
        .await
        .expect("release");
    assert_eq!(released, 1);

    let released_again = ctx
        .persistence
        .release_ip_addresses(105)
        .await
        .expect("release again");
    assert_eq!(released_again, 0);

    // The address is claimable again after release.
    let ip = ctx
        .persistence
        .claim_ip_address(106)
        .await
        .expect("reclaim");
    assert_eq!(ip.address, "10.0.0.10");
    assert_eq!(ip.vm_id, Some(106));
}

#[tokio::test]
async fn test_bandwidth_sample_upsert_replaces() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Running).await;
    let day = NaiveDate::from_ymd_opt(2025, 8, 21).expect("valid date");

    ctx.persistence
        .upsert_bandwidth_sample(105, day, 100, 200)
        .await
        .expect("first upsert");
    ctx.persistence
        .upsert_bandwidth_sample(105, day, 150, 250)
        .await
        .expect("second upsert");

    let samples = ctx
        .persistence
        .list_bandwidth_samples(105)
        .await
        .expect("list samples");
    assert_eq!(samples.len(), 1, "one row per VM per day");
    assert_eq!(samples[0].day, day);
    assert_eq!(samples[0].bytes_in, 150);
    assert_eq!(samples[0].bytes_out, 250);
    assert_eq!(samples[0].total_bytes, 400);
}

#[tokio::test]
async fn test_bandwidth_samples_are_per_vm() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Running).await;
    ctx.seed_vm(106, VmStatus::Running).await;
    let day = NaiveDate::from_ymd_opt(2025, 8, 21).expect("valid date");

    ctx.persistence
        .upsert_bandwidth_sample(105, day, 10, 20)
        .await
        .expect("vm 105 sample");
    ctx.persistence
        .upsert_bandwidth_sample(106, day, 30, 40)
        .await
        .expect("vm 106 sample");

    let for_105 = ctx
        .persistence
        .list_bandwidth_samples(105)
        .await
        .expect("list 105");
    assert_eq!(for_105.len(), 1);
    assert_eq!(for_105[0].total_bytes, 30);

    let for_106 = ctx
        .persistence
        .list_bandwidth_samples(106)
        .await
        .expect("list 106");
    assert_eq!(for_106.len(), 1);
    assert_eq!(for_106[0].total_bytes, 70);
}

#[tokio::test]
async fn test_prune_removes_only_rows_older_than_cutoff() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Running).await;

    let old = NaiveDate::from_ymd_opt(2025, 5, 10).expect("valid date");
    let boundary = NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date");
    let recent = NaiveDate::from_ymd_opt(2025, 8, 10).expect("valid date");

    for day in [old, boundary, recent] {
        ctx.persistence
            .upsert_bandwidth_sample(105, day, 1, 1)
            .await
            .expect("insert sample");
    }

    let pruned = ctx
        .persistence
        .prune_bandwidth_samples(boundary)
        .await
        .expect("prune");
    assert_eq!(pruned, 1, "only the strictly older row goes");

    let remaining: Vec<NaiveDate> = ctx
        .persistence
        .list_bandwidth_samples(105)
        .await
        .expect("list samples")
        .iter()
        .map(|s| s.day)
        .collect();
    assert_eq!(remaining, vec![boundary, recent]);
}

#[tokio::test]
async fn test_bandwidth_reset_and_usage_update() {
    let ctx = TestContext::new().await;
    ctx.seed_vm(105, VmStatus::Running).await;

    ctx.persistence
        .update_vm_bandwidth_usage(105, 5_000_000)
        .await
        .expect("set usage");
    let vm = ctx
        .persistence
        .get_vm(105)
        .await
        .expect("get vm")
        .expect("vm exists");
    assert_eq!(vm.bandwidth_usage_bytes, 5_000_000);

    // Usage is replaced, not accumulated.
    ctx.persistence
        .update_vm_bandwidth_usage(105, 3_000_000)
        .await
        .expect("replace usage");
    let vm = ctx
        .persistence
        .get_vm(105)
        .await
        .expect("get vm")
        .expect("vm exists");
    assert_eq!(vm.bandwidth_usage_bytes, 3_000_000);

    let new_month = NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date");
    ctx.persistence
        .reset_vm_bandwidth(105, new_month)
        .await
        .expect("reset");
    let vm = ctx
        .persistence
        .get_vm(105)
        .await
        .expect("get vm")
        .expect("vm exists");
    assert_eq!(vm.bandwidth_usage_bytes, 0);
    assert_eq!(vm.bandwidth_reset_date, new_month);
}
