// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! VMForge Engine - VM Fleet Orchestration
//!
//! This crate drives a Proxmox VE cluster on behalf of the customer panel.
//! It runs lifecycle workflows (provision, power, migrate, reinstall,
//! destroy), polls the long-running tasks those workflows submit, streams
//! progress events back to subscribers, and keeps the fleet accounted
//! through background bandwidth and backup workers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Customer Panel                          │
//! │        (embeds EngineRuntime, subscribes to progress)         │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  vmforge-engine (This Crate)                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────────────┐  │
//! │  │ Lifecycle  │  │    Task    │  │  Background Workers    │  │
//! │  │ Workflows  │  │   Poller   │  │  (bandwidth, backup)   │  │
//! │  └────────────┘  └────────────┘  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!           │                                     │
//!           │ HTTPS, API token                    ▼
//!           ▼                          ┌────────────────────┐
//! ┌────────────────────┐               │    vmforge-core    │
//! │  Proxmox cluster   │               │  (VM records, IP   │
//! │  (nodes, tasks)    │               │   inventory, DB)   │
//! └────────────────────┘               └────────────────────┘
//! ```
//!
//! The cluster is the system of record for what actually runs. The engine
//! records intent and outcome in vmforge-core, so the panel always reads
//! one consistent view even while a workflow is mid-flight.
//!
//! # Lifecycle Workflows
//!
//! | Workflow | Description |
//! |----------|-------------|
//! | `run_clone` | Provision a VM from a template: clone, IP claim, config, disk resize, rate limit, first boot |
//! | `run_create` | Create a VM from raw cluster parameters |
//! | `run_power` | Start, stop, shutdown, resume, or pause a VM |
//! | `run_migrate` | Live-migrate a VM to another node |
//! | `run_reinstall` | Rebuild a VM in place from its saved configuration |
//! | `run_destroy` | Delete a VM and release its IP addresses |
//!
//! Every workflow validates the VM's status transition before touching the
//! cluster, records the task handle it submits, and marks the record
//! `error` when a step fails. Provisioning additionally emits
//! [`progress::ProgressEvent`]s for panel progress bars.
//!
//! # Task Polling
//!
//! Mutating cluster calls return a task handle, not a result. The
//! [`poll`] module waits for those tasks on a fixed cadence (two seconds,
//! bounded at ten minutes by default; migrations and reinstalls get wider
//! bounds) and maps the task's exit status onto engine errors.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `VMFORGE_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `VMFORGE_PROXMOX_HOST` | Yes | - | Cluster API hostname |
//! | `VMFORGE_PROXMOX_TOKEN_ID` | Yes | - | API token id, `user@realm!tokenname` |
//! | `VMFORGE_PROXMOX_TOKEN_SECRET` | Yes | - | API token secret |
//! | `VMFORGE_PROXMOX_INSECURE_TLS` | No | `false` | Accept self-signed cluster certificates |
//! | `VMFORGE_BACKUP_STORAGE` | No | `local` | Storage scheduled backups are written to |
//!
//! # Modules
//!
//! - [`backup_worker`]: Scheduled backups and archive retention
//! - [`bandwidth_worker`]: Fleet bandwidth accounting
//! - [`config`]: Daemon configuration from environment variables
//! - [`control`]: Cluster control plane trait, HTTP client, and mock
//! - [`error`]: Error types for engine operations
//! - [`poll`]: Remote task polling with bounded attempts
//! - [`progress`]: Workflow progress event fan-out
//! - [`runtime`]: Embeddable runtime
//! - [`workflows`]: Lifecycle workflows

#![deny(missing_docs)]

/// Background worker for scheduled VM backups and archive retention.
pub mod backup_worker;

/// Background worker for fleet bandwidth accounting.
pub mod bandwidth_worker;

/// Daemon configuration loaded from environment variables.
pub mod config;

/// Cluster control plane trait, the HTTP API client, and the test mock.
pub mod control;

/// Error types for engine operations.
pub mod error;

/// Polling for long-running cluster tasks.
pub mod poll;

/// Progress event fan-out for provisioning workflows.
pub mod progress;

/// Embeddable runtime for vmforge-engine.
pub mod runtime;

/// Lifecycle workflows that drive the cluster.
pub mod workflows;

pub use config::Config;
pub use error::Error;
