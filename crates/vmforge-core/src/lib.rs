// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! VMForge Core - VM Fleet State Layer
//!
//! This crate holds the durable state the orchestration engine works against:
//! per-VM lifecycle records, the shared IP address inventory, and bandwidth
//! usage history. Everything is persisted through one [`persistence::Persistence`]
//! trait with SQLite and PostgreSQL backends.
//!
//! The remote hypervisor cluster is the system of record for what actually
//! runs; this crate is the system of record for what *should* run, who owns
//! it, and which workflow is currently driving it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      vmforge-engine                          │
//! │        (Workflows, Task Poller, Workers, Progress)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     vmforge-core                             │
//! │                     (This Crate)                             │
//! │      VM Records · IP Inventory · Bandwidth Samples           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!            ┌────────────────────────────────────┐
//!            │       PostgreSQL / SQLite          │
//!            │         (Durable Storage)          │
//!            └────────────────────────────────────┘
//! ```
//!
//! # VM Status State Machine
//!
//! ```text
//!   clone path                create path
//!  ┌──────────┐              ┌──────────┐
//!  │ cloning  │              │ creating │
//!  └────┬─────┘              └────┬─────┘
//!       │                         │
//!       ▼                         ▼
//!  ┌─────────┐  stop/pause   ┌─────────┐
//!  │ running │──────────────►│ stopped │
//!  └─┬─────┬─┘   (stopping)  └─┬─────┬─┘
//!    │     ▲                   │     │
//!    │     └───────────────────┘     │ convert
//!    │        start (starting)       ▼
//!    │                          ┌──────────┐
//!    ├──► migrating ──► running │ template │
//!    └──► reinstalling ► running└──────────┘
//!
//!  any status ──► error ──► starting | stopping | reinstalling
//! ```
//!
//! Every transition is checked against [`status::VmStatus::can_transition`];
//! illegal moves are rejected with
//! [`error::CoreError::InvalidStatusTransition`] instead of written.
//!
//! # Shared Resources
//!
//! | Resource | Contention | Guard |
//! |----------|-----------|-------|
//! | IP addresses | Concurrent provisioning workflows | Conditional claim update, one winner per row |
//! | VM status | Workflow vs. concurrent writers | Read-check-update guarded by current status |
//! | Bandwidth counters | Daily accounting runs | Upsert keyed by (VM, day), replace not accumulate |
//!
//! # Modules
//!
//! - [`error`]: Error types with stable error codes
//! - [`migrations`]: Embedded SQLite and PostgreSQL migrations
//! - [`persistence`]: Records, the persistence trait, and both backends
//! - [`status`]: The VM lifecycle status type and its transition table

#![deny(missing_docs)]

/// Error types for state-layer operations with stable error codes.
pub mod error;

/// Embedded database migrations for both supported backends.
pub mod migrations;

/// Records, the persistence trait, and the SQLite/PostgreSQL backends.
pub mod persistence;

/// VM lifecycle status type and transition table.
pub mod status;

pub use error::{CoreError, Result};
pub use persistence::{
    BandwidthSampleRecord, IpAddressRecord, NewVm, Persistence, PostgresPersistence,
    SqlitePersistence, VmRecord,
};
pub use status::VmStatus;
