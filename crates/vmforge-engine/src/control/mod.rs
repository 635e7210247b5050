// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control plane module - cluster driving backends.

pub mod mock;
pub mod proxmox;
mod traits;

pub use mock::MockControlPlane;
pub use traits::*;
