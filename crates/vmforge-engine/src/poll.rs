// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task polling.
//!
//! Cluster commands return immediately with a task handle; the work itself
//! runs as a task on the node. [`await_task`] is the one place that waits
//! for such a task: it reads the task status on a fixed cadence until the
//! task stops, then maps the exit status to success or failure.

use std::time::Duration;

use crate::control::{ControlPlane, TaskRef};
use crate::error::{Error, Result};

/// Poll cadence and bound for awaiting one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between consecutive status reads.
    pub interval: Duration,
    /// Number of status reads before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    /// Two-second cadence, bounded at ten minutes.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 300,
        }
    }
}

impl PollPolicy {
    /// Bound for migrations, which move disks between nodes (about 20 minutes).
    pub fn migrate() -> Self {
        Self {
            max_attempts: 600,
            ..Self::default()
        }
    }

    /// Bound for reinstalls, which destroy and recreate the VM (about 15 minutes).
    pub fn reinstall() -> Self {
        Self {
            max_attempts: 450,
            ..Self::default()
        }
    }
}

/// Await a task until it reaches a terminal state.
///
/// Returns `Ok(())` when the task stopped with an `OK` exit status,
/// [`Error::TaskFailed`] when it stopped with anything else, and
/// [`Error::TaskTimeout`] when `policy.max_attempts` reads saw no terminal
/// state. Dropping the returned future cancels the wait; the remote task
/// keeps running.
pub async fn await_task(
    control: &dyn ControlPlane,
    task: &TaskRef,
    policy: PollPolicy,
) -> Result<()> {
    for attempt in 1..=policy.max_attempts {
        let status = control.read_task_status(task).await?;

        if status.is_terminal() {
            if status.is_success() {
                return Ok(());
            }
            return Err(Error::TaskFailed {
                upid: task.upid.clone(),
                exitstatus: status.exitstatus.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(Error::TaskTimeout {
        upid: task.upid.clone(),
        attempts: policy.max_attempts,
    })
}
