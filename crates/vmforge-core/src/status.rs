// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! VM lifecycle status and the transition table the state layer enforces.
//!
//! Statuses are stored as plain strings in the database but surface as
//! [`VmStatus`] everywhere above the SQL layer, so illegal moves are rejected
//! instead of silently written.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a VM record.
///
/// Transitional phases (`creating`, `cloning`, `starting`, `stopping`,
/// `migrating`, `reinstalling`) mark a workflow in flight; stable phases
/// (`stopped`, `running`, `paused`, `template`) persist between workflows.
/// `error` is terminal until an operator or a reinstall recovers the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    /// Being built from scratch on the cluster.
    Creating,
    /// Being cloned from a template.
    Cloning,
    /// Powered off.
    Stopped,
    /// Power-on in flight.
    Starting,
    /// Powered on.
    Running,
    /// Power-off in flight.
    Stopping,
    /// Moving to another node.
    Migrating,
    /// Being wiped and rebuilt from the saved configuration snapshot.
    Reinstalling,
    /// Suspended by a pause action.
    Paused,
    /// A workflow failed; the record is kept for diagnosis.
    Error,
    /// Converted to a template; no longer a runnable guest.
    Template,
}

impl VmStatus {
    /// The stored string form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Cloning => "cloning",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Migrating => "migrating",
            Self::Reinstalling => "reinstalling",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Template => "template",
        }
    }

    /// Whether a workflow is currently driving this VM.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            Self::Creating
                | Self::Cloning
                | Self::Starting
                | Self::Stopping
                | Self::Migrating
                | Self::Reinstalling
        )
    }

    /// Whether moving from `self` to `to` is a legal lifecycle transition.
    ///
    /// Any status may move to `error`; everything else follows the fixed
    /// table below. Destroy is not a transition: it removes the record.
    ///
    /// ```text
    /// creating ──────────────► stopped
    /// cloning ───────────────► running
    /// stopped ──► starting ──► running
    /// running ──► stopping ──► stopped | paused
    /// paused ───► starting | stopping
    /// running | stopped ─────► migrating ───► running
    /// running | stopped ─────► reinstalling ► running
    /// error ────► starting | stopping | reinstalling
    /// stopped ──► template
    /// ```
    pub fn can_transition(self, to: VmStatus) -> bool {
        use VmStatus::*;

        if to == Error {
            return true;
        }

        matches!(
            (self, to),
            (Creating, Stopped)
                | (Cloning, Running)
                | (Stopped, Starting)
                | (Stopped, Migrating)
                | (Stopped, Reinstalling)
                | (Stopped, Template)
                | (Starting, Running)
                | (Running, Stopping)
                | (Running, Migrating)
                | (Running, Reinstalling)
                | (Stopping, Stopped)
                | (Stopping, Paused)
                | (Paused, Starting)
                | (Paused, Stopping)
                | (Migrating, Running)
                | (Reinstalling, Running)
                | (Error, Starting)
                | (Error, Stopping)
                | (Error, Reinstalling)
        )
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored string does not name a known status.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown vm status '{0}'")]
pub struct StatusParseError(pub String);

impl FromStr for VmStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "cloning" => Ok(Self::Cloning),
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "migrating" => Ok(Self::Migrating),
            "reinstalling" => Ok(Self::Reinstalling),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            "template" => Ok(Self::Template),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

impl TryFrom<String> for VmStatus {
    type Error = StatusParseError;

    fn try_from(value: String) -> Result<Self, StatusParseError> {
        value.parse()
    }
}
