// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step-level progress reporting for long workflows.
//!
//! Workflows emit one event per step so panels can render a live progress
//! bar. Events fan out over a broadcast channel; anyone can subscribe,
//! and emitting with no subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Outcome of the step an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Step is underway.
    Running,
    /// Workflow finished successfully. Terminal.
    Success,
    /// Workflow stopped on a failed step. Terminal.
    Error,
}

/// One progress event for one VM workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// VM the workflow acts on.
    pub vmid: i64,
    /// Owner the event is addressed to.
    pub user_id: Uuid,
    /// Human-readable step label.
    pub step: String,
    /// Percentage complete, 0 to 100. Never decreases while the workflow
    /// is running; a terminal error event carries 0.
    pub progress: u8,
    /// Step outcome.
    pub status: ProgressStatus,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

/// Broadcast fan-out for progress events.
#[derive(Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProgressChannel {
    /// Create a channel buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Create an emitter bound to one workflow run.
    pub fn for_workflow(&self, vmid: i64, user_id: Uuid) -> WorkflowProgress {
        WorkflowProgress {
            channel: self.clone(),
            vmid,
            user_id,
            last: 0,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.sender.send(event);
    }
}

/// Emitter for one workflow run. Keeps the reported percentage monotonic
/// while the run is underway.
pub struct WorkflowProgress {
    channel: ProgressChannel,
    vmid: i64,
    user_id: Uuid,
    last: u8,
}

impl WorkflowProgress {
    /// Report a step at `progress` percent, clamped so the percentage
    /// never moves backwards.
    pub fn step(&mut self, progress: u8, label: &str) {
        self.emit(progress, label, ProgressStatus::Running);
    }

    /// Report successful completion at 100 percent. Terminal.
    pub fn success(&mut self, label: &str) {
        self.emit(100, label, ProgressStatus::Success);
    }

    /// Report a failed workflow. Terminal; the event always carries
    /// progress 0 regardless of how far the run got.
    pub fn error(&mut self, label: &str) {
        self.last = 0;
        self.channel.emit(ProgressEvent {
            vmid: self.vmid,
            user_id: self.user_id,
            step: label.to_string(),
            progress: 0,
            status: ProgressStatus::Error,
            timestamp: Utc::now(),
        });
    }

    fn emit(&mut self, progress: u8, label: &str, status: ProgressStatus) {
        self.last = self.last.max(progress.min(100));
        self.channel.emit(ProgressEvent {
            vmid: self.vmid,
            user_id: self.user_id,
            step: label.to_string(),
            progress: self.last,
            status,
            timestamp: Utc::now(),
        });
    }
}
