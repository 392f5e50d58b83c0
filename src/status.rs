//! Task lifecycle status machine.
//!
//! States: `to-do`, `in-progress`, `in-review`, `completed`. Every state can
//! reach every other one, including reopening a completed task; there is no
//! terminal state. The `completed` flag and the completion timestamp are
//! derived here and nowhere else.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{TaskRecord, TaskStatus};

/// Outcome of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    pub fn completed(&self) -> bool {
        !self.from.is_completed() && self.to.is_completed()
    }

    pub fn reopened(&self) -> bool {
        self.from.is_completed() && !self.to.is_completed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEngine {
    reopen_status: TaskStatus,
}

impl Default for StatusEngine {
    fn default() -> Self {
        Self {
            reopen_status: TaskStatus::InProgress,
        }
    }
}

impl StatusEngine {
    /// Engine whose `toggle_complete` reopens into `reopen_status`.
    pub fn new(reopen_status: TaskStatus) -> Result<Self> {
        if reopen_status.is_completed() {
            return Err(Error::InvalidConfig(
                "reopen status cannot be 'completed'".to_string(),
            ));
        }
        Ok(Self { reopen_status })
    }

    pub fn reopen_status(&self) -> TaskStatus {
        self.reopen_status
    }

    /// Transition table over the closed state set. Every pair is allowed.
    pub fn is_allowed(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (from, to),
            (ToDo | InProgress | InReview | Completed, ToDo | InProgress | InReview | Completed)
        )
    }

    /// Move a task to `to`, keeping `completed` and `completed_at` in step.
    ///
    /// Transitioning into the current status is a no-op, so a repeated
    /// completion does not bump the completion timestamp.
    pub fn transition(
        &self,
        record: &mut TaskRecord,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let from = record.status;
        if !Self::is_allowed(from, to) {
            return Err(Error::Validation(format!(
                "transition {from} -> {to} is not allowed"
            )));
        }

        let change = StatusChange { from, to };
        if !change.changed() {
            record.completed = to.is_completed();
            return Ok(change);
        }

        record.status = to;
        record.completed = to.is_completed();
        if change.completed() {
            record.completed_at = Some(at);
        } else if change.reopened() {
            record.completed_at = None;
        }
        Ok(change)
    }

    /// The status `toggle_complete` would move a task in `current` to.
    pub fn toggle_target(&self, current: TaskStatus) -> TaskStatus {
        if current.is_completed() {
            self.reopen_status
        } else {
            TaskStatus::Completed
        }
    }

    /// Complete an open task, or reopen a completed one.
    pub fn toggle_complete(
        &self,
        record: &mut TaskRecord,
        at: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let target = self.toggle_target(record.status);
        self.transition(record, target, at)
    }
}
