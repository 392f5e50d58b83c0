//! Outcome events for external integrations.
//!
//! Every coordinator mutation ends in exactly one [`OutcomeEvent`]. Events
//! are fanned out on a broadcast channel and can be written as JSON lines to
//! stdout or a file.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const EVENT_SCHEMA_VERSION: &str = "taskflow.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// Coordinator operation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateTask,
    UpdateTask,
    DeleteTask,
    Transition,
    ToggleComplete,
    AddDependency,
    RemoveDependency,
    AddSubtask,
    ToggleSubtask,
    DeleteSubtask,
    AddAssignee,
    RemoveAssignee,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateTask => "create_task",
            Operation::UpdateTask => "update_task",
            Operation::DeleteTask => "delete_task",
            Operation::Transition => "transition",
            Operation::ToggleComplete => "toggle_complete",
            Operation::AddDependency => "add_dependency",
            Operation::RemoveDependency => "remove_dependency",
            Operation::AddSubtask => "add_subtask",
            Operation::ToggleSubtask => "toggle_subtask",
            Operation::DeleteSubtask => "delete_subtask",
            Operation::AddAssignee => "add_assignee",
            Operation::RemoveAssignee => "remove_assignee",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Result of one coordinator mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub schema_version: String,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub task_id: String,
    pub outcome: Outcome,
    /// Error kind tag on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OutcomeEvent {
    fn new(operation: Operation, task_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION.to_string(),
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            task_id: task_id.into(),
            outcome,
            kind: None,
            message: None,
        }
    }

    pub fn success(operation: Operation, task_id: impl Into<String>) -> Self {
        Self::new(operation, task_id, Outcome::Success)
    }

    pub fn failure(operation: Operation, task_id: impl Into<String>, err: &Error) -> Self {
        Self {
            kind: Some(err.kind().to_string()),
            message: Some(err.to_string()),
            ..Self::new(operation, task_id, Outcome::Failure)
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &OutcomeEvent) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn destination_parse() {
        assert_eq!(EventDestination::parse(None), None);
        assert_eq!(EventDestination::parse(Some("  ")), None);
        assert_eq!(
            EventDestination::parse(Some("-")),
            Some(EventDestination::Stdout)
        );
        assert_eq!(
            EventDestination::parse(Some("out/events.jsonl")),
            Some(EventDestination::File(PathBuf::from("out/events.jsonl")))
        );
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let err = Error::RemotePersist("timed out".to_string());
        let event = OutcomeEvent::failure(Operation::ToggleComplete, "tf-1", &err);
        assert!(!event.is_success());
        assert_eq!(event.kind.as_deref(), Some("remote_persist"));
        assert!(event.message.as_deref().unwrap_or_default().contains("timed out"));

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["operation"], "toggle_complete");
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["task_id"], "tf-1");
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("events.jsonl");
        {
            let mut sink = EventSink::file(&path).expect("sink");
            sink.emit(&OutcomeEvent::success(Operation::CreateTask, "tf-1"))
                .expect("emit");
            sink.emit(&OutcomeEvent::success(Operation::DeleteTask, "tf-1"))
                .expect("emit");
        }
        let content = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: OutcomeEvent = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(first.operation, Operation::CreateTask);
        assert!(first.is_success());
    }
}
