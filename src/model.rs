//! Task data model.
//!
//! A [`Task`] is assembled by the store from its core [`TaskRecord`] plus the
//! per-task components (subtasks, dependency edges, assignees). Related tasks
//! are always referenced by id, never by value.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// Opaque task identifier.
pub type TaskId = String;

/// Prefix of ids handed out before the remote store confirms a create.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Generate a temporary id for an optimistic insert.
pub fn temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Ulid::new().to_string().to_ascii_lowercase())
}

/// Generate a server-style id (`<prefix>-<ulid>`).
pub fn server_id(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new().to_string().to_ascii_lowercase())
}

/// Whether an id was generated locally and not yet confirmed.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    ToDo,
    InProgress,
    InReview,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::ToDo,
        TaskStatus::InProgress,
        TaskStatus::InReview,
        TaskStatus::Completed,
    ];

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "to-do",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::InReview => "in-review",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "to-do" | "todo" => Ok(TaskStatus::ToDo),
            "in-progress" => Ok(TaskStatus::InProgress),
            "in-review" => Ok(TaskStatus::InReview),
            "completed" | "done" => Ok(TaskStatus::Completed),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid status '{}'. Expected: to-do, in-progress, in-review, completed",
                s
            ))),
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid priority '{}'. Expected: low, medium, high",
                s
            ))),
        }
    }
}

// =============================================================================
// Relations
// =============================================================================

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Blocks,
    BlockedBy,
    Related,
}

impl DependencyType {
    /// Blocking edges take part in cycle checks and readiness.
    pub fn is_blocking(&self) -> bool {
        matches!(self, DependencyType::Blocks | DependencyType::BlockedBy)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyType::Blocks => write!(f, "blocks"),
            DependencyType::BlockedBy => write!(f, "blocked-by"),
            DependencyType::Related => write!(f, "related"),
        }
    }
}

impl FromStr for DependencyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "blocks" => Ok(DependencyType::Blocks),
            "blocked-by" => Ok(DependencyType::BlockedBy),
            "related" => Ok(DependencyType::Related),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid dependency type '{}'. Expected: blocks, blocked-by, related",
                s
            ))),
        }
    }
}

/// Outgoing edge from the owning task to `task_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub kind: DependencyType,
}

impl Dependency {
    pub fn new(task_id: impl Into<TaskId>, kind: DependencyType) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignee {
    pub user_id: String,
    pub name: String,
}

impl Assignee {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// Task
// =============================================================================

/// Core scalar fields of a task, without its owned collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fully assembled task as handed out by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub record: TaskRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<Assignee>,
}

impl Task {
    pub fn new(record: TaskRecord) -> Self {
        Self {
            record,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            assignees: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn status(&self) -> TaskStatus {
        self.record.status
    }

    pub fn is_completed(&self) -> bool {
        self.record.completed
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.record.parent_id.as_deref()
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title, "task title")
    }

    /// Build the record for a new task. Status defaults are resolved by the caller.
    pub fn into_record(
        self,
        id: TaskId,
        default_status: TaskStatus,
        default_priority: Priority,
        now: DateTime<Utc>,
    ) -> TaskRecord {
        let status = self.status.unwrap_or(default_status);
        TaskRecord {
            id,
            title: self.title.trim().to_string(),
            description: normalize_description(self.description),
            status,
            completed: status.is_completed(),
            priority: self.priority.unwrap_or(default_priority),
            due_date: self.due_date,
            parent_id: self.parent_id,
            completed_at: status.is_completed().then_some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a task's scalar fields.
///
/// `description` and `due_date` use a nested option: `Some(None)` clears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title, "task title")?;
        }
        Ok(())
    }

    /// Apply the non-status fields. Status goes through the status engine.
    pub fn apply_fields(&self, record: &mut TaskRecord) {
        if let Some(title) = &self.title {
            record.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            record.description = normalize_description(description.clone());
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            record.due_date = due_date;
        }
    }
}

/// Reject empty or whitespace-only titles.
pub fn validate_title(title: &str, what: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation(format!("{what} cannot be empty")));
    }
    Ok(())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parse a due date given as RFC 3339 or a plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        Error::InvalidArgument(format!(
            "invalid due date '{raw}' (expected YYYY-MM-DD or RFC 3339)"
        ))
    })?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidArgument(format!("invalid due date '{raw}'")))
}
