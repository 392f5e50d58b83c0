//! Error types for taskflow
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, validation, unknown task)
//! - 3: Blocked by policy (cycle, duplicate assignee, operation in flight)
//! - 4: Operation failed (remote persist, IO, serialization)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the taskflow CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const POLICY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for taskflow operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Policy blocks (exit code 3)
    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    #[error("User {user_id} is already assigned to {task_id}")]
    DuplicateAssignee { task_id: String, user_id: String },

    #[error("A {class} operation is already in flight for {task_id}")]
    ConcurrentOperation { task_id: String, class: String },

    #[error("Task {task_id} has incomplete blocking dependencies: {}", .blockers.join(", "))]
    DependenciesIncomplete {
        task_id: String,
        blockers: Vec<String>,
    },

    // Operation failures (exit code 4)
    #[error("Remote persist failed: {0}")]
    RemotePersist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_)
            | Error::TaskNotFound(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_) => exit_codes::USER_ERROR,

            Error::CircularDependency(_)
            | Error::DuplicateAssignee { .. }
            | Error::ConcurrentOperation { .. }
            | Error::DependenciesIncomplete { .. } => exit_codes::POLICY_BLOCKED,

            Error::RemotePersist(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Stable snake_case tag for events and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::TaskNotFound(_) => "task_not_found",
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::CircularDependency(_) => "circular_dependency",
            Error::DuplicateAssignee { .. } => "duplicate_assignee",
            Error::ConcurrentOperation { .. } => "concurrent_operation",
            Error::DependenciesIncomplete { .. } => "dependencies_incomplete",
            Error::RemotePersist(_) => "remote_persist",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::TomlParse(_) | Error::TomlSerialize(_) => "toml",
            Error::LockFailed(_) => "lock_failed",
            Error::OperationFailed(_) => "operation_failed",
        }
    }

    /// Non-fatal errors leave state untouched and are informational only.
    pub fn is_informational(&self) -> bool {
        matches!(self, Error::DuplicateAssignee { .. })
    }

    /// Structured fields for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::DuplicateAssignee { task_id, user_id } => Some(serde_json::json!({
                "task_id": task_id,
                "user_id": user_id,
            })),
            Error::ConcurrentOperation { task_id, class } => Some(serde_json::json!({
                "task_id": task_id,
                "class": class,
            })),
            Error::DependenciesIncomplete { task_id, blockers } => Some(serde_json::json!({
                "task_id": task_id,
                "blockers": blockers,
            })),
            Error::LockFailed(path) => Some(serde_json::json!({
                "path": path.display().to_string(),
            })),
            Error::Validation(message)
            | Error::TaskNotFound(message)
            | Error::InvalidConfig(message)
            | Error::InvalidArgument(message)
            | Error::CircularDependency(message)
            | Error::RemotePersist(message)
            | Error::OperationFailed(message) => Some(serde_json::json!({
                "message": message,
            })),
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => None,
        }
    }
}

/// Result type alias for taskflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            kind: err.kind(),
            details: err.details(),
        }
    }
}
