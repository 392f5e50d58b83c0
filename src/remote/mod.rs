//! Remote persistence collaborator.
//!
//! The coordinator only ever talks to a [`RemoteStore`]; the backend behind
//! it is interchangeable. Two backends ship with the crate:
//!
//! - [`MemoryRemote`]: in-process, useful for embedding and tests
//! - [`FileRemote`]: a JSON document guarded by an advisory file lock
//!
//! Both enforce the same invariants as the local store, so a request the
//! local store would reject is rejected server-side too.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Assignee, DependencyType, NewTask, Subtask, Task, TaskPatch};

mod file;
mod memory;
mod state;

pub use file::{FileRemote, TaskDocument, TASKS_SCHEMA_VERSION};
pub use memory::MemoryRemote;
pub use state::ServerState;

/// Failure reported by a remote backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RemoteError(pub String);

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<crate::error::Error> for RemoteError {
    fn from(err: crate::error::Error) -> Self {
        Self(err.to_string())
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// CRUD contract of the remote task store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Full collection, used to hydrate the local store.
    async fn list_tasks(&self) -> RemoteResult<Vec<Task>>;

    /// Create a task and return the canonical record with its server id.
    async fn create_task(&self, fields: &NewTask) -> RemoteResult<Task>;

    /// Apply a partial update and return the canonical task.
    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> RemoteResult<Task>;

    async fn delete_task(&self, task_id: &str) -> RemoteResult<()>;

    async fn add_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
        kind: DependencyType,
    ) -> RemoteResult<()>;

    async fn remove_dependency(&self, task_id: &str, dependency_task_id: &str)
        -> RemoteResult<()>;

    /// Create a subtask and return the record with its server id.
    async fn add_subtask(&self, parent_id: &str, title: &str) -> RemoteResult<Subtask>;

    async fn toggle_subtask_completion(
        &self,
        subtask_id: &str,
        completed: bool,
    ) -> RemoteResult<()>;

    async fn delete_subtask(&self, subtask_id: &str) -> RemoteResult<()>;

    async fn add_assignee(&self, task_id: &str, assignee: &Assignee) -> RemoteResult<()>;

    async fn remove_assignee(&self, task_id: &str, user_id: &str) -> RemoteResult<()>;
}
