//! File-backed remote store.
//!
//! The whole collection lives in one JSON document:
//!
//! ```text
//! .taskflow/
//!   tasks.json        # TaskDocument (schema, generated_at, tasks)
//!   tasks.json.lock   # advisory lock held for each read-modify-write
//! ```
//!
//! Every call takes the lock, loads the document, applies the change with
//! the same rules as the local store, and writes the document back
//! atomically. Blocking IO runs on tokio's blocking pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteResult, RemoteStore, ServerState};
use crate::error::Result;
use crate::lock::{self, lock_path_for, FileLock};
use crate::model::{Assignee, DependencyType, NewTask, Subtask, Task, TaskPatch};

pub const TASKS_SCHEMA_VERSION: &str = "taskflow.tasks.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDocument {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl TaskDocument {
    pub fn empty() -> Self {
        Self {
            schema_version: TASKS_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRemote {
    path: PathBuf,
    id_prefix: String,
    lock_timeout_ms: u64,
}

impl FileRemote {
    pub fn new(path: impl Into<PathBuf>, id_prefix: impl Into<String>, lock_timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            id_prefix: id_prefix.into(),
            lock_timeout_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the document under the lock, on the blocking pool.
    /// The document is written back only when `persist` is set and `f`
    /// succeeded.
    async fn with_document<T, F>(&self, persist: bool, f: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ServerState) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let id_prefix = self.id_prefix.clone();
        let timeout_ms = self.lock_timeout_ms;

        let joined = tokio::task::spawn_blocking(move || -> Result<T> {
            let lock = FileLock::acquire(lock_path_for(&path), timeout_ms)?;
            tracing::trace!(lock = %lock.path().display(), "acquired task document lock");
            let mut state = load_state(&path, &id_prefix)?;
            let value = f(&mut state)?;
            if persist {
                save_state(&path, &state)?;
            }
            Ok(value)
        })
        .await;

        match joined {
            Ok(result) => result.map_err(RemoteError::from),
            Err(err) => Err(RemoteError::new(format!("file store worker failed: {err}"))),
        }
    }
}

fn load_state(path: &Path, id_prefix: &str) -> Result<ServerState> {
    if !path.exists() {
        return Ok(ServerState::new(id_prefix));
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(ServerState::new(id_prefix));
    }
    let document: TaskDocument = serde_json::from_str(&content)?;
    if document.schema_version != TASKS_SCHEMA_VERSION {
        tracing::warn!(
            path = %path.display(),
            schema = %document.schema_version,
            "unexpected task document schema"
        );
    }
    ServerState::with_tasks(id_prefix, document.tasks)
}

fn save_state(path: &Path, state: &ServerState) -> Result<()> {
    let document = TaskDocument {
        tasks: state.tasks(),
        ..TaskDocument::empty()
    };
    let json = serde_json::to_vec_pretty(&document)?;
    lock::write_atomic(path, &json)?;
    tracing::debug!(path = %path.display(), tasks = document.tasks.len(), "saved task document");
    Ok(())
}

#[async_trait]
impl RemoteStore for FileRemote {
    async fn list_tasks(&self) -> RemoteResult<Vec<Task>> {
        self.with_document(false, |state| Ok(state.tasks())).await
    }

    async fn create_task(&self, fields: &NewTask) -> RemoteResult<Task> {
        let fields = fields.clone();
        self.with_document(true, move |state| state.create_task(&fields))
            .await
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> RemoteResult<Task> {
        let task_id = task_id.to_string();
        let patch = patch.clone();
        self.with_document(true, move |state| state.update_task(&task_id, &patch))
            .await
    }

    async fn delete_task(&self, task_id: &str) -> RemoteResult<()> {
        let task_id = task_id.to_string();
        self.with_document(true, move |state| state.delete_task(&task_id))
            .await
    }

    async fn add_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
        kind: DependencyType,
    ) -> RemoteResult<()> {
        let task_id = task_id.to_string();
        let dependency_task_id = dependency_task_id.to_string();
        self.with_document(true, move |state| {
            state.add_dependency(&task_id, &dependency_task_id, kind)
        })
        .await
    }

    async fn remove_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
    ) -> RemoteResult<()> {
        let task_id = task_id.to_string();
        let dependency_task_id = dependency_task_id.to_string();
        self.with_document(true, move |state| {
            state.remove_dependency(&task_id, &dependency_task_id)
        })
        .await
    }

    async fn add_subtask(&self, parent_id: &str, title: &str) -> RemoteResult<Subtask> {
        let parent_id = parent_id.to_string();
        let title = title.to_string();
        self.with_document(true, move |state| state.add_subtask(&parent_id, &title))
            .await
    }

    async fn toggle_subtask_completion(
        &self,
        subtask_id: &str,
        completed: bool,
    ) -> RemoteResult<()> {
        let subtask_id = subtask_id.to_string();
        self.with_document(true, move |state| {
            state.toggle_subtask_completion(&subtask_id, completed)
        })
        .await
    }

    async fn delete_subtask(&self, subtask_id: &str) -> RemoteResult<()> {
        let subtask_id = subtask_id.to_string();
        self.with_document(true, move |state| state.delete_subtask(&subtask_id))
            .await
    }

    async fn add_assignee(&self, task_id: &str, assignee: &Assignee) -> RemoteResult<()> {
        let task_id = task_id.to_string();
        let assignee = assignee.clone();
        self.with_document(true, move |state| state.add_assignee(&task_id, &assignee))
            .await
    }

    async fn remove_assignee(&self, task_id: &str, user_id: &str) -> RemoteResult<()> {
        let task_id = task_id.to_string();
        let user_id = user_id.to_string();
        self.with_document(true, move |state| state.remove_assignee(&task_id, &user_id))
            .await
    }
}
