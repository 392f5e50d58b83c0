//! In-process remote backend.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{RemoteResult, RemoteStore, ServerState};
use crate::error::Result;
use crate::model::{Assignee, DependencyType, NewTask, Subtask, Task, TaskPatch};

#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<ServerState>,
}

impl MemoryRemote {
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(ServerState::new(id_prefix)),
        }
    }

    pub fn with_tasks(id_prefix: impl Into<String>, tasks: Vec<Task>) -> Result<Self> {
        Ok(Self {
            state: Mutex::new(ServerState::with_tasks(id_prefix, tasks)?),
        })
    }

    /// Canonical copy of a task as the server holds it.
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.with_state(|state| Ok(state.get(task_id))).ok().flatten()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.with_state(|state| Ok(state.tasks())).unwrap_or_default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ServerState) -> Result<T>) -> RemoteResult<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state).map_err(Into::into)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list_tasks(&self) -> RemoteResult<Vec<Task>> {
        self.with_state(|state| Ok(state.tasks()))
    }

    async fn create_task(&self, fields: &NewTask) -> RemoteResult<Task> {
        self.with_state(|state| state.create_task(fields))
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> RemoteResult<Task> {
        self.with_state(|state| state.update_task(task_id, patch))
    }

    async fn delete_task(&self, task_id: &str) -> RemoteResult<()> {
        self.with_state(|state| state.delete_task(task_id))
    }

    async fn add_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
        kind: DependencyType,
    ) -> RemoteResult<()> {
        self.with_state(|state| state.add_dependency(task_id, dependency_task_id, kind))
    }

    async fn remove_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
    ) -> RemoteResult<()> {
        self.with_state(|state| state.remove_dependency(task_id, dependency_task_id))
    }

    async fn add_subtask(&self, parent_id: &str, title: &str) -> RemoteResult<Subtask> {
        self.with_state(|state| state.add_subtask(parent_id, title))
    }

    async fn toggle_subtask_completion(
        &self,
        subtask_id: &str,
        completed: bool,
    ) -> RemoteResult<()> {
        self.with_state(|state| state.toggle_subtask_completion(subtask_id, completed))
    }

    async fn delete_subtask(&self, subtask_id: &str) -> RemoteResult<()> {
        self.with_state(|state| state.delete_subtask(subtask_id))
    }

    async fn add_assignee(&self, task_id: &str, assignee: &Assignee) -> RemoteResult<()> {
        self.with_state(|state| state.add_assignee(task_id, assignee))
    }

    async fn remove_assignee(&self, task_id: &str, user_id: &str) -> RemoteResult<()> {
        self.with_state(|state| state.remove_assignee(task_id, user_id))
    }
}
