#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use taskflow::model::{Assignee, DependencyType, NewTask, Subtask, Task, TaskPatch};
use taskflow::remote::{MemoryRemote, RemoteError, RemoteResult, RemoteStore};
use taskflow::{CoordinatorOptions, MutationCoordinator, TaskStore};

/// Holds one remote call in flight until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the held call has reached the remote.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Remote store with scriptable failures and gates, backed by `MemoryRemote`.
pub struct FlakyRemote {
    inner: MemoryRemote,
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    calls: Mutex<Vec<String>>,
}

impl FlakyRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRemote::new("tf"),
            failing: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Make every call to `method` fail until `recover` is called.
    pub fn fail(&self, method: &str) {
        self.failing.lock().expect("lock").insert(method.to_string());
    }

    pub fn recover(&self, method: &str) {
        self.failing.lock().expect("lock").remove(method);
    }

    /// Hold the next call to `method` until the returned gate is released.
    pub fn hold(&self, method: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .expect("lock")
            .insert(method.to_string(), Arc::clone(&gate));
        gate
    }

    /// Names of the remote methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|call| *call == method).count()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.inner.task(task_id)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.tasks()
    }

    async fn before(&self, method: &str) -> RemoteResult<()> {
        self.calls.lock().expect("lock").push(method.to_string());
        let gate = self.gates.lock().expect("lock").remove(method);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing.lock().expect("lock").contains(method) {
            return Err(RemoteError::new(format!("{method} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn list_tasks(&self) -> RemoteResult<Vec<Task>> {
        self.before("list_tasks").await?;
        self.inner.list_tasks().await
    }

    async fn create_task(&self, fields: &NewTask) -> RemoteResult<Task> {
        self.before("create_task").await?;
        self.inner.create_task(fields).await
    }

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> RemoteResult<Task> {
        self.before("update_task").await?;
        self.inner.update_task(task_id, patch).await
    }

    async fn delete_task(&self, task_id: &str) -> RemoteResult<()> {
        self.before("delete_task").await?;
        self.inner.delete_task(task_id).await
    }

    async fn add_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
        kind: DependencyType,
    ) -> RemoteResult<()> {
        self.before("add_dependency").await?;
        self.inner
            .add_dependency(task_id, dependency_task_id, kind)
            .await
    }

    async fn remove_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
    ) -> RemoteResult<()> {
        self.before("remove_dependency").await?;
        self.inner.remove_dependency(task_id, dependency_task_id).await
    }

    async fn add_subtask(&self, parent_id: &str, title: &str) -> RemoteResult<Subtask> {
        self.before("add_subtask").await?;
        self.inner.add_subtask(parent_id, title).await
    }

    async fn toggle_subtask_completion(
        &self,
        subtask_id: &str,
        completed: bool,
    ) -> RemoteResult<()> {
        self.before("toggle_subtask_completion").await?;
        self.inner
            .toggle_subtask_completion(subtask_id, completed)
            .await
    }

    async fn delete_subtask(&self, subtask_id: &str) -> RemoteResult<()> {
        self.before("delete_subtask").await?;
        self.inner.delete_subtask(subtask_id).await
    }

    async fn add_assignee(&self, task_id: &str, assignee: &Assignee) -> RemoteResult<()> {
        self.before("add_assignee").await?;
        self.inner.add_assignee(task_id, assignee).await
    }

    async fn remove_assignee(&self, task_id: &str, user_id: &str) -> RemoteResult<()> {
        self.before("remove_assignee").await?;
        self.inner.remove_assignee(task_id, user_id).await
    }
}

pub fn coordinator(remote: &Arc<FlakyRemote>) -> MutationCoordinator {
    coordinator_with(remote, CoordinatorOptions::default())
}

pub fn coordinator_with(
    remote: &Arc<FlakyRemote>,
    options: CoordinatorOptions,
) -> MutationCoordinator {
    let remote: Arc<dyn RemoteStore> = remote.clone();
    MutationCoordinator::new(TaskStore::default(), remote, options)
}

/// Create a task through the coordinator and return its server id.
pub async fn create(coordinator: &MutationCoordinator, title: &str) -> String {
    coordinator
        .create_task(NewTask::new(title))
        .await
        .expect("create task")
        .id()
        .to_string()
}
