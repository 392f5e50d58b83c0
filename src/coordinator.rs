//! Optimistic mutation coordinator.
//!
//! Every write goes through the same protocol:
//!
//! 1. reject the call if an operation of the same class is in flight for
//!    the same task
//! 2. snapshot the affected tasks
//! 3. apply the change to the local store
//! 4. persist it through the [`RemoteStore`], bounded by a timeout
//! 5. on success merge the server's canonical fields, on failure restore
//!    the snapshot and report [`Error::RemotePersist`]
//! 6. release the in-flight marker, whatever happened
//!
//! Each call ends with one [`OutcomeEvent`] on the broadcast channel.
//!
//! In-flight markers are keyed by `(task, class)`. Operations of different
//! classes on the same task may race; the last remote response wins, and a
//! late rollback can overwrite a newer optimistic change.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Operation, OutcomeEvent};
use crate::model::{
    temp_id, Assignee, DependencyType, NewTask, Priority, Subtask, Task, TaskId, TaskPatch,
    TaskStatus,
};
use crate::remote::{RemoteResult, RemoteStore};
use crate::status::StatusEngine;
use crate::store::{Removal, SharedStore, TaskStore};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Operations tracked independently per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Add,
    Remove,
    StatusUpdate,
}

impl OperationClass {
    pub fn of(operation: Operation) -> Self {
        match operation {
            Operation::CreateTask
            | Operation::AddDependency
            | Operation::AddSubtask
            | Operation::AddAssignee => OperationClass::Add,
            Operation::DeleteTask
            | Operation::RemoveDependency
            | Operation::DeleteSubtask
            | Operation::RemoveAssignee => OperationClass::Remove,
            Operation::UpdateTask
            | Operation::Transition
            | Operation::ToggleComplete
            | Operation::ToggleSubtask => OperationClass::StatusUpdate,
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Add => write!(f, "add"),
            OperationClass::Remove => write!(f, "remove"),
            OperationClass::StatusUpdate => write!(f, "status update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub remote_timeout: Duration,
    /// Refuse to complete a task while its blockers are open.
    pub enforce_readiness: bool,
    pub default_status: TaskStatus,
    pub default_priority: Priority,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_millis(crate::config::DEFAULT_REMOTE_TIMEOUT_MS),
            enforce_readiness: false,
            default_status: TaskStatus::ToDo,
            default_priority: Priority::Medium,
        }
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            remote_timeout: Duration::from_millis(config.remote.timeout_ms),
            enforce_readiness: config.tasks.enforce_readiness,
            default_status: config.tasks.default_status,
            default_priority: config.tasks.default_priority,
        }
    }
}

type InFlightKey = (TaskId, OperationClass);

/// Releases an in-flight marker when dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// The only writer of the task store.
#[derive(Clone)]
pub struct MutationCoordinator {
    store: SharedStore,
    remote: Arc<dyn RemoteStore>,
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
    events: broadcast::Sender<OutcomeEvent>,
    options: CoordinatorOptions,
}

impl MutationCoordinator {
    pub fn new(store: TaskStore, remote: Arc<dyn RemoteStore>, options: CoordinatorOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: SharedStore::new(store),
            remote,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            events,
            options,
        }
    }

    /// Coordinator over an empty store configured from `.taskflow.toml`.
    pub fn from_config(config: &Config, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        let engine = StatusEngine::new(config.tasks.reopen_status)?;
        Ok(Self::new(
            TaskStore::new(engine),
            remote,
            CoordinatorOptions::from_config(config),
        ))
    }

    /// Read handle on the store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Outcome events of every subsequent operation.
    pub fn subscribe(&self) -> broadcast::Receiver<OutcomeEvent> {
        self.events.subscribe()
    }

    pub fn is_in_flight(&self, task_id: &str, class: OperationClass) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(task_id.to_string(), class))
    }

    /// Replace the local store with the remote collection.
    pub async fn load(&self) -> Result<usize> {
        let tasks = self.persist("load", "*", self.remote.list_tasks()).await?;
        let count = tasks.len();
        self.store.write(|store| store.replace_all(tasks))?;
        tracing::debug!(count, "hydrated task store");
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    /// Create a task. It is visible at once under a temporary id and
    /// re-keyed to the server id when the remote confirms.
    pub async fn create_task(&self, fields: NewTask) -> Result<Task> {
        let temp = temp_id();
        let result = self.create_inner(&temp, fields).await;
        let task_id = match &result {
            Ok(task) => task.id().to_string(),
            Err(_) => temp,
        };
        self.report(Operation::CreateTask, &task_id, result)
    }

    async fn create_inner(&self, temp: &str, mut fields: NewTask) -> Result<Task> {
        let operation = Operation::CreateTask;
        let _guard = self.begin(operation, temp)?;
        fields.validate()?;
        fields.status = Some(fields.status.unwrap_or(self.options.default_status));
        fields.priority = Some(fields.priority.unwrap_or(self.options.default_priority));

        let record = fields.clone().into_record(
            temp.to_string(),
            self.options.default_status,
            self.options.default_priority,
            Utc::now(),
        );
        self.store.write(|store| store.upsert(Task::new(record)))?;
        tracing::debug!(%operation, task_id = temp, "applied optimistically");

        match self
            .persist(operation, temp, self.remote.create_task(&fields))
            .await
        {
            Ok(server) => {
                let server_id = server.id().to_string();
                self.reconcile(operation, temp, |store| {
                    store.rename(temp, &server_id)?;
                    store.merge_record(&server_id, &server.record)
                });
                self.store.read(|store| {
                    store
                        .get(&server_id)
                        .or_else(|| store.get(temp))
                        .ok_or_else(|| Error::TaskNotFound(server_id.clone()))
                })
            }
            Err(err) => {
                tracing::warn!(%operation, task_id = temp, error = %err, "rolling back");
                self.store.write(|store| store.remove(temp));
                Err(err)
            }
        }
    }

    /// Update scalar fields. A status in the patch goes through the status
    /// engine.
    pub async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        let result = self
            .patch_task(Operation::UpdateTask, task_id, move |_, _| patch)
            .await;
        self.report(Operation::UpdateTask, task_id, result)
    }

    /// Delete a task, its subtask-tasks and every edge pointing at them.
    pub async fn delete_task(&self, task_id: &str) -> Result<Removal> {
        let result = self.delete_inner(task_id).await;
        self.report(Operation::DeleteTask, task_id, result)
    }

    async fn delete_inner(&self, task_id: &str) -> Result<Removal> {
        let operation = Operation::DeleteTask;
        let _guard = self.begin(operation, task_id)?;
        let (snapshot, removal) = self.store.write(|store| {
            let snapshot = store
                .cascade_snapshot(task_id)
                .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
            let removal = store
                .remove(task_id)
                .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
            Ok::<_, Error>((snapshot, removal))
        })?;
        tracing::debug!(
            %operation,
            task_id,
            removed = removal.removed.len(),
            detached = removal.detached.len(),
            "applied optimistically"
        );

        match self
            .persist(operation, task_id, self.remote.delete_task(task_id))
            .await
        {
            Ok(()) => Ok(removal),
            Err(err) => Err(self.rollback(operation, task_id, snapshot, err)),
        }
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    pub async fn transition(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        let result = self
            .patch_task(Operation::Transition, task_id, move |_, _| {
                TaskPatch::status(status)
            })
            .await;
        self.report(Operation::Transition, task_id, result)
    }

    /// Complete an open task or reopen a completed one.
    pub async fn toggle_complete(&self, task_id: &str) -> Result<Task> {
        let result = self
            .patch_task(Operation::ToggleComplete, task_id, |task, engine| {
                TaskPatch::status(engine.toggle_target(task.status()))
            })
            .await;
        self.report(Operation::ToggleComplete, task_id, result)
    }

    async fn patch_task<F>(&self, operation: Operation, task_id: &str, make_patch: F) -> Result<Task>
    where
        F: FnOnce(&Task, &StatusEngine) -> TaskPatch + Send,
    {
        let _guard = self.begin(operation, task_id)?;
        let (snapshot, engine) = self
            .store
            .read(|store| Ok::<_, Error>((store.require(task_id)?, *store.engine())))?;
        let patch = make_patch(&snapshot, &engine);
        patch.validate()?;
        if patch.is_empty() {
            return Err(Error::Validation("no fields to update".to_string()));
        }
        if patch.status.is_some_and(|status| status.is_completed()) && !snapshot.is_completed() {
            self.check_readiness(task_id)?;
        }

        let now = Utc::now();
        let changed = self.store.write(|store| {
            store.apply_patch(task_id, &patch, now)?;
            let changed = store
                .record(task_id)
                .is_some_and(|record| *record != snapshot.record);
            if changed {
                store.touch(task_id, now)?;
            }
            Ok::<_, Error>(changed)
        })?;
        if !changed {
            tracing::debug!(%operation, task_id, "nothing changed; skipping remote");
            return Ok(snapshot);
        }
        tracing::debug!(%operation, task_id, "applied optimistically");

        match self
            .persist(operation, task_id, self.remote.update_task(task_id, &patch))
            .await
        {
            Ok(server) => {
                self.reconcile(operation, task_id, |store| {
                    store.merge_record(task_id, &server.record)
                });
                self.store.read(|store| store.require(task_id))
            }
            Err(err) => Err(self.rollback(operation, task_id, vec![snapshot], err)),
        }
    }

    fn check_readiness(&self, task_id: &str) -> Result<()> {
        if !self.options.enforce_readiness {
            return Ok(());
        }
        let blockers = self.store.unsatisfied_dependencies(task_id);
        if blockers.is_empty() {
            Ok(())
        } else {
            Err(Error::DependenciesIncomplete {
                task_id: task_id.to_string(),
                blockers,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Dependencies
    // -------------------------------------------------------------------------

    /// Add an edge `task_id -> dependency_task_id`.
    pub async fn add_dependency(
        &self,
        task_id: &str,
        dependency_task_id: &str,
        kind: DependencyType,
    ) -> Result<()> {
        let operation = Operation::AddDependency;
        let result = self
            .apply_and_persist(
                operation,
                task_id,
                |store| store.add_dependency(task_id, dependency_task_id, kind),
                |remote| remote.add_dependency(task_id, dependency_task_id, kind),
            )
            .await;
        self.report(operation, task_id, result)
    }

    /// Remove an edge. Returns `false` without contacting the remote if
    /// there was no such edge.
    pub async fn remove_dependency(&self, task_id: &str, dependency_task_id: &str) -> Result<bool> {
        let operation = Operation::RemoveDependency;
        let result = self
            .remove_and_persist(
                operation,
                task_id,
                |store| store.remove_dependency(task_id, dependency_task_id).then_some(()),
                |remote| remote.remove_dependency(task_id, dependency_task_id),
            )
            .await
            .map(|removed| removed.is_some());
        self.report(operation, task_id, result)
    }

    // -------------------------------------------------------------------------
    // Subtasks
    // -------------------------------------------------------------------------

    /// Add a checklist subtask. The returned subtask carries the server id.
    pub async fn add_subtask(&self, parent_id: &str, title: &str) -> Result<Subtask> {
        let result = self.add_subtask_inner(parent_id, title).await;
        self.report(Operation::AddSubtask, parent_id, result)
    }

    async fn add_subtask_inner(&self, parent_id: &str, title: &str) -> Result<Subtask> {
        let operation = Operation::AddSubtask;
        let _guard = self.begin(operation, parent_id)?;
        let (snapshot, local) = self.store.write(|store| {
            let snapshot = store.require(parent_id)?;
            let local = store.add_subtask(parent_id, title)?;
            Ok::<_, Error>((snapshot, local))
        })?;
        tracing::debug!(%operation, task_id = parent_id, subtask_id = %local.id, "applied optimistically");

        match self
            .persist(operation, parent_id, self.remote.add_subtask(parent_id, &local.title))
            .await
        {
            Ok(server) => {
                self.reconcile(operation, parent_id, |store| {
                    store.replace_subtask(parent_id, &local.id, server.clone())
                });
                Ok(server)
            }
            Err(err) => Err(self.rollback(operation, parent_id, vec![snapshot], err)),
        }
    }

    /// Flip a subtask's completion flag. The parent's status is untouched.
    pub async fn toggle_subtask(&self, parent_id: &str, subtask_id: &str) -> Result<bool> {
        let result = self.toggle_subtask_inner(parent_id, subtask_id).await;
        self.report(Operation::ToggleSubtask, parent_id, result)
    }

    async fn toggle_subtask_inner(&self, parent_id: &str, subtask_id: &str) -> Result<bool> {
        let operation = Operation::ToggleSubtask;
        let _guard = self.begin(operation, parent_id)?;
        let (snapshot, completed) = self.store.write(|store| {
            let snapshot = store.require(parent_id)?;
            let completed = store.toggle_subtask(parent_id, subtask_id)?;
            Ok::<_, Error>((snapshot, completed))
        })?;
        tracing::debug!(%operation, task_id = parent_id, subtask_id, completed, "applied optimistically");

        match self
            .persist(
                operation,
                parent_id,
                self.remote.toggle_subtask_completion(subtask_id, completed),
            )
            .await
        {
            Ok(()) => Ok(completed),
            Err(err) => Err(self.rollback(operation, parent_id, vec![snapshot], err)),
        }
    }

    /// Delete a subtask. Returns `None` without contacting the remote if
    /// the parent has no such subtask.
    pub async fn delete_subtask(&self, parent_id: &str, subtask_id: &str) -> Result<Option<Subtask>> {
        let operation = Operation::DeleteSubtask;
        let result = self
            .remove_and_persist(
                operation,
                parent_id,
                |store| store.delete_subtask(parent_id, subtask_id),
                |remote| remote.delete_subtask(subtask_id),
            )
            .await;
        self.report(operation, parent_id, result)
    }

    // -------------------------------------------------------------------------
    // Assignees
    // -------------------------------------------------------------------------

    /// Assign a user. A user already on the task is reported as
    /// [`Error::DuplicateAssignee`] and nothing changes.
    pub async fn add_assignee(&self, task_id: &str, assignee: Assignee) -> Result<()> {
        let operation = Operation::AddAssignee;
        let result = self
            .apply_and_persist(
                operation,
                task_id,
                |store| store.add_assignee(task_id, assignee.clone()),
                |remote| remote.add_assignee(task_id, &assignee),
            )
            .await;
        self.report(operation, task_id, result)
    }

    /// Unassign a user. Returns `None` without contacting the remote if the
    /// user was not assigned.
    pub async fn remove_assignee(&self, task_id: &str, user_id: &str) -> Result<Option<Assignee>> {
        let operation = Operation::RemoveAssignee;
        let result = self
            .remove_and_persist(
                operation,
                task_id,
                |store| store.remove_assignee(task_id, user_id),
                |remote| remote.remove_assignee(task_id, user_id),
            )
            .await;
        self.report(operation, task_id, result)
    }

    // -------------------------------------------------------------------------
    // Protocol
    // -------------------------------------------------------------------------

    fn begin(&self, operation: Operation, task_id: &str) -> Result<InFlightGuard> {
        let class = OperationClass::of(operation);
        let key = (task_id.to_string(), class);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return Err(Error::ConcurrentOperation {
                task_id: task_id.to_string(),
                class: class.to_string(),
            });
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// Single-task protocol for mutations that either apply or fail.
    async fn apply_and_persist<'a, A, P, Fut>(
        &'a self,
        operation: Operation,
        task_id: &'a str,
        apply: A,
        call: P,
    ) -> Result<()>
    where
        A: FnOnce(&mut TaskStore) -> Result<()> + Send,
        P: FnOnce(&'a dyn RemoteStore) -> Fut + Send,
        Fut: Future<Output = RemoteResult<()>> + Send + 'a,
    {
        let _guard = self.begin(operation, task_id)?;
        let snapshot = self.store.write(|store| {
            let snapshot = store.require(task_id)?;
            apply(store)?;
            Ok::<_, Error>(snapshot)
        })?;
        tracing::debug!(%operation, task_id, "applied optimistically");

        match self
            .persist(operation, task_id, call(self.remote.as_ref()))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => Err(self.rollback(operation, task_id, vec![snapshot], err)),
        }
    }

    /// Single-task protocol for removals. A removal that finds nothing to
    /// remove locally is a no-op and skips the remote.
    async fn remove_and_persist<'a, T, A, P, Fut>(
        &'a self,
        operation: Operation,
        task_id: &'a str,
        apply: A,
        call: P,
    ) -> Result<Option<T>>
    where
        T: Send,
        A: FnOnce(&mut TaskStore) -> Option<T> + Send,
        P: FnOnce(&'a dyn RemoteStore) -> Fut + Send,
        Fut: Future<Output = RemoteResult<()>> + Send + 'a,
    {
        let _guard = self.begin(operation, task_id)?;
        let (snapshot, removed) = self.store.write(|store| {
            let snapshot = store.require(task_id)?;
            let removed = apply(store);
            Ok::<_, Error>((snapshot, removed))
        })?;
        if removed.is_none() {
            tracing::debug!(%operation, task_id, "nothing to remove; skipping remote");
            return Ok(None);
        }
        tracing::debug!(%operation, task_id, "applied optimistically");

        match self
            .persist(operation, task_id, call(self.remote.as_ref()))
            .await
        {
            Ok(()) => Ok(removed),
            Err(err) => Err(self.rollback(operation, task_id, vec![snapshot], err)),
        }
    }

    /// Await a remote call, bounded by the configured timeout.
    async fn persist<T>(
        &self,
        operation: impl fmt::Display,
        task_id: &str,
        call: impl Future<Output = RemoteResult<T>>,
    ) -> Result<T> {
        let timeout = self.options.remote_timeout;
        tracing::debug!(%operation, task_id, "persisting to remote");
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Error::RemotePersist(err.to_string())),
            Err(_) => Err(Error::RemotePersist(format!(
                "{operation} timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Merge a server response. The remote already accepted the change, so
    /// a local merge failure is logged, not reported.
    fn reconcile(
        &self,
        operation: Operation,
        task_id: &str,
        merge: impl FnOnce(&mut TaskStore) -> Result<()>,
    ) {
        if let Err(err) = self.store.write(merge) {
            tracing::warn!(%operation, task_id, error = %err, "could not merge server response");
        }
    }

    fn rollback(&self, operation: Operation, task_id: &str, snapshot: Vec<Task>, err: Error) -> Error {
        tracing::warn!(%operation, task_id, error = %err, "rolling back");
        if let Err(restore_err) = self.store.write(|store| store.restore(snapshot)) {
            tracing::error!(
                %operation,
                task_id,
                error = %restore_err,
                "rollback could not restore snapshot"
            );
        }
        err
    }

    fn report<T>(&self, operation: Operation, task_id: &str, result: Result<T>) -> Result<T> {
        let event = match &result {
            Ok(_) => OutcomeEvent::success(operation, task_id),
            Err(err) => {
                if err.is_informational() {
                    tracing::info!(%operation, task_id, "{err}");
                } else {
                    tracing::debug!(%operation, task_id, error = %err, "operation failed");
                }
                OutcomeEvent::failure(operation, task_id, err)
            }
        };
        // No receivers is fine.
        let _ = self.events.send(event);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Outcome;
    use crate::model::is_temp_id;
    use crate::remote::MemoryRemote;

    fn coordinator(options: CoordinatorOptions) -> (MutationCoordinator, Arc<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::new("tf"));
        let dyn_remote: Arc<dyn RemoteStore> = remote.clone();
        (
            MutationCoordinator::new(TaskStore::default(), dyn_remote, options),
            remote,
        )
    }

    /// A task the local store knows about but the remote does not, so any
    /// remote call for it fails.
    fn local_only(coordinator: &MutationCoordinator, id: &str) -> Task {
        let task = Task::new(NewTask::new("Local").into_record(
            id.to_string(),
            TaskStatus::ToDo,
            Priority::Medium,
            Utc::now(),
        ));
        coordinator
            .store()
            .write(|store| store.upsert(task.clone()))
            .expect("upsert");
        task
    }

    #[tokio::test]
    async fn create_is_rekeyed_to_server_id() {
        let (coordinator, remote) = coordinator(CoordinatorOptions::default());
        let task = coordinator
            .create_task(NewTask::new("Write docs"))
            .await
            .expect("create");

        assert!(task.id().starts_with("tf-"));
        assert!(remote.task(task.id()).is_some());
        let ids: Vec<String> = coordinator
            .store()
            .list()
            .iter()
            .map(|task| task.id().to_string())
            .collect();
        assert_eq!(ids, vec![task.id().to_string()]);
        assert!(!ids.iter().any(|id| is_temp_id(id)));
    }

    #[tokio::test]
    async fn invalid_create_never_reaches_remote() {
        let (coordinator, remote) = coordinator(CoordinatorOptions::default());
        let mut events = coordinator.subscribe();
        let err = coordinator
            .create_task(NewTask::new("   "))
            .await
            .expect_err("blank title");
        assert!(matches!(err, Error::Validation(_)));
        assert!(remote.tasks().is_empty());
        assert!(coordinator.store().list().is_empty());

        let event = events.try_recv().expect("event");
        assert_eq!(event.outcome, Outcome::Failure);
        assert_eq!(event.kind.as_deref(), Some("validation"));
    }

    #[tokio::test]
    async fn failed_update_restores_snapshot() {
        let (coordinator, _remote) = coordinator(CoordinatorOptions::default());
        let before = local_only(&coordinator, "tf-local");
        let mut events = coordinator.subscribe();

        let err = coordinator
            .toggle_complete("tf-local")
            .await
            .expect_err("remote rejects unknown task");
        assert!(matches!(err, Error::RemotePersist(_)));
        assert_eq!(coordinator.store().get("tf-local"), Some(before));
        assert!(!coordinator.is_in_flight("tf-local", OperationClass::StatusUpdate));

        let event = events.try_recv().expect("event");
        assert_eq!(event.operation, Operation::ToggleComplete);
        assert_eq!(event.kind.as_deref(), Some("remote_persist"));
    }

    #[tokio::test]
    async fn unchanged_status_skips_remote() {
        let (coordinator, _remote) = coordinator(CoordinatorOptions::default());
        let before = local_only(&coordinator, "tf-local");
        let task = coordinator
            .transition("tf-local", TaskStatus::ToDo)
            .await
            .expect("no-op transition");
        assert_eq!(task, before);
    }

    #[tokio::test]
    async fn subtask_takes_server_id() {
        let (coordinator, remote) = coordinator(CoordinatorOptions::default());
        let parent = coordinator
            .create_task(NewTask::new("Parent"))
            .await
            .expect("parent");
        let subtask = coordinator
            .add_subtask(parent.id(), "  step one ")
            .await
            .expect("subtask");

        assert!(subtask.id.starts_with("tf-"));
        assert_eq!(subtask.title, "step one");
        let local = coordinator.store().get(parent.id()).expect("parent");
        assert_eq!(local.subtasks, vec![subtask.clone()]);
        assert_eq!(remote.task(parent.id()).expect("remote").subtasks, vec![subtask]);
    }

    #[tokio::test]
    async fn delete_cascades_on_both_sides() {
        let (coordinator, remote) = coordinator(CoordinatorOptions::default());
        let parent = coordinator
            .create_task(NewTask::new("Parent"))
            .await
            .expect("parent");
        let child = coordinator
            .create_task(NewTask {
                parent_id: Some(parent.id().to_string()),
                ..NewTask::new("Child")
            })
            .await
            .expect("child");

        let removal = coordinator.delete_task(parent.id()).await.expect("delete");
        assert_eq!(removal.removed.len(), 2);
        assert!(coordinator.store().list().is_empty());
        assert!(remote.task(child.id()).is_none());
    }

    #[tokio::test]
    async fn readiness_policy_blocks_completion() {
        let (coordinator, _remote) = coordinator(CoordinatorOptions {
            enforce_readiness: true,
            ..CoordinatorOptions::default()
        });
        let a = coordinator.create_task(NewTask::new("A")).await.expect("a");
        let b = coordinator.create_task(NewTask::new("B")).await.expect("b");
        coordinator
            .add_dependency(a.id(), b.id(), DependencyType::Blocks)
            .await
            .expect("edge");

        let err = coordinator
            .transition(a.id(), TaskStatus::Completed)
            .await
            .expect_err("blocked");
        assert!(matches!(err, Error::DependenciesIncomplete { .. }));
        assert_eq!(
            coordinator.store().get(a.id()).expect("a").status(),
            TaskStatus::ToDo
        );

        coordinator.toggle_complete(b.id()).await.expect("complete b");
        coordinator
            .transition(a.id(), TaskStatus::Completed)
            .await
            .expect("now ready");
    }

    #[test]
    fn in_flight_keys_are_per_class() {
        let (coordinator, _remote) = coordinator(CoordinatorOptions::default());
        let guard = coordinator
            .begin(Operation::RemoveAssignee, "tf-1")
            .expect("first");
        assert!(matches!(
            coordinator.begin(Operation::DeleteTask, "tf-1"),
            Err(Error::ConcurrentOperation { .. })
        ));
        let other_class = coordinator
            .begin(Operation::Transition, "tf-1")
            .expect("different class");
        let other_task = coordinator
            .begin(Operation::RemoveAssignee, "tf-2")
            .expect("different task");
        drop((other_class, other_task));

        drop(guard);
        assert!(!coordinator.is_in_flight("tf-1", OperationClass::Remove));
        assert!(coordinator.begin(Operation::DeleteTask, "tf-1").is_ok());
    }

    #[test]
    fn operation_classes() {
        assert_eq!(OperationClass::of(Operation::CreateTask), OperationClass::Add);
        assert_eq!(OperationClass::of(Operation::DeleteSubtask), OperationClass::Remove);
        assert_eq!(
            OperationClass::of(Operation::ToggleSubtask),
            OperationClass::StatusUpdate
        );
        assert_eq!(OperationClass::StatusUpdate.to_string(), "status update");
    }
}
