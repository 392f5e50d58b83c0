//! Authoritative in-memory task collection.
//!
//! The store owns each task's core record plus the per-task components
//! (dependency graph, subtask tree, assignee roster) and assembles full
//! [`Task`] values on read. Reads hand out copies; nothing outside the
//! store's own operations can reach its state.
//!
//! # Invariants
//!
//! - blocking edges form a DAG and no task depends on itself
//! - `completed == (status == completed)` for every task
//! - assignees are unique by user id
//! - `parent_id` resolves to an existing top-level task; removing a parent
//!   removes its children, and removing any task removes edges to it

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::model::{
    validate_title, Assignee, DependencyType, Subtask, Task, TaskId, TaskPatch, TaskRecord,
    TaskStatus,
};
use crate::roster::AssigneeRoster;
use crate::status::{StatusChange, StatusEngine};
use crate::subtasks::SubtaskTree;

/// Immutable snapshot of tasks, iterable any number of times.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Arc<[Task]>,
}

impl TaskList {
    fn new(mut tasks: Vec<Task>) -> Self {
        tasks.sort_by(|left, right| {
            left.record
                .created_at
                .cmp(&right.record.created_at)
                .then_with(|| left.record.id.cmp(&right.record.id))
        });
        Self {
            tasks: tasks.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id() == task_id)
    }

    pub fn to_vec(&self) -> Vec<Task> {
        self.tasks.to_vec()
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

/// What a cascading remove took out of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// The removed task first, then its subtask-tasks.
    pub removed: Vec<Task>,
    /// Surviving tasks that lost an edge pointing at a removed task.
    pub detached: Vec<TaskId>,
}

#[derive(Debug)]
pub struct TaskStore {
    records: HashMap<TaskId, TaskRecord>,
    graph: DependencyGraph,
    subtasks: SubtaskTree,
    roster: AssigneeRoster,
    engine: StatusEngine,
    revision: u64,
    changes: watch::Sender<u64>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(StatusEngine::default())
    }
}

impl TaskStore {
    pub fn new(engine: StatusEngine) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            records: HashMap::new(),
            graph: DependencyGraph::new(),
            subtasks: SubtaskTree::new(),
            roster: AssigneeRoster::new(),
            engine,
            revision: 0,
            changes,
        }
    }

    /// Build a store from a full task collection.
    pub fn from_tasks(engine: StatusEngine, tasks: Vec<Task>) -> Result<Self> {
        let mut store = Self::new(engine);
        store.replace_all(tasks)?;
        Ok(store)
    }

    /// Replace the whole collection. Records land before edges so tasks may
    /// reference each other in any order. The staged collection must pass
    /// [`check_invariants`](Self::check_invariants); on error the store is
    /// unchanged.
    pub fn replace_all(&mut self, tasks: Vec<Task>) -> Result<()> {
        let mut staged = Self::new(self.engine);
        for task in &tasks {
            validate_task_shape(task)?;
            let mut record = task.record.clone();
            normalize_record(&mut record);
            if staged.records.insert(record.id.clone(), record).is_some() {
                return Err(Error::Validation(format!("duplicate task id {}", task.id())));
            }
        }
        for task in &tasks {
            staged.check_parent(task.id(), task.parent_id())?;
            staged.check_targets(task)?;
            staged.subtasks.set_list(task.id(), task.subtasks.clone())?;
            staged
                .roster
                .set_assignees(task.id(), task.assignees.clone())?;
        }
        for task in &tasks {
            staged.graph.set_edges(task.id(), task.dependencies.clone())?;
        }
        staged.check_invariants()?;

        self.records = staged.records;
        self.graph = staged.graph;
        self.subtasks = staged.subtasks;
        self.roster = staged.roster;
        self.bump();
        Ok(())
    }

    pub fn engine(&self) -> &StatusEngine {
        &self.engine
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.records.contains_key(task_id)
    }

    pub fn record(&self, task_id: &str) -> Option<&TaskRecord> {
        self.records.get(task_id)
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.records.get(task_id).map(|record| record.status)
    }

    /// Assembled copy of a task.
    pub fn get(&self, task_id: &str) -> Option<Task> {
        let record = self.records.get(task_id)?;
        Some(Task {
            record: record.clone(),
            subtasks: self.subtasks.subtasks(task_id).to_vec(),
            dependencies: self.graph.dependencies(task_id).to_vec(),
            assignees: self.roster.assignees(task_id).to_vec(),
        })
    }

    pub fn require(&self, task_id: &str) -> Result<Task> {
        self.get(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    /// Snapshot of every task, oldest first.
    pub fn list(&self) -> TaskList {
        TaskList::new(self.records.keys().filter_map(|id| self.get(id)).collect())
    }

    /// Subtask-tasks whose `parent_id` is `task_id`.
    pub fn children(&self, task_id: &str) -> TaskList {
        TaskList::new(
            self.child_ids(task_id)
                .iter()
                .filter_map(|id| self.get(id))
                .collect(),
        )
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Receiver that observes the revision bumped by every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Insert or fully replace a task. Validation happens before any state
    /// changes; on error the store is untouched.
    pub fn upsert(&mut self, task: Task) -> Result<()> {
        validate_task_shape(&task)?;
        let id = task.record.id.clone();
        self.check_parent(&id, task.parent_id())?;
        self.check_targets(&task)?;
        if task.parent_id().is_some() && !self.child_ids(&id).is_empty() {
            return Err(Error::Validation(format!(
                "task {id} has subtasks and cannot become a subtask itself"
            )));
        }

        self.graph.set_edges(&id, task.dependencies)?;
        self.subtasks.set_list(&id, task.subtasks)?;
        self.roster.set_assignees(&id, task.assignees)?;
        let mut record = task.record;
        normalize_record(&mut record);
        self.records.insert(id, record);
        self.bump();
        Ok(())
    }

    /// Copy of what `remove(task_id)` would take out, plus every surviving
    /// task that holds an edge into it, in an order `upsert` can replay.
    pub fn cascade_snapshot(&self, task_id: &str) -> Option<Vec<Task>> {
        let root = self.get(task_id)?;
        let mut ids: Vec<TaskId> = vec![task_id.to_string()];
        ids.extend(self.child_ids(task_id));
        let removed: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut dependents: Vec<TaskId> = ids
            .iter()
            .flat_map(|id| self.graph.dependents(id))
            .filter(|id| !removed.contains(id.as_str()))
            .collect();
        dependents.sort();
        dependents.dedup();

        let mut snapshot = vec![root];
        snapshot.extend(ids.iter().skip(1).filter_map(|id| self.get(id)));
        snapshot.extend(dependents.iter().filter_map(|id| self.get(id)));
        Some(snapshot)
    }

    /// Remove a task, cascading to its subtask-tasks and to every edge that
    /// references any removed task.
    pub fn remove(&mut self, task_id: &str) -> Option<Removal> {
        let root = self.get(task_id)?;
        let mut ids = vec![task_id.to_string()];
        ids.extend(self.child_ids(task_id));

        let mut removed = vec![root];
        removed.extend(ids.iter().skip(1).filter_map(|id| self.get(id)));

        let mut detached = Vec::new();
        for id in &ids {
            self.records.remove(id);
            self.subtasks.remove_parent(id);
            self.roster.remove_task(id);
            detached.extend(self.graph.remove_node(id));
        }
        detached.retain(|id| !ids.contains(id));
        detached.sort();
        detached.dedup();

        self.bump();
        Some(Removal { removed, detached })
    }

    /// Re-key a task (temporary id to server id) along with every reference.
    pub fn rename(&mut self, old_id: &str, new_id: &str) -> Result<()> {
        if old_id == new_id {
            return Ok(());
        }
        if self.records.contains_key(new_id) {
            return Err(Error::Validation(format!("task id {new_id} already in use")));
        }
        let mut record = self
            .records
            .remove(old_id)
            .ok_or_else(|| Error::TaskNotFound(old_id.to_string()))?;
        record.id = new_id.to_string();
        self.records.insert(new_id.to_string(), record);
        for record in self.records.values_mut() {
            if record.parent_id.as_deref() == Some(old_id) {
                record.parent_id = Some(new_id.to_string());
            }
        }
        self.graph.rename_node(old_id, new_id);
        self.subtasks.rename_parent(old_id, new_id);
        self.roster.rename_task(old_id, new_id);
        self.bump();
        Ok(())
    }

    /// Take server-computed scalar fields, keeping local id, parent link and
    /// owned collections.
    pub fn merge_record(&mut self, task_id: &str, server: &TaskRecord) -> Result<()> {
        let record = self.record_mut(task_id)?;
        record.title = server.title.clone();
        record.description = server.description.clone();
        record.status = server.status;
        record.priority = server.priority;
        record.due_date = server.due_date;
        record.completed_at = server.completed_at;
        record.created_at = server.created_at;
        record.updated_at = server.updated_at;
        normalize_record(record);
        self.bump();
        Ok(())
    }

    pub fn touch(&mut self, task_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.record_mut(task_id)?.updated_at = at;
        self.bump();
        Ok(())
    }

    /// Put back tasks captured by [`get`](Self::get) or
    /// [`cascade_snapshot`](Self::cascade_snapshot). Records land first and
    /// edges last, so snapshot entries may point at each other. Edges to
    /// tasks that no longer exist are dropped.
    pub fn restore(&mut self, tasks: Vec<Task>) -> Result<()> {
        let mut edges = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            let dependencies = std::mem::take(&mut task.dependencies);
            edges.push((task.record.id.clone(), dependencies));
            self.upsert(task)?;
        }
        for (task_id, mut dependencies) in edges {
            dependencies.retain(|dep| self.records.contains_key(&dep.task_id));
            self.graph.set_edges(&task_id, dependencies)?;
        }
        self.bump();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    pub fn transition(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusChange> {
        let engine = self.engine;
        let change = engine.transition(self.record_mut(task_id)?, status, at)?;
        self.bump();
        Ok(change)
    }

    pub fn toggle_complete(&mut self, task_id: &str, at: DateTime<Utc>) -> Result<StatusChange> {
        let engine = self.engine;
        let change = engine.toggle_complete(self.record_mut(task_id)?, at)?;
        self.bump();
        Ok(change)
    }

    /// Apply a field patch; a status in the patch goes through the engine.
    pub fn apply_patch(
        &mut self,
        task_id: &str,
        patch: &TaskPatch,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusChange>> {
        patch.validate()?;
        let engine = self.engine;
        let record = self.record_mut(task_id)?;
        patch.apply_fields(record);
        let change = match patch.status {
            Some(status) => Some(engine.transition(record, status, at)?),
            None => None,
        };
        self.bump();
        Ok(change)
    }

    // -------------------------------------------------------------------------
    // Dependencies
    // -------------------------------------------------------------------------

    pub fn add_dependency(&mut self, from: &str, to: &str, kind: DependencyType) -> Result<()> {
        self.ensure_exists(from)?;
        self.ensure_exists(to)?;
        self.graph.add_edge(from, to, kind)?;
        self.bump();
        Ok(())
    }

    pub fn remove_dependency(&mut self, from: &str, to: &str) -> bool {
        let removed = self.graph.remove_edge(from, to);
        if removed {
            self.bump();
        }
        removed
    }

    pub fn is_satisfied(&self, task_id: &str) -> bool {
        self.graph
            .is_satisfied(task_id, |id| self.status_of(id))
    }

    pub fn unsatisfied_dependencies(&self, task_id: &str) -> Vec<TaskId> {
        self.graph.unsatisfied(task_id, |id| self.status_of(id))
    }

    /// Open tasks whose blockers are all completed.
    pub fn ready(&self) -> TaskList {
        TaskList::new(
            self.records
                .values()
                .filter(|record| !record.completed && self.is_satisfied(&record.id))
                .filter_map(|record| self.get(&record.id))
                .collect(),
        )
    }

    // -------------------------------------------------------------------------
    // Subtasks
    // -------------------------------------------------------------------------

    pub fn add_subtask(&mut self, parent_id: &str, title: &str) -> Result<Subtask> {
        self.ensure_exists(parent_id)?;
        let subtask = self.subtasks.add_subtask(parent_id, title)?;
        self.bump();
        Ok(subtask)
    }

    pub fn insert_subtask(&mut self, parent_id: &str, subtask: Subtask) -> Result<()> {
        self.ensure_exists(parent_id)?;
        self.subtasks.insert(parent_id, subtask)?;
        self.bump();
        Ok(())
    }

    pub fn toggle_subtask(&mut self, parent_id: &str, subtask_id: &str) -> Result<bool> {
        let completed = self.subtasks.toggle_subtask(parent_id, subtask_id)?;
        self.bump();
        Ok(completed)
    }

    pub fn set_subtask_completed(
        &mut self,
        parent_id: &str,
        subtask_id: &str,
        completed: bool,
    ) -> Result<()> {
        self.subtasks.set_completed(parent_id, subtask_id, completed)?;
        self.bump();
        Ok(())
    }

    pub fn delete_subtask(&mut self, parent_id: &str, subtask_id: &str) -> Option<Subtask> {
        let removed = self.subtasks.delete_subtask(parent_id, subtask_id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn replace_subtask(
        &mut self,
        parent_id: &str,
        subtask_id: &str,
        subtask: Subtask,
    ) -> Result<()> {
        self.subtasks.replace(parent_id, subtask_id, subtask)?;
        self.bump();
        Ok(())
    }

    pub fn subtask_parent(&self, subtask_id: &str) -> Option<TaskId> {
        self.subtasks.parent_of(subtask_id).map(str::to_string)
    }

    // -------------------------------------------------------------------------
    // Assignees
    // -------------------------------------------------------------------------

    pub fn add_assignee(&mut self, task_id: &str, user: Assignee) -> Result<()> {
        self.ensure_exists(task_id)?;
        self.roster.add_assignee(task_id, user)?;
        self.bump();
        Ok(())
    }

    pub fn remove_assignee(&mut self, task_id: &str, user_id: &str) -> Option<Assignee> {
        let removed = self.roster.remove_assignee(task_id, user_id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Tasks assigned to a user.
    pub fn assigned_to(&self, user_id: &str) -> TaskList {
        TaskList::new(
            self.roster
                .tasks_for(user_id)
                .iter()
                .filter_map(|id| self.get(id))
                .collect(),
        )
    }

    /// Verify every store invariant. [`replace_all`](Self::replace_all) runs it
    /// on the staged collection before swapping it in.
    pub fn check_invariants(&self) -> Result<()> {
        for record in self.records.values() {
            if record.completed != record.status.is_completed() {
                return Err(Error::OperationFailed(format!(
                    "task {} completed flag disagrees with status",
                    record.id
                )));
            }
            if let Some(parent) = record.parent_id.as_deref() {
                let parent_record = self.records.get(parent).ok_or_else(|| {
                    Error::OperationFailed(format!(
                        "task {} has dangling parent {parent}",
                        record.id
                    ))
                })?;
                if parent_record.parent_id.is_some() {
                    return Err(Error::OperationFailed(format!(
                        "task {} is nested more than one level",
                        record.id
                    )));
                }
            }
            let mut seen = HashSet::new();
            for assignee in self.roster.assignees(&record.id) {
                if !seen.insert(assignee.user_id.as_str()) {
                    return Err(Error::OperationFailed(format!(
                        "task {} lists {} twice",
                        record.id, assignee.user_id
                    )));
                }
            }
            for dep in self.graph.dependencies(&record.id) {
                if dep.task_id == record.id {
                    return Err(Error::OperationFailed(format!(
                        "task {} depends on itself",
                        record.id
                    )));
                }
                if !self.records.contains_key(&dep.task_id) {
                    return Err(Error::OperationFailed(format!(
                        "task {} has dangling dependency {}",
                        record.id, dep.task_id
                    )));
                }
            }
        }
        if self.graph.has_cycle() {
            return Err(Error::OperationFailed(
                "blocking dependencies contain a cycle".to_string(),
            ));
        }
        Ok(())
    }

    fn child_ids(&self, task_id: &str) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .records
            .values()
            .filter(|record| record.parent_id.as_deref() == Some(task_id))
            .map(|record| record.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn record_mut(&mut self, task_id: &str) -> Result<&mut TaskRecord> {
        self.records
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    fn ensure_exists(&self, task_id: &str) -> Result<()> {
        if self.records.contains_key(task_id) {
            Ok(())
        } else {
            Err(Error::TaskNotFound(task_id.to_string()))
        }
    }

    fn check_parent(&self, task_id: &str, parent_id: Option<&str>) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        if parent_id == task_id {
            return Err(Error::Validation(format!(
                "task {task_id} cannot be its own parent"
            )));
        }
        let parent = self
            .records
            .get(parent_id)
            .ok_or_else(|| Error::TaskNotFound(parent_id.to_string()))?;
        if parent.parent_id.is_some() {
            return Err(Error::Validation(format!(
                "task {parent_id} is itself a subtask; nesting is one level deep"
            )));
        }
        Ok(())
    }

    fn check_targets(&self, task: &Task) -> Result<()> {
        for dep in &task.dependencies {
            if dep.task_id != task.record.id && !self.records.contains_key(&dep.task_id) {
                return Err(Error::TaskNotFound(dep.task_id.clone()));
            }
        }
        Ok(())
    }

    fn bump(&mut self) {
        self.revision += 1;
        self.changes.send_replace(self.revision);
    }
}

fn validate_task_shape(task: &Task) -> Result<()> {
    if task.record.id.trim().is_empty() {
        return Err(Error::Validation("task id cannot be empty".to_string()));
    }
    validate_title(&task.record.title, "task title")?;

    let mut subtask_ids = HashSet::new();
    for subtask in &task.subtasks {
        validate_title(&subtask.title, "subtask title")?;
        if !subtask_ids.insert(subtask.id.as_str()) {
            return Err(Error::Validation(format!(
                "subtask {} appears twice on {}",
                subtask.id,
                task.id()
            )));
        }
    }

    let mut user_ids = HashSet::new();
    for assignee in &task.assignees {
        if assignee.user_id.trim().is_empty() {
            return Err(Error::Validation("assignee user id cannot be empty".to_string()));
        }
        if !user_ids.insert(assignee.user_id.as_str()) {
            return Err(Error::DuplicateAssignee {
                task_id: task.id().to_string(),
                user_id: assignee.user_id.clone(),
            });
        }
    }
    Ok(())
}

fn normalize_record(record: &mut TaskRecord) {
    record.completed = record.status.is_completed();
    if !record.completed {
        record.completed_at = None;
    }
}

/// Cloneable handle that lets any number of readers observe one store.
///
/// Locks are never held across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<TaskStore>>,
}

impl SharedStore {
    pub fn new(store: TaskStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&TaskStore) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut TaskStore) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.read(|store| store.get(task_id))
    }

    pub fn list(&self) -> TaskList {
        self.read(TaskStore::list)
    }

    pub fn ready(&self) -> TaskList {
        self.read(TaskStore::ready)
    }

    pub fn is_satisfied(&self, task_id: &str) -> bool {
        self.read(|store| store.is_satisfied(task_id))
    }

    pub fn unsatisfied_dependencies(&self, task_id: &str) -> Vec<TaskId> {
        self.read(|store| store.unsatisfied_dependencies(task_id))
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.read(TaskStore::subscribe)
    }

    pub fn revision(&self) -> u64 {
        self.read(TaskStore::revision)
    }
}
