//! Server-side task state shared by the bundled backends.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::model::{
    server_id, validate_title, Assignee, DependencyType, NewTask, Priority, Subtask, Task,
    TaskPatch, TaskStatus,
};
use crate::status::StatusEngine;
use crate::store::TaskStore;

/// Canonical task collection plus server-side id assignment.
#[derive(Debug)]
pub struct ServerState {
    store: TaskStore,
    id_prefix: String,
}

impl ServerState {
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            store: TaskStore::new(StatusEngine::default()),
            id_prefix: id_prefix.into(),
        }
    }

    pub fn with_tasks(id_prefix: impl Into<String>, tasks: Vec<Task>) -> Result<Self> {
        Ok(Self {
            store: TaskStore::from_tasks(StatusEngine::default(), tasks)?,
            id_prefix: id_prefix.into(),
        })
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.store.list().to_vec()
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.store.get(task_id)
    }

    pub fn create_task(&mut self, fields: &NewTask) -> Result<Task> {
        fields.validate()?;
        let id = server_id(&self.id_prefix);
        let record = fields.clone().into_record(
            id.clone(),
            TaskStatus::ToDo,
            Priority::Medium,
            Utc::now(),
        );
        self.store.upsert(Task::new(record))?;
        self.store.require(&id)
    }

    pub fn update_task(&mut self, task_id: &str, patch: &TaskPatch) -> Result<Task> {
        let now = Utc::now();
        self.store.apply_patch(task_id, patch, now)?;
        self.store.touch(task_id, now)?;
        self.store.require(task_id)
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<()> {
        self.store
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    pub fn add_dependency(
        &mut self,
        task_id: &str,
        dependency_task_id: &str,
        kind: DependencyType,
    ) -> Result<()> {
        self.store.add_dependency(task_id, dependency_task_id, kind)?;
        self.store.touch(task_id, Utc::now())
    }

    pub fn remove_dependency(&mut self, task_id: &str, dependency_task_id: &str) -> Result<()> {
        if self.store.remove_dependency(task_id, dependency_task_id) {
            self.store.touch(task_id, Utc::now())?;
        }
        Ok(())
    }

    pub fn add_subtask(&mut self, parent_id: &str, title: &str) -> Result<Subtask> {
        validate_title(title, "subtask title")?;
        let subtask = Subtask {
            id: server_id(&self.id_prefix),
            title: title.trim().to_string(),
            completed: false,
        };
        self.store.insert_subtask(parent_id, subtask.clone())?;
        self.store.touch(parent_id, Utc::now())?;
        Ok(subtask)
    }

    pub fn toggle_subtask_completion(&mut self, subtask_id: &str, completed: bool) -> Result<()> {
        let parent_id = self
            .store
            .subtask_parent(subtask_id)
            .ok_or_else(|| Error::TaskNotFound(format!("subtask {subtask_id}")))?;
        self.store
            .set_subtask_completed(&parent_id, subtask_id, completed)?;
        self.store.touch(&parent_id, Utc::now())
    }

    pub fn delete_subtask(&mut self, subtask_id: &str) -> Result<()> {
        if let Some(parent_id) = self.store.subtask_parent(subtask_id) {
            self.store.delete_subtask(&parent_id, subtask_id);
            self.store.touch(&parent_id, Utc::now())?;
        }
        Ok(())
    }

    pub fn add_assignee(&mut self, task_id: &str, assignee: &Assignee) -> Result<()> {
        self.store.add_assignee(task_id, assignee.clone())?;
        self.store.touch(task_id, Utc::now())
    }

    pub fn remove_assignee(&mut self, task_id: &str, user_id: &str) -> Result<()> {
        if self.store.remove_assignee(task_id, user_id).is_some() {
            self.store.touch(task_id, Utc::now())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_prefixed_ids() {
        let mut state = ServerState::new("tf");
        let task = state.create_task(&NewTask::new("Plan")).expect("create");
        assert!(task.id().starts_with("tf-"));
        assert_eq!(task.status(), TaskStatus::ToDo);
        assert!(state.create_task(&NewTask::new(" ")).is_err());
    }

    #[test]
    fn update_runs_status_through_engine() {
        let mut state = ServerState::new("tf");
        let task = state.create_task(&NewTask::new("Plan")).expect("create");
        let updated = state
            .update_task(task.id(), &TaskPatch::status(TaskStatus::Completed))
            .expect("update");
        assert!(updated.is_completed());
        assert!(updated.record.completed_at.is_some());
        assert!(updated.record.updated_at >= task.record.updated_at);
    }

    #[test]
    fn server_rejects_cycles_and_duplicates() {
        let mut state = ServerState::new("tf");
        let a = state.create_task(&NewTask::new("A")).expect("a");
        let b = state.create_task(&NewTask::new("B")).expect("b");
        state
            .add_dependency(a.id(), b.id(), DependencyType::Blocks)
            .expect("a->b");
        assert!(matches!(
            state.add_dependency(b.id(), a.id(), DependencyType::Blocks),
            Err(Error::CircularDependency(_))
        ));
        let jane = Assignee::new("u1", "Jane");
        state.add_assignee(a.id(), &jane).expect("assign");
        assert!(state.add_assignee(a.id(), &jane).is_err());
    }

    #[test]
    fn subtasks_are_addressed_by_id_alone() {
        let mut state = ServerState::new("tf");
        let parent = state.create_task(&NewTask::new("Parent")).expect("parent");
        let subtask = state.add_subtask(parent.id(), "step").expect("subtask");
        state
            .toggle_subtask_completion(&subtask.id, true)
            .expect("toggle");
        assert!(state.get(parent.id()).expect("parent").subtasks[0].completed);
        state.delete_subtask(&subtask.id).expect("delete");
        state.delete_subtask(&subtask.id).expect("delete again");
        assert!(state.get(parent.id()).expect("parent").subtasks.is_empty());
    }
}
