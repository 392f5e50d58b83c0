//! Per-task assignee sets, unique by user id.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Assignee, TaskId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssigneeRoster {
    assignees: HashMap<TaskId, Vec<Assignee>>,
}

impl AssigneeRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assignees(&self, task_id: &str) -> &[Assignee] {
        self.assignees
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, task_id: &str, user_id: &str) -> bool {
        self.assignees(task_id)
            .iter()
            .any(|assignee| assignee.user_id == user_id)
    }

    /// Append `user`; a user already on the task is reported as
    /// `DuplicateAssignee` and nothing changes.
    pub fn add_assignee(&mut self, task_id: &str, user: Assignee) -> Result<()> {
        if user.user_id.trim().is_empty() {
            return Err(Error::Validation("assignee user id cannot be empty".to_string()));
        }
        if self.contains(task_id, &user.user_id) {
            return Err(Error::DuplicateAssignee {
                task_id: task_id.to_string(),
                user_id: user.user_id,
            });
        }
        self.assignees
            .entry(task_id.to_string())
            .or_default()
            .push(user);
        Ok(())
    }

    /// Idempotent removal; returns the removed entry, if any.
    pub fn remove_assignee(&mut self, task_id: &str, user_id: &str) -> Option<Assignee> {
        let list = self.assignees.get_mut(task_id)?;
        let index = list.iter().position(|assignee| assignee.user_id == user_id)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.assignees.remove(task_id);
        }
        Some(removed)
    }

    /// Replace the set for a task, rejecting duplicate user ids.
    pub fn set_assignees(&mut self, task_id: &str, assignees: Vec<Assignee>) -> Result<()> {
        let mut staged = AssigneeRoster::new();
        for assignee in assignees {
            staged.add_assignee(task_id, assignee)?;
        }
        match staged.assignees.remove(task_id) {
            Some(list) => {
                self.assignees.insert(task_id.to_string(), list);
            }
            None => {
                self.assignees.remove(task_id);
            }
        }
        Ok(())
    }

    pub fn remove_task(&mut self, task_id: &str) -> Vec<Assignee> {
        self.assignees.remove(task_id).unwrap_or_default()
    }

    pub fn rename_task(&mut self, old_id: &str, new_id: &str) {
        if let Some(list) = self.assignees.remove(old_id) {
            self.assignees.insert(new_id.to_string(), list);
        }
    }

    /// Tasks the given user is assigned to.
    pub fn tasks_for(&self, user_id: &str) -> Vec<TaskId> {
        let mut tasks: Vec<TaskId> = self
            .assignees
            .iter()
            .filter(|(_, list)| list.iter().any(|assignee| assignee.user_id == user_id))
            .map(|(task_id, _)| task_id.clone())
            .collect();
        tasks.sort();
        tasks
    }
}
