//! Per-task ordered subtask lists.
//!
//! Subtask completion is independent of the parent's own status: toggling a
//! subtask never moves the parent, and completing the parent never ticks its
//! subtasks.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{temp_id, validate_title, Subtask, TaskId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtaskTree {
    lists: HashMap<TaskId, Vec<Subtask>>,
}

impl SubtaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subtasks(&self, parent_id: &str) -> &[Subtask] {
        self.lists
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, parent_id: &str, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks(parent_id)
            .iter()
            .find(|subtask| subtask.id == subtask_id)
    }

    /// Owning task of a subtask id, if any.
    pub fn parent_of(&self, subtask_id: &str) -> Option<&str> {
        self.lists
            .iter()
            .find(|(_, list)| list.iter().any(|subtask| subtask.id == subtask_id))
            .map(|(parent, _)| parent.as_str())
    }

    /// Append an open subtask under a fresh temporary id.
    pub fn add_subtask(&mut self, parent_id: &str, title: &str) -> Result<Subtask> {
        validate_title(title, "subtask title")?;
        let subtask = Subtask {
            id: temp_id(),
            title: title.trim().to_string(),
            completed: false,
        };
        self.insert(parent_id, subtask.clone())?;
        Ok(subtask)
    }

    /// Append an existing subtask record (e.g. one confirmed by the server).
    pub fn insert(&mut self, parent_id: &str, subtask: Subtask) -> Result<()> {
        validate_title(&subtask.title, "subtask title")?;
        let list = self.lists.entry(parent_id.to_string()).or_default();
        if list.iter().any(|existing| existing.id == subtask.id) {
            return Err(Error::Validation(format!(
                "subtask {} already exists on {parent_id}",
                subtask.id
            )));
        }
        list.push(subtask);
        Ok(())
    }

    /// Flip `completed`; returns the new value.
    pub fn toggle_subtask(&mut self, parent_id: &str, subtask_id: &str) -> Result<bool> {
        let subtask = self.find_mut(parent_id, subtask_id)?;
        subtask.completed = !subtask.completed;
        Ok(subtask.completed)
    }

    pub fn set_completed(
        &mut self,
        parent_id: &str,
        subtask_id: &str,
        completed: bool,
    ) -> Result<()> {
        self.find_mut(parent_id, subtask_id)?.completed = completed;
        Ok(())
    }

    /// Remove by id; `None` if it was not there.
    pub fn delete_subtask(&mut self, parent_id: &str, subtask_id: &str) -> Option<Subtask> {
        let list = self.lists.get_mut(parent_id)?;
        let index = list.iter().position(|subtask| subtask.id == subtask_id)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.lists.remove(parent_id);
        }
        Some(removed)
    }

    /// Swap a subtask record in place, keeping its position.
    pub fn replace(&mut self, parent_id: &str, subtask_id: &str, subtask: Subtask) -> Result<()> {
        *self.find_mut(parent_id, subtask_id)? = subtask;
        Ok(())
    }

    pub fn set_list(&mut self, parent_id: &str, subtasks: Vec<Subtask>) -> Result<()> {
        for subtask in &subtasks {
            validate_title(&subtask.title, "subtask title")?;
        }
        if subtasks.is_empty() {
            self.lists.remove(parent_id);
        } else {
            self.lists.insert(parent_id.to_string(), subtasks);
        }
        Ok(())
    }

    pub fn remove_parent(&mut self, parent_id: &str) -> Vec<Subtask> {
        self.lists.remove(parent_id).unwrap_or_default()
    }

    pub fn rename_parent(&mut self, old_id: &str, new_id: &str) {
        if let Some(list) = self.lists.remove(old_id) {
            self.lists.insert(new_id.to_string(), list);
        }
    }

    fn find_mut(&mut self, parent_id: &str, subtask_id: &str) -> Result<&mut Subtask> {
        self.lists
            .get_mut(parent_id)
            .and_then(|list| list.iter_mut().find(|subtask| subtask.id == subtask_id))
            .ok_or_else(|| {
                Error::TaskNotFound(format!("subtask {subtask_id} on {parent_id}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_appends_open_subtasks_in_order() {
        let mut tree = SubtaskTree::new();
        let first = tree.add_subtask("a", "Write tests").expect("first");
        let second = tree.add_subtask("a", "  Ship  ").expect("second");
        let list = tree.subtasks("a");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], first);
        assert_eq!(list[1].title, "Ship");
        assert!(!second.completed);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn empty_title_rejected_without_change() {
        let mut tree = SubtaskTree::new();
        tree.add_subtask("a", "keep").expect("keep");
        for title in ["", "   "] {
            let err = tree.add_subtask("a", title).expect_err("empty");
            assert!(matches!(err, Error::Validation(_)));
        }
        assert_eq!(tree.subtasks("a").len(), 1);
    }

    #[test]
    fn toggle_flips_only_the_target() {
        let mut tree = SubtaskTree::new();
        let one = tree.add_subtask("a", "one").expect("one");
        let two = tree.add_subtask("a", "two").expect("two");
        assert!(tree.toggle_subtask("a", &one.id).expect("toggle"));
        assert!(tree.get("a", &one.id).expect("one").completed);
        assert!(!tree.get("a", &two.id).expect("two").completed);
        assert!(!tree.toggle_subtask("a", &one.id).expect("toggle back"));
        assert!(matches!(
            tree.toggle_subtask("a", "missing"),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn delete_is_noop_when_missing() {
        let mut tree = SubtaskTree::new();
        let one = tree.add_subtask("a", "one").expect("one");
        assert!(tree.delete_subtask("a", "nope").is_none());
        assert!(tree.delete_subtask("b", &one.id).is_none());
        assert_eq!(tree.delete_subtask("a", &one.id), Some(one));
        assert!(tree.subtasks("a").is_empty());
    }

    #[test]
    fn replace_keeps_position_and_parent_lookup() {
        let mut tree = SubtaskTree::new();
        let first = tree.add_subtask("a", "one").expect("one");
        tree.add_subtask("a", "two").expect("two");
        let confirmed = Subtask {
            id: "st-1".to_string(),
            title: "one".to_string(),
            completed: false,
        };
        tree.replace("a", &first.id, confirmed.clone()).expect("replace");
        assert_eq!(tree.subtasks("a")[0], confirmed);
        assert_eq!(tree.parent_of("st-1"), Some("a"));
        assert_eq!(tree.parent_of(&first.id), None);
    }
}
