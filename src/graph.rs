//! Dependency graph over task ids.
//!
//! Edges are stored as outgoing adjacency lists keyed by the owning task.
//! Only `blocks`/`blocked-by` edges take part in acyclicity and readiness;
//! `related` edges are plain annotations.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::model::{Dependency, DependencyType, TaskId, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: HashMap<TaskId, Vec<Dependency>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outgoing edges of `task_id`, in insertion order.
    pub fn dependencies(&self, task_id: &str) -> &[Dependency] {
        self.edges
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.dependencies(from).iter().any(|dep| dep.task_id == to)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Tasks holding an edge that points at `task_id`.
    pub fn dependents(&self, task_id: &str) -> Vec<TaskId> {
        let mut dependents: Vec<TaskId> = self
            .edges
            .iter()
            .filter(|(_, deps)| deps.iter().any(|dep| dep.task_id == task_id))
            .map(|(owner, _)| owner.clone())
            .collect();
        dependents.sort();
        dependents
    }

    /// Insert `from -> to`. Rejects self-edges, duplicates, and edges that
    /// would close a blocking cycle; the graph is untouched on rejection.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: DependencyType) -> Result<()> {
        self.check_edge(from, to, kind)?;
        self.edges
            .entry(from.to_string())
            .or_default()
            .push(Dependency::new(to, kind));
        Ok(())
    }

    /// Idempotent removal; returns whether an edge was removed.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let Some(deps) = self.edges.get_mut(from) else {
            return false;
        };
        let before = deps.len();
        deps.retain(|dep| dep.task_id != to);
        let removed = deps.len() != before;
        if deps.is_empty() {
            self.edges.remove(from);
        }
        removed
    }

    /// Replace the outgoing edges of `task_id` as a unit.
    ///
    /// Every edge is checked against the graph as it would look with the
    /// earlier edges of `deps` applied. On error nothing changes.
    pub fn set_edges(&mut self, task_id: &str, deps: Vec<Dependency>) -> Result<()> {
        let previous = self.edges.remove(task_id);
        let mut staged = Vec::with_capacity(deps.len());
        for dep in deps {
            let result = self.check_edge(task_id, &dep.task_id, dep.kind);
            if let Err(err) = result {
                self.edges.remove(task_id);
                if let Some(previous) = previous {
                    self.edges.insert(task_id.to_string(), previous);
                }
                return Err(err);
            }
            staged.push(dep.clone());
            self.edges.insert(task_id.to_string(), staged.clone());
        }
        if staged.is_empty() {
            self.edges.remove(task_id);
        }
        Ok(())
    }

    /// Drop every edge from or to `task_id`. Returns the other tasks whose
    /// outgoing edges were modified.
    pub fn remove_node(&mut self, task_id: &str) -> Vec<TaskId> {
        self.edges.remove(task_id);
        let mut touched = Vec::new();
        self.edges.retain(|owner, deps| {
            let before = deps.len();
            deps.retain(|dep| dep.task_id != task_id);
            if deps.len() != before {
                touched.push(owner.clone());
            }
            !deps.is_empty()
        });
        touched.sort();
        touched
    }

    /// Re-key a node, rewriting both its own entry and incoming edges.
    pub fn rename_node(&mut self, old_id: &str, new_id: &str) {
        if let Some(deps) = self.edges.remove(old_id) {
            self.edges.insert(new_id.to_string(), deps);
        }
        for deps in self.edges.values_mut() {
            for dep in deps.iter_mut() {
                if dep.task_id == old_id {
                    dep.task_id = new_id.to_string();
                }
            }
        }
    }

    /// Whether adding a blocking edge `from -> to` would close a cycle,
    /// i.e. whether `from` is reachable from `to` over blocking edges.
    ///
    /// Iterative DFS with a visited set: each node and edge is seen at most
    /// once, so a check is O(V + E).
    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![to];
        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for dep in self.blocking_dependencies(current) {
                if !visited.contains(dep.task_id.as_str()) {
                    stack.push(dep.task_id.as_str());
                }
            }
        }
        false
    }

    /// Whether the blocking subgraph currently contains any cycle.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for start in self.edges.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            // (node, index of next outgoing edge to visit)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::Active);
            while let Some((node, next)) = stack.pop() {
                let blocking: Vec<&Dependency> = self.blocking_dependencies(node).collect();
                if next < blocking.len() {
                    stack.push((node, next + 1));
                    let target = blocking[next].task_id.as_str();
                    match marks.get(target) {
                        Some(Mark::Active) => return true,
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(target, Mark::Active);
                            stack.push((target, 0));
                        }
                    }
                } else {
                    marks.insert(node, Mark::Done);
                }
            }
        }
        false
    }

    pub fn blocking_dependencies<'a>(
        &'a self,
        task_id: &str,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies(task_id)
            .iter()
            .filter(|dep| dep.kind.is_blocking())
    }

    /// Blocking dependencies of `task_id` whose target is not completed.
    ///
    /// Targets unknown to `status_of` are treated as satisfied.
    pub fn unsatisfied<F>(&self, task_id: &str, status_of: F) -> Vec<TaskId>
    where
        F: Fn(&str) -> Option<TaskStatus>,
    {
        self.blocking_dependencies(task_id)
            .filter(|dep| {
                status_of(&dep.task_id)
                    .map(|status| !status.is_completed())
                    .unwrap_or(false)
            })
            .map(|dep| dep.task_id.clone())
            .collect()
    }

    /// True iff every blocking dependency of `task_id` points to a
    /// completed task. A task without blockers is trivially satisfied.
    pub fn is_satisfied<F>(&self, task_id: &str, status_of: F) -> bool
    where
        F: Fn(&str) -> Option<TaskStatus>,
    {
        self.unsatisfied(task_id, status_of).is_empty()
    }

    fn check_edge(&self, from: &str, to: &str, kind: DependencyType) -> Result<()> {
        if from == to {
            return Err(Error::CircularDependency(format!(
                "task {from} cannot depend on itself"
            )));
        }
        if self.contains_edge(from, to) {
            return Err(Error::CircularDependency(format!(
                "dependency {from} -> {to} already exists"
            )));
        }
        if kind.is_blocking() && self.would_create_cycle(from, to) {
            return Err(Error::CircularDependency(format!(
                "{from} -> {to} would create a cycle ({to} already depends on {from})"
            )));
        }
        Ok(())
    }
}
