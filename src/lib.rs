//! taskflow - Task Lifecycle Engine
//!
//! Tracks tasks through a status machine, keeps a dependency graph acyclic,
//! manages one-level subtask hierarchies and per-task assignees, and applies
//! every write optimistically against a remote store with rollback.
//!
//! # Core Concepts
//!
//! - **Store**: the single owner of task state; readers get copies
//! - **Dependency graph**: blocking edges form a DAG; readiness follows it
//! - **Status engine**: closed state set, derived completion flag
//! - **Coordinator**: optimistic apply, remote persist, rollback on failure
//!
//! # Module Organization
//!
//! - `model`: task data types and id helpers
//! - `graph`: dependency edges, cycle checks, readiness
//! - `subtasks`: checklist subtasks per task
//! - `roster`: assignees per task
//! - `status`: status machine
//! - `store`: task store and shared read handle
//! - `coordinator`: optimistic mutation protocol
//! - `remote`: remote store contract and bundled backends
//! - `events`: outcome events and JSONL sinks
//! - `config`: configuration loading from `.taskflow.toml`
//! - `error`: error types and result aliases
//! - `lock`: file locking and atomic writes
//! - `output`: CLI output envelopes
//! - `cli`: command-line interface using clap

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod graph;
pub mod lock;
pub mod model;
pub mod output;
pub mod remote;
pub mod roster;
pub mod status;
pub mod store;
pub mod subtasks;

pub use coordinator::{CoordinatorOptions, MutationCoordinator, OperationClass};
pub use error::{Error, Result};
pub use store::{SharedStore, TaskList, TaskStore};
