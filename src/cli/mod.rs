//! Command-line interface for taskflow
//!
//! This module defines the CLI structure using clap derive macros.
//! Command implementations live in [`task`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

mod task;

/// taskflow - task lifecycle engine
///
/// Tracks task status, dependencies, subtasks and assignees, persisting
/// every change optimistically to a file-backed store.
#[derive(Parser, Debug)]
#[command(name = "taskflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root holding `.taskflow.toml` (defaults to current directory)
    #[arg(long, global = true, env = "TASKFLOW_ROOT")]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write outcome events as JSON lines to a file, or `-` for stdout
    #[arg(long, global = true, env = "TASKFLOW_EVENTS")]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a task
    New {
        /// Task title
        title: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Initial status: to-do, in-progress, in-review, completed
        #[arg(long)]
        status: Option<String>,

        /// Priority: low, medium, high
        #[arg(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,

        /// Make this a subtask-task of an existing top-level task
        #[arg(long)]
        parent: Option<String>,
    },

    /// List tasks
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<String>,

        /// Only tasks assigned to this user id
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Show one task with its blockers and children
    Show {
        /// Task id (or unique prefix)
        id: String,
    },

    /// List open tasks whose blocking dependencies are all completed
    Ready,

    /// Move a task to a status
    Status {
        /// Task id
        id: String,

        /// Target status: to-do, in-progress, in-review, completed
        status: String,
    },

    /// Complete an open task or reopen a completed one
    Toggle {
        /// Task id
        id: String,
    },

    /// Edit task fields
    Edit {
        /// Task id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,

        /// Remove the description
        #[arg(long)]
        clear_description: bool,

        /// New priority: low, medium, high
        #[arg(long)]
        priority: Option<String>,

        /// New due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task, its subtask-tasks and every dependency on them
    Delete {
        /// Task id
        id: String,
    },

    /// Dependency management
    #[command(subcommand)]
    Dep(DepCommands),

    /// Checklist subtask management
    #[command(subcommand)]
    Subtask(SubtaskCommands),

    /// Assign a user to a task
    Assign {
        /// Task id
        id: String,

        /// User id
        user_id: String,

        /// Display name (defaults to the user id)
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove a user from a task
    Unassign {
        /// Task id
        id: String,

        /// User id
        user_id: String,
    },
}

/// Dependency subcommands
#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Add a dependency edge from a task to another
    Add {
        /// Task that owns the edge
        id: String,

        /// Task it depends on
        depends_on: String,

        /// Edge type: blocks, blocked-by, related
        #[arg(long = "type", default_value = "blocks")]
        kind: String,
    },

    /// Remove a dependency edge
    Rm {
        /// Task that owns the edge
        id: String,

        /// Task it depends on
        depends_on: String,
    },
}

/// Subtask subcommands
#[derive(Subcommand, Debug)]
pub enum SubtaskCommands {
    /// Add a checklist item to a task
    Add {
        /// Parent task id
        id: String,

        /// Subtask title
        title: String,
    },

    /// Flip a checklist item's completion
    Toggle {
        /// Parent task id
        id: String,

        /// Subtask id
        subtask_id: String,
    },

    /// Delete a checklist item
    Rm {
        /// Parent task id
        id: String,

        /// Subtask id
        subtask_id: String,
    },
}

impl Cli {
    /// Execute the CLI command on a single-threaded runtime
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run_async())
    }

    async fn run_async(self) -> Result<()> {
        let global = task::GlobalOptions {
            root: self.root,
            events: self.events,
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::New { title, description, status, priority, due, parent } => {
                task::run_new(
                    global,
                    task::NewOptions {
                        title,
                        description,
                        status,
                        priority,
                        due,
                        parent,
                    },
                )
                .await
            }
            Commands::List { status, assignee } => {
                task::run_list(global, task::ListOptions { status, assignee }).await
            }
            Commands::Show { id } => task::run_show(global, id).await,
            Commands::Ready => task::run_ready(global).await,
            Commands::Status { id, status } => task::run_status(global, id, status).await,
            Commands::Toggle { id } => task::run_toggle(global, id).await,
            Commands::Edit {
                id,
                title,
                description,
                clear_description,
                priority,
                due,
                clear_due,
            } => {
                task::run_edit(
                    global,
                    task::EditOptions {
                        id,
                        title,
                        description,
                        clear_description,
                        priority,
                        due,
                        clear_due,
                    },
                )
                .await
            }
            Commands::Delete { id } => task::run_delete(global, id).await,
            Commands::Dep(cmd) => match cmd {
                DepCommands::Add { id, depends_on, kind } => {
                    task::run_dep_add(global, id, depends_on, kind).await
                }
                DepCommands::Rm { id, depends_on } => {
                    task::run_dep_rm(global, id, depends_on).await
                }
            },
            Commands::Subtask(cmd) => match cmd {
                SubtaskCommands::Add { id, title } => {
                    task::run_subtask_add(global, id, title).await
                }
                SubtaskCommands::Toggle { id, subtask_id } => {
                    task::run_subtask_toggle(global, id, subtask_id).await
                }
                SubtaskCommands::Rm { id, subtask_id } => {
                    task::run_subtask_rm(global, id, subtask_id).await
                }
            },
            Commands::Assign { id, user_id, name } => {
                task::run_assign(global, id, user_id, name).await
            }
            Commands::Unassign { id, user_id } => task::run_unassign(global, id, user_id).await,
        }
    }
}
