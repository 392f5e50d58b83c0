//! taskflow command implementations.
//!
//! Every command hydrates a coordinator from the file-backed store, runs one
//! operation through it and reports the result.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::coordinator::MutationCoordinator;
use crate::error::{Error, Result};
use crate::events::{EventDestination, EventSink, OutcomeEvent};
use crate::model::{
    parse_due_date, Assignee, DependencyType, NewTask, Priority, Subtask, Task, TaskPatch,
    TaskStatus,
};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::remote::FileRemote;
use crate::store::{SharedStore, TaskList};

pub struct GlobalOptions {
    pub root: Option<PathBuf>,
    pub events: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct NewOptions {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due: Option<String>,
    pub parent: Option<String>,
}

pub struct ListOptions {
    pub status: Option<String>,
    pub assignee: Option<String>,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub clear_description: bool,
    pub priority: Option<String>,
    pub due: Option<String>,
    pub clear_due: bool,
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct TaskDetailsOutput {
    task: Task,
    ready: bool,
    blockers: Vec<String>,
    children: Vec<String>,
}

#[derive(Serialize)]
struct DeleteOutput {
    removed: Vec<String>,
    detached: Vec<String>,
}

#[derive(Serialize)]
struct DependencyOutput {
    id: String,
    depends_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<DependencyType>,
    changed: bool,
}

#[derive(Serialize)]
struct SubtaskOutput {
    task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtask: Option<Subtask>,
    changed: bool,
}

#[derive(Serialize)]
struct AssigneeOutput {
    task_id: String,
    user_id: String,
    changed: bool,
}

struct TaskContext {
    coordinator: MutationCoordinator,
    events: broadcast::Receiver<OutcomeEvent>,
    sink: Option<EventSink>,
    output: OutputOptions,
}

impl TaskContext {
    fn store(&self) -> &SharedStore {
        self.coordinator.store()
    }

    /// Write outcome events produced so far to the event sink.
    fn flush_events(&mut self, human: &mut HumanOutput) {
        while let Ok(event) = self.events.try_recv() {
            if let Some(sink) = self.sink.as_mut() {
                if let Err(err) = sink.emit(&event) {
                    human.push_warning(format!("event output failed: {err}"));
                }
            }
        }
    }

    /// Flush events, then hand back the operation result.
    fn finish<T>(&mut self, human: &mut HumanOutput, result: Result<T>) -> Result<T> {
        self.flush_events(human);
        result
    }
}

async fn load_context(global: &GlobalOptions) -> Result<TaskContext> {
    let root = match &global.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let config = Config::load_from_root(&root);
    let remote = FileRemote::new(
        config.store.resolve(&root),
        config.tasks.id_prefix.clone(),
        config.store.lock_timeout_ms,
    );
    tracing::debug!(store = %remote.path().display(), "opening task store");
    let coordinator = MutationCoordinator::from_config(&config, Arc::new(remote))?;
    coordinator.load().await?;

    let destination = EventDestination::parse(global.events.as_deref());
    let sink = destination.as_ref().map(|dest| dest.open()).transpose()?;
    let events_to_stdout = matches!(destination, Some(EventDestination::Stdout));
    let events = coordinator.subscribe();

    Ok(TaskContext {
        coordinator,
        events,
        sink,
        output: OutputOptions {
            json: global.json && !events_to_stdout,
            quiet: global.quiet || events_to_stdout,
        },
    })
}

pub async fn run_new(global: GlobalOptions, options: NewOptions) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let parent_id = options
        .parent
        .as_deref()
        .map(|raw| resolve_task_id(ctx.store(), raw))
        .transpose()?;
    let fields = NewTask {
        title: options.title,
        description: options.description,
        status: options.status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
        priority: options.priority.as_deref().map(str::parse::<Priority>).transpose()?,
        due_date: options.due.as_deref().map(parse_due_date).transpose()?,
        parent_id,
    };

    let mut human = HumanOutput::new("Task created");
    let result = ctx.coordinator.create_task(fields).await;
    let task = ctx.finish(&mut human, result)?;

    human.push_summary("ID", task.id());
    push_task_summary(&mut human, &task);
    human.push_next_step(format!("taskflow show {}", task.id()));
    emit_success(ctx.output, "new", &task, Some(&human))
}

pub async fn run_list(global: GlobalOptions, options: ListOptions) -> Result<()> {
    let ctx = load_context(&global).await?;
    let status = options
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()?;
    let listed = match options.assignee.as_deref() {
        Some(user_id) => ctx.store().read(|store| store.assigned_to(user_id)),
        None => ctx.store().list(),
    };
    let tasks: Vec<Task> = listed
        .iter()
        .filter(|task| status.map_or(true, |status| task.status() == status))
        .cloned()
        .collect();

    let mut human = HumanOutput::new("Tasks");
    human.push_summary("Total", tasks.len().to_string());
    for task in &tasks {
        let mut line = task_line(task);
        if !ctx.store().is_satisfied(task.id()) {
            line.push_str(" (blocked)");
        }
        human.push_detail(line);
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_success(ctx.output, "list", &output, Some(&human))
}

pub async fn run_show(global: GlobalOptions, id: String) -> Result<()> {
    let ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;
    let (task, blockers, children) = ctx.store().read(|store| {
        let task = store.require(&task_id)?;
        let children: Vec<String> = store
            .children(&task_id)
            .iter()
            .map(|child| child.id().to_string())
            .collect();
        Ok::<_, Error>((task, store.unsatisfied_dependencies(&task_id), children))
    })?;

    let mut human = HumanOutput::new(format!("Task {task_id}"));
    push_task_summary(&mut human, &task);
    if let Some(description) = task.record.description.as_ref() {
        human.push_detail(description.clone());
    }
    for dep in &task.dependencies {
        human.push_detail(format!("{} {}", dep.kind, dep.task_id));
    }
    for subtask in &task.subtasks {
        let mark = if subtask.completed { "x" } else { " " };
        human.push_detail(format!("[{mark}] {} {}", subtask.id, subtask.title));
    }
    for assignee in &task.assignees {
        human.push_detail(format!("@{} ({})", assignee.user_id, assignee.name));
    }
    if !children.is_empty() {
        human.push_summary("Children", children.join(", "));
    }
    if !blockers.is_empty() {
        human.push_warning(format!("blocked by {}", blockers.join(", ")));
    }

    let output = TaskDetailsOutput {
        task,
        ready: blockers.is_empty(),
        blockers,
        children,
    };
    emit_success(ctx.output, "show", &output, Some(&human))
}

pub async fn run_ready(global: GlobalOptions) -> Result<()> {
    let ctx = load_context(&global).await?;
    let ready: TaskList = ctx.store().ready();

    let mut human = HumanOutput::new("Ready tasks");
    human.push_summary("Total", ready.len().to_string());
    for task in &ready {
        human.push_detail(task_line(task));
    }

    let output = TaskListOutput {
        total: ready.len(),
        tasks: ready.to_vec(),
    };
    emit_success(ctx.output, "ready", &output, Some(&human))
}

pub async fn run_status(global: GlobalOptions, id: String, status: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;
    let status: TaskStatus = status.parse()?;

    let mut human = HumanOutput::new("Task status updated");
    let result = ctx.coordinator.transition(&task_id, status).await;
    let task = ctx.finish(&mut human, result)?;

    human.push_summary("ID", task.id());
    push_task_summary(&mut human, &task);
    emit_success(ctx.output, "status", &task, Some(&human))
}

pub async fn run_toggle(global: GlobalOptions, id: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;

    let mut human = HumanOutput::new("Task toggled");
    let result = ctx.coordinator.toggle_complete(&task_id).await;
    let task = ctx.finish(&mut human, result)?;

    human.push_summary("ID", task.id());
    push_task_summary(&mut human, &task);
    emit_success(ctx.output, "toggle", &task, Some(&human))
}

pub async fn run_edit(global: GlobalOptions, options: EditOptions) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &options.id)?;
    let description = if options.clear_description {
        Some(None)
    } else {
        options.description.map(Some)
    };
    let due_date = if options.clear_due {
        Some(None)
    } else {
        options.due.as_deref().map(parse_due_date).transpose()?.map(Some)
    };
    let patch = TaskPatch {
        title: options.title,
        description,
        status: None,
        priority: options.priority.as_deref().map(str::parse::<Priority>).transpose()?,
        due_date,
    };
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to edit; pass at least one field flag".to_string(),
        ));
    }

    let mut human = HumanOutput::new("Task updated");
    let result = ctx.coordinator.update_task(&task_id, patch).await;
    let task = ctx.finish(&mut human, result)?;

    human.push_summary("ID", task.id());
    push_task_summary(&mut human, &task);
    emit_success(ctx.output, "edit", &task, Some(&human))
}

pub async fn run_delete(global: GlobalOptions, id: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;

    let mut human = HumanOutput::new("Task deleted");
    let result = ctx.coordinator.delete_task(&task_id).await;
    let removal = ctx.finish(&mut human, result)?;

    let output = DeleteOutput {
        removed: removal.removed.iter().map(|task| task.id().to_string()).collect(),
        detached: removal.detached,
    };
    human.push_summary("Removed", output.removed.join(", "));
    if !output.detached.is_empty() {
        human.push_summary("Dependencies dropped from", output.detached.join(", "));
    }
    emit_success(ctx.output, "delete", &output, Some(&human))
}

pub async fn run_dep_add(
    global: GlobalOptions,
    id: String,
    depends_on: String,
    kind: String,
) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;
    let target_id = resolve_task_id(ctx.store(), &depends_on)?;
    let kind: DependencyType = kind.parse()?;

    let mut human = HumanOutput::new("Dependency added");
    let result = ctx
        .coordinator
        .add_dependency(&task_id, &target_id, kind)
        .await;
    ctx.finish(&mut human, result)?;

    human.push_summary("Edge", format!("{task_id} {kind} {target_id}"));
    if kind.is_blocking() && !ctx.store().is_satisfied(&task_id) {
        human.push_warning(format!("{task_id} is now blocked"));
    }
    let output = DependencyOutput {
        id: task_id,
        depends_on: target_id,
        kind: Some(kind),
        changed: true,
    };
    emit_success(ctx.output, "dep add", &output, Some(&human))
}

pub async fn run_dep_rm(global: GlobalOptions, id: String, depends_on: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;
    let target_id = resolve_task_id(ctx.store(), &depends_on)?;

    let mut human = HumanOutput::new("Dependency removed");
    let result = ctx
        .coordinator
        .remove_dependency(&task_id, &target_id)
        .await;
    let changed = ctx.finish(&mut human, result)?;
    if !changed {
        human.push_warning(format!("{task_id} had no dependency on {target_id}"));
    }

    let output = DependencyOutput {
        id: task_id,
        depends_on: target_id,
        kind: None,
        changed,
    };
    emit_success(ctx.output, "dep rm", &output, Some(&human))
}

pub async fn run_subtask_add(global: GlobalOptions, id: String, title: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;

    let mut human = HumanOutput::new("Subtask added");
    let result = ctx.coordinator.add_subtask(&task_id, &title).await;
    let subtask = ctx.finish(&mut human, result)?;

    human.push_summary("Task", task_id.clone());
    human.push_summary("Subtask", format!("{} {}", subtask.id, subtask.title));
    let output = SubtaskOutput {
        task_id,
        subtask: Some(subtask),
        changed: true,
    };
    emit_success(ctx.output, "subtask add", &output, Some(&human))
}

pub async fn run_subtask_toggle(
    global: GlobalOptions,
    id: String,
    subtask_id: String,
) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;

    let mut human = HumanOutput::new("Subtask toggled");
    let result = ctx.coordinator.toggle_subtask(&task_id, &subtask_id).await;
    let completed = ctx.finish(&mut human, result)?;

    let subtask = ctx
        .store()
        .get(&task_id)
        .and_then(|task| task.subtasks.into_iter().find(|s| s.id == subtask_id));
    human.push_summary("Task", task_id.clone());
    human.push_summary("Subtask", subtask_id);
    human.push_summary("Completed", completed.to_string());
    let output = SubtaskOutput {
        task_id,
        subtask,
        changed: true,
    };
    emit_success(ctx.output, "subtask toggle", &output, Some(&human))
}

pub async fn run_subtask_rm(global: GlobalOptions, id: String, subtask_id: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;

    let mut human = HumanOutput::new("Subtask deleted");
    let result = ctx.coordinator.delete_subtask(&task_id, &subtask_id).await;
    let removed = ctx.finish(&mut human, result)?;
    if removed.is_none() {
        human.push_warning(format!("{task_id} has no subtask {subtask_id}"));
    }

    human.push_summary("Task", task_id.clone());
    let output = SubtaskOutput {
        task_id,
        changed: removed.is_some(),
        subtask: removed,
    };
    emit_success(ctx.output, "subtask rm", &output, Some(&human))
}

pub async fn run_assign(
    global: GlobalOptions,
    id: String,
    user_id: String,
    name: Option<String>,
) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;
    let name = name.unwrap_or_else(|| user_id.clone());

    let mut human = HumanOutput::new("Assignee added");
    let result = ctx
        .coordinator
        .add_assignee(&task_id, Assignee::new(user_id.clone(), name))
        .await;
    ctx.finish(&mut human, result)?;

    human.push_summary("Task", task_id.clone());
    human.push_summary("User", user_id.clone());
    let output = AssigneeOutput {
        task_id,
        user_id,
        changed: true,
    };
    emit_success(ctx.output, "assign", &output, Some(&human))
}

pub async fn run_unassign(global: GlobalOptions, id: String, user_id: String) -> Result<()> {
    let mut ctx = load_context(&global).await?;
    let task_id = resolve_task_id(ctx.store(), &id)?;

    let mut human = HumanOutput::new("Assignee removed");
    let result = ctx.coordinator.remove_assignee(&task_id, &user_id).await;
    let removed = ctx.finish(&mut human, result)?;
    if removed.is_none() {
        human.push_warning(format!("{user_id} was not assigned to {task_id}"));
    }

    human.push_summary("Task", task_id.clone());
    human.push_summary("User", user_id.clone());
    let output = AssigneeOutput {
        task_id,
        user_id,
        changed: removed.is_some(),
    };
    emit_success(ctx.output, "unassign", &output, Some(&human))
}

/// Exact id, or a prefix matching exactly one task.
fn resolve_task_id(store: &SharedStore, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidArgument("task id cannot be empty".to_string()));
    }
    store.read(|store| {
        if store.contains(raw) {
            return Ok(raw.to_string());
        }
        let matches: Vec<String> = store
            .list()
            .iter()
            .map(|task| task.id().to_string())
            .filter(|id| id.starts_with(raw))
            .collect();
        match matches.as_slice() {
            [] => Err(Error::TaskNotFound(raw.to_string())),
            [only] => Ok(only.clone()),
            _ => Err(Error::InvalidArgument(format!(
                "task id '{raw}' is ambiguous: {}",
                matches.join(", ")
            ))),
        }
    })
}

fn task_line(task: &Task) -> String {
    format!(
        "[{}][{}] {} {}",
        task.status(),
        task.record.priority,
        task.id(),
        task.record.title
    )
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("Title", task.record.title.clone());
    human.push_summary("Status", task.status().to_string());
    human.push_summary("Priority", task.record.priority.to_string());
    if let Some(due) = task.record.due_date {
        human.push_summary("Due", due.to_rfc3339());
    }
    if let Some(parent) = task.parent_id() {
        human.push_summary("Parent", parent);
    }
    if !task.subtasks.is_empty() {
        let done = task.subtasks.iter().filter(|s| s.completed).count();
        human.push_summary("Subtasks", format!("{done}/{}", task.subtasks.len()));
    }
    if !task.assignees.is_empty() {
        let users: Vec<&str> = task.assignees.iter().map(|a| a.user_id.as_str()).collect();
        human.push_summary("Assignees", users.join(", "));
    }
    human.push_summary("Updated", task.record.updated_at.to_rfc3339());
}
