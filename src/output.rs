//! Output envelopes for taskflow commands.
//!
//! With `--json` every command prints one envelope on stdout:
//! `{schema_version, command, status, data | error, next_steps}`.
//! Without it, commands print a short report built from [`HumanOutput`].

use serde::Serialize;

use crate::error::Result;

pub const SCHEMA_VERSION: &str = "taskflow.v1";

/// `--json` and `--quiet` as resolved for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Plain-text report of one task operation: a header line (`Task created`),
/// `key: value` summary rows for the affected task, detail lines for task
/// listings, then warnings (such as a failed event write) and suggested
/// follow-up commands.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

/// Print the result of a task command. JSON mode wraps `data` (a task, a
/// listing, a removal) in the success envelope and carries the report's
/// warnings and next steps along; quiet mode prints nothing.
pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let warnings = human.map(|h| h.warnings.clone()).unwrap_or_default();
        let next_steps = human.map(|h| h.next_steps.clone()).unwrap_or_default();

        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            data: &'a T,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            warnings: Vec<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings,
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

/// Print a failed task command: the JSON error envelope with the error's
/// kind, exit code and details, or `error:` and `hint:` lines on stderr.
pub fn emit_error(command: &str, err: &crate::error::Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    let hint = next_steps.first().map(|step| step.as_str());
    if json {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            message: &'a str,
            code: i32,
            kind: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<serde_json::Value>,
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            error: ErrorBody<'a>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: ErrorBody {
                message: &err.to_string(),
                code: err.exit_code(),
                kind: err.kind(),
                details: err.details(),
            },
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = Vec::new();
    lines.push(output.header.clone());

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

/// `new`, `dep add`, ... from raw arguments, skipping global flags.
fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut args = args.into_iter();
    let mut command = None;
    let mut subcommand = None;

    while let Some(arg) = args.next() {
        if arg.starts_with('-') {
            if matches!(arg.as_str(), "--root" | "--events") {
                args.next();
            }
            continue;
        }
        command = Some(arg);
        break;
    }

    let command = match command {
        Some(cmd) => cmd,
        None => return "taskflow".to_string(),
    };

    if matches!(command.as_str(), "dep" | "subtask") {
        for arg in args.by_ref() {
            if arg.starts_with('-') {
                continue;
            }
            subcommand = Some(arg);
            break;
        }
    }

    if let Some(sub) = subcommand {
        format!("{command} {sub}")
    } else {
        command
    }
}

fn error_next_steps(err: &crate::error::Error) -> Vec<String> {
    use crate::error::Error;

    match err {
        Error::TaskNotFound(_) => vec!["taskflow list".to_string()],
        Error::InvalidConfig(_) => vec!["fix .taskflow.toml then retry".to_string()],
        Error::DependenciesIncomplete { task_id, .. } => {
            vec![format!("taskflow show {task_id}")]
        }
        Error::ConcurrentOperation { .. } => {
            vec!["retry once the in-flight operation finishes".to_string()]
        }
        Error::LockFailed(_) => vec!["retry; another taskflow process holds the store".to_string()],
        _ => Vec::new(),
    }
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}
