use std::fs;
use std::time::Duration;

use taskflow::config::{Config, CONFIG_FILE_NAME};
use taskflow::model::{Priority, TaskStatus};
use taskflow::CoordinatorOptions;

#[test]
fn load_from_root_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = Config::load_from_root(dir.path());
    assert_eq!(cfg.tasks.id_prefix, "tf");
    assert_eq!(cfg.tasks.reopen_status, TaskStatus::InProgress);
    assert_eq!(cfg.store.resolve(dir.path()), dir.path().join(".taskflow/tasks.json"));
}

#[test]
fn load_from_root_defaults_on_invalid_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "tasks = 123").expect("write invalid config");

    let cfg = Config::load_from_root(dir.path());
    assert_eq!(cfg.tasks.id_prefix, "tf");
    assert!(!cfg.tasks.enforce_readiness);
}

#[test]
fn load_from_root_defaults_on_completed_reopen_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    let content = r#"
[tasks]
reopen_status = "completed"
"#;
    fs::write(&path, content.trim()).expect("write invalid reopen status");

    let cfg = Config::load_from_root(dir.path());
    assert_eq!(cfg.tasks.reopen_status, TaskStatus::InProgress);
}

#[test]
fn load_reads_every_section() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    let content = r#"
[tasks]
id_prefix = "ops"
default_status = "in-progress"
default_priority = "high"
reopen_status = "to-do"
enforce_readiness = true

[remote]
timeout_ms = 250

[store]
path = "/var/lib/taskflow/tasks.json"
"#;
    fs::write(&path, content.trim()).expect("write config");

    let cfg = Config::load(&path).expect("load");
    assert_eq!(cfg.tasks.id_prefix, "ops");
    assert_eq!(cfg.tasks.default_priority, Priority::High);
    assert_eq!(cfg.tasks.reopen_status, TaskStatus::ToDo);
    assert_eq!(
        cfg.store.resolve(dir.path()),
        std::path::PathBuf::from("/var/lib/taskflow/tasks.json")
    );

    let options = CoordinatorOptions::from_config(&cfg);
    assert_eq!(options.remote_timeout, Duration::from_millis(250));
    assert!(options.enforce_readiness);
    assert_eq!(options.default_status, TaskStatus::InProgress);
}

#[test]
fn load_rejects_zero_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[remote]\ntimeout_ms = 0").expect("write config");

    let err = Config::load(&path).expect_err("zero timeout");
    assert_eq!(err.kind(), "invalid_config");
}
