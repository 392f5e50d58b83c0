mod support;

use std::future::Future;

use tokio::sync::broadcast;

use support::{coordinator, create, FlakyRemote};
use taskflow::events::{Operation, Outcome, OutcomeEvent};
use taskflow::model::{Assignee, DependencyType, NewTask, TaskPatch, TaskStatus};
use taskflow::{Error, MutationCoordinator};

#[tokio::test]
async fn readiness_follows_blocker_completion() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let b = create(&coordinator, "B").await;

    coordinator
        .add_dependency(&a, &b, DependencyType::Blocks)
        .await
        .expect("a blocked by b");
    assert!(!coordinator.store().is_satisfied(&a));
    assert_eq!(coordinator.store().unsatisfied_dependencies(&a), vec![b.clone()]);

    coordinator
        .transition(&b, TaskStatus::Completed)
        .await
        .expect("complete b");
    assert!(coordinator.store().is_satisfied(&a));
    let ready: Vec<String> = coordinator
        .store()
        .ready()
        .iter()
        .map(|task| task.id().to_string())
        .collect();
    assert_eq!(ready, vec![a]);
}

#[tokio::test]
async fn reverse_edge_is_rejected_before_the_remote() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let b = create(&coordinator, "B").await;

    coordinator
        .add_dependency(&a, &b, DependencyType::Blocks)
        .await
        .expect("a -> b");
    let err = coordinator
        .add_dependency(&b, &a, DependencyType::Blocks)
        .await
        .expect_err("cycle");
    assert!(matches!(err, Error::CircularDependency(_)));

    let graph_edges = coordinator.store().read(|store| store.graph().edge_count());
    assert_eq!(graph_edges, 1);
    assert!(coordinator
        .store()
        .read(|store| store.graph().contains_edge(&a, &b)));
    assert_eq!(remote.call_count("add_dependency"), 1);
}

#[tokio::test]
async fn self_dependency_is_rejected() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;

    for kind in [DependencyType::Blocks, DependencyType::BlockedBy, DependencyType::Related] {
        let err = coordinator
            .add_dependency(&a, &a, kind)
            .await
            .expect_err("self edge");
        assert!(matches!(err, Error::CircularDependency(_)));
    }
    assert_eq!(remote.call_count("add_dependency"), 0);
}

#[tokio::test]
async fn blank_subtask_title_is_a_validation_error() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    coordinator.add_subtask(&a, "first").await.expect("subtask");

    let err = coordinator.add_subtask(&a, "").await.expect_err("blank");
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(coordinator.store().get(&a).expect("a").subtasks.len(), 1);
    assert_eq!(remote.call_count("add_subtask"), 1);
}

#[tokio::test]
async fn duplicate_assignee_is_informational() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let jane = Assignee::new("u1", "Jane");

    coordinator
        .add_assignee(&a, jane.clone())
        .await
        .expect("first assign");
    let err = coordinator
        .add_assignee(&a, jane)
        .await
        .expect_err("duplicate");
    assert!(matches!(err, Error::DuplicateAssignee { .. }));
    assert!(err.is_informational());
    assert_eq!(coordinator.store().get(&a).expect("a").assignees.len(), 1);
    assert_eq!(remote.call_count("add_assignee"), 1);
}

#[tokio::test]
async fn failed_toggle_rolls_back_and_reports() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let before = coordinator.store().get(&a).expect("a");
    let mut events = coordinator.subscribe();

    remote.fail("update_task");
    let err = coordinator.toggle_complete(&a).await.expect_err("remote down");
    assert!(matches!(err, Error::RemotePersist(_)));
    assert_eq!(coordinator.store().get(&a), Some(before.clone()));
    assert_eq!(before.status(), TaskStatus::ToDo);

    let event = events.try_recv().expect("outcome event");
    assert_eq!(event.operation, Operation::ToggleComplete);
    assert_eq!(event.task_id, a);
    assert_eq!(event.outcome, Outcome::Failure);
    assert_eq!(event.kind.as_deref(), Some("remote_persist"));
}

#[tokio::test]
async fn failed_update_restores_exact_task() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let b = create(&coordinator, "B").await;
    coordinator
        .add_dependency(&a, &b, DependencyType::Related)
        .await
        .expect("edge");
    coordinator.add_subtask(&a, "step").await.expect("subtask");
    coordinator
        .add_assignee(&a, Assignee::new("u1", "Jane"))
        .await
        .expect("assignee");
    let before = coordinator.store().get(&a).expect("a");

    remote.fail("update_task");
    let patch = TaskPatch {
        title: Some("Renamed".to_string()),
        description: Some(Some("details".to_string())),
        status: Some(TaskStatus::InReview),
        ..TaskPatch::default()
    };
    coordinator
        .update_task(&a, patch)
        .await
        .expect_err("remote down");

    let after = coordinator.store().get(&a).expect("a");
    assert_eq!(after, before);
    assert_eq!(
        serde_json::to_string(&after).expect("json"),
        serde_json::to_string(&before).expect("json")
    );
}

#[tokio::test]
async fn double_toggle_restores_status() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = coordinator
        .create_task(NewTask {
            status: Some(TaskStatus::InProgress),
            ..NewTask::new("A")
        })
        .await
        .expect("a")
        .id()
        .to_string();

    let first = coordinator.toggle_complete(&a).await.expect("complete");
    assert!(first.is_completed());
    assert!(first.record.completed_at.is_some());
    let second = coordinator.toggle_complete(&a).await.expect("reopen");
    assert_eq!(second.status(), TaskStatus::InProgress);
    assert!(!second.is_completed());
    assert_eq!(second.record.completed_at, None);
}

#[tokio::test]
async fn cascade_delete_leaves_no_dangling_references() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let parent = create(&coordinator, "Parent").await;
    let mut children = Vec::new();
    for title in ["Child 1", "Child 2"] {
        let child = coordinator
            .create_task(NewTask {
                parent_id: Some(parent.clone()),
                ..NewTask::new(title)
            })
            .await
            .expect("child");
        children.push(child.id().to_string());
    }
    let other = create(&coordinator, "Other").await;
    coordinator
        .add_dependency(&other, &parent, DependencyType::Blocks)
        .await
        .expect("incoming edge");

    let removal = coordinator.delete_task(&parent).await.expect("delete");
    assert_eq!(removal.removed.len(), 3);
    assert_eq!(removal.detached, vec![other.clone()]);

    coordinator.store().read(|store| {
        assert_eq!(store.len(), 1);
        assert_eq!(store.graph().edge_count(), 0);
        assert!(store.get(&other).expect("other").dependencies.is_empty());
        for child in &children {
            assert!(!store.contains(child));
        }
        store.check_invariants().expect("invariants");
    });
    assert_eq!(remote.tasks().len(), 1);
}

#[tokio::test]
async fn failed_delete_restores_the_subtree() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let parent = create(&coordinator, "Parent").await;
    coordinator
        .create_task(NewTask {
            parent_id: Some(parent.clone()),
            ..NewTask::new("Child")
        })
        .await
        .expect("child");
    let other = create(&coordinator, "Other").await;
    coordinator
        .add_dependency(&other, &parent, DependencyType::Blocks)
        .await
        .expect("edge");
    let before = coordinator.store().list().to_vec();

    remote.fail("delete_task");
    let err = coordinator.delete_task(&parent).await.expect_err("remote down");
    assert!(matches!(err, Error::RemotePersist(_)));
    assert_eq!(coordinator.store().list().to_vec(), before);
    coordinator
        .store()
        .read(|store| store.check_invariants())
        .expect("invariants");
}

#[tokio::test]
async fn failed_create_leaves_nothing_behind() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    remote.fail("create_task");

    let err = coordinator
        .create_task(NewTask::new("Ghost"))
        .await
        .expect_err("remote down");
    assert!(matches!(err, Error::RemotePersist(_)));
    assert!(coordinator.store().list().is_empty());
    assert!(remote.tasks().is_empty());
}

#[tokio::test]
async fn subtask_toggle_does_not_touch_parent_status() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let subtask = coordinator.add_subtask(&a, "only step").await.expect("subtask");

    let completed = coordinator
        .toggle_subtask(&a, &subtask.id)
        .await
        .expect("toggle");
    assert!(completed);
    let task = coordinator.store().get(&a).expect("a");
    assert!(task.subtasks[0].completed);
    assert_eq!(task.status(), TaskStatus::ToDo);
    assert!(remote.task(&a).expect("remote").subtasks[0].completed);
}

#[tokio::test]
async fn noop_removals_skip_the_remote() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let b = create(&coordinator, "B").await;

    assert!(!coordinator.remove_dependency(&a, &b).await.expect("edge"));
    assert!(coordinator
        .remove_assignee(&a, "nobody")
        .await
        .expect("assignee")
        .is_none());
    assert!(coordinator
        .delete_subtask(&a, "tf-missing")
        .await
        .expect("subtask")
        .is_none());
    assert_eq!(
        remote.calls(),
        vec!["create_task".to_string(), "create_task".to_string()]
    );
}

#[tokio::test]
async fn load_hydrates_from_remote() {
    let remote = FlakyRemote::new();
    let writer = coordinator(&remote);
    let a = create(&writer, "A").await;
    let b = create(&writer, "B").await;
    writer
        .add_dependency(&a, &b, DependencyType::Blocks)
        .await
        .expect("edge");

    let reader = coordinator(&remote);
    assert_eq!(reader.load().await.expect("load"), 2);
    assert!(!reader.store().is_satisfied(&a));
    assert_eq!(reader.store().list().to_vec(), remote.tasks());
}

/// Fail `method`, run `call`, and check the store is back to where it was.
async fn assert_rolls_back<F>(
    coordinator: &MutationCoordinator,
    remote: &FlakyRemote,
    events: &mut broadcast::Receiver<OutcomeEvent>,
    method: &str,
    operation: Operation,
    call: F,
) where
    F: Future<Output = Result<(), Error>>,
{
    let before = coordinator.store().list().to_vec();
    remote.fail(method);
    let err = call.await.expect_err(method);
    remote.recover(method);

    assert!(matches!(err, Error::RemotePersist(_)), "{method}: {err:?}");
    assert_eq!(coordinator.store().list().to_vec(), before, "{method}");
    let event = events.try_recv().expect("outcome event");
    assert_eq!(event.operation, operation);
    assert_eq!(event.outcome, Outcome::Failure);
    assert_eq!(event.kind.as_deref(), Some("remote_persist"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn every_component_mutation_rolls_back_on_remote_failure() {
    let remote = FlakyRemote::new();
    let coordinator = coordinator(&remote);
    let a = create(&coordinator, "A").await;
    let b = create(&coordinator, "B").await;
    let c = create(&coordinator, "C").await;
    coordinator
        .add_dependency(&a, &b, DependencyType::Blocks)
        .await
        .expect("edge");
    let step = coordinator.add_subtask(&a, "step").await.expect("subtask");
    coordinator
        .add_assignee(&a, Assignee::new("u1", "Jane"))
        .await
        .expect("assignee");
    let mut events = coordinator.subscribe();

    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "add_dependency",
        Operation::AddDependency,
        coordinator.add_dependency(&a, &c, DependencyType::Blocks),
    )
    .await;
    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "remove_dependency",
        Operation::RemoveDependency,
        async { coordinator.remove_dependency(&a, &b).await.map(|_| ()) },
    )
    .await;
    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "add_subtask",
        Operation::AddSubtask,
        async { coordinator.add_subtask(&a, "second").await.map(|_| ()) },
    )
    .await;
    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "toggle_subtask_completion",
        Operation::ToggleSubtask,
        async { coordinator.toggle_subtask(&a, &step.id).await.map(|_| ()) },
    )
    .await;
    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "delete_subtask",
        Operation::DeleteSubtask,
        async { coordinator.delete_subtask(&a, &step.id).await.map(|_| ()) },
    )
    .await;
    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "add_assignee",
        Operation::AddAssignee,
        coordinator.add_assignee(&a, Assignee::new("u2", "Ravi")),
    )
    .await;
    assert_rolls_back(
        &coordinator,
        &remote,
        &mut events,
        "remove_assignee",
        Operation::RemoveAssignee,
        async { coordinator.remove_assignee(&a, "u1").await.map(|_| ()) },
    )
    .await;

    let task = coordinator.store().get(&a).expect("a");
    assert_eq!(task.dependencies.len(), 1);
    assert_eq!(task.subtasks, vec![step]);
    assert_eq!(task.assignees.len(), 1);
}
