mod common;

use common::{cache_path, cached_tasks, date, harness, Call, Harness, Op};
use taskvault_core::{MutationOutcome, RemoteError, TaskFilter, TaskId, TaskPatch};

fn network_down() -> RemoteError {
    RemoteError::Transient("connection refused".to_string())
}

#[tokio::test]
async fn offline_add_keeps_temporary_task_pending_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, false);

    let outcome = h.service.add_task("Buy milk", None).await;

    assert_eq!(outcome, MutationOutcome::Queued);
    let tasks = h.service.tasks();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].is_temporary());
    assert!(tasks[0].pending_sync);
    assert_eq!(tasks[0].title, "Buy milk");
    assert!(h.gateway.calls().is_empty());
    assert_eq!(cached_tasks(&path), tasks);
}

#[tokio::test]
async fn online_add_adopts_server_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);

    let outcome = h
        .service
        .add_task("Ship report", Some(date("2025-01-10")))
        .await;

    assert_eq!(outcome, MutationOutcome::Confirmed);
    let tasks = h.service.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::Server(1));
    assert!(!tasks[0].pending_sync);
    assert_eq!(tasks[0].due_date, Some(date("2025-01-10")));
    assert_eq!(h.gateway.calls(), vec![Call::Create("Ship report".to_string())]);
    assert_eq!(cached_tasks(&path), tasks);
}

#[tokio::test]
async fn blank_title_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);

    assert_eq!(h.service.add_task("   ", None).await, MutationOutcome::Ignored);
    assert!(h.service.tasks().is_empty());
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn transient_add_failure_while_online_drops_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    h.gateway.fail_next(Op::Create, network_down());

    let outcome = h.service.add_task("Call plumber", None).await;

    assert_eq!(outcome, MutationOutcome::Dropped(network_down()));
    assert!(h.service.tasks().is_empty());
    assert!(cached_tasks(&path).is_empty());
}

#[tokio::test]
async fn rejected_add_removes_optimistic_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    let rejection = RemoteError::from_status(400, "title too long");
    h.gateway.fail_next(Op::Create, rejection.clone());

    let outcome = h.service.add_task("Too long", None).await;

    assert_eq!(outcome, MutationOutcome::Dropped(rejection));
    assert!(h.service.tasks().is_empty());
    assert!(cached_tasks(&path).is_empty());
}

#[tokio::test]
async fn unauthorized_add_forces_logout() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    h.service.add_task("Existing", None).await;
    h.gateway.fail_next(Op::Create, RemoteError::Unauthorized);

    let outcome = h.service.add_task("Rejected token", None).await;

    assert_eq!(outcome, MutationOutcome::LoggedOut);
    assert!(h.service.tasks().is_empty());
    assert!(!h.ctx.has_token());
    assert!(cached_tasks(&path).is_empty());
}

#[tokio::test]
async fn unauthorized_reply_from_previous_session_keeps_new_login() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    let ctx = h.ctx.clone();
    let credentials = h.credentials.clone();
    h.gateway.on_call(move |op| {
        if op == Op::Create {
            ctx.logout();
            credentials.set(Some("token-2".to_string()));
        }
    });
    h.gateway.fail_next(Op::Create, RemoteError::Unauthorized);

    let outcome = h.service.add_task("Sent before logout", None).await;

    assert_eq!(outcome, MutationOutcome::LoggedOut);
    assert!(h.ctx.has_token());
    assert!(h.service.tasks().is_empty());
}

#[tokio::test]
async fn failed_online_toggle_reverts_memory_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    h.gateway.seed(7, "Water plants", false);
    h.orchestrator.load_and_sync().await;
    h.gateway.fail_next(Op::Update, network_down());

    let outcome = h
        .service
        .toggle_complete(&TaskId::Server(7), true)
        .await;

    assert_eq!(outcome, MutationOutcome::Reverted(network_down()));
    let tasks = h.service.tasks();
    assert!(!tasks[0].completed);
    assert!(!tasks[0].pending_sync);
    assert!(!cached_tasks(&path)[0].completed);
}

#[tokio::test]
async fn online_toggle_sends_completed_only_patch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(7, "Water plants", false);
    h.orchestrator.load_and_sync().await;
    h.gateway.clear_calls();

    let outcome = h.service.toggle_complete(&TaskId::Server(7), true).await;

    assert_eq!(outcome, MutationOutcome::Confirmed);
    assert_eq!(
        h.gateway.calls(),
        vec![Call::Update(7, TaskPatch::completed(true))]
    );
    assert!(h.service.tasks()[0].completed);
    assert!(h.gateway.server_tasks()[0].completed);
}

#[tokio::test]
async fn offline_toggle_marks_pending_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    h.gateway.seed(7, "Water plants", false);
    h.orchestrator.load_and_sync().await;
    h.orchestrator.set_online(false).await;
    h.gateway.clear_calls();

    let outcome = h.service.toggle_complete(&TaskId::Server(7), true).await;

    assert_eq!(outcome, MutationOutcome::Queued);
    assert!(h.gateway.calls().is_empty());
    let cached = cached_tasks(&path);
    assert!(cached[0].completed);
    assert!(cached[0].pending_sync);
}

#[tokio::test]
async fn toggle_on_pending_task_carries_earlier_offline_edit() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(7, "Water plants", false);
    h.orchestrator.load_and_sync().await;
    leave_offline_edit_pending(&h).await;
    h.gateway.clear_calls();

    let outcome = h.service.toggle_complete(&TaskId::Server(7), true).await;

    assert_eq!(outcome, MutationOutcome::Confirmed);
    let calls = h.gateway.calls();
    let Call::Update(7, patch) = &calls[0] else {
        panic!("expected update call, got {calls:?}");
    };
    assert_eq!(patch.title.as_deref(), Some("Water all plants"));
    assert_eq!(patch.completed, Some(true));
    let task = &h.service.tasks()[0];
    assert_eq!(task.title, "Water all plants");
    assert!(!task.pending_sync);
}

/// Edits task 7 while offline, then reconnects with a flush that fails.
async fn leave_offline_edit_pending(h: &Harness) {
    h.orchestrator.set_online(false).await;
    h.service
        .edit_task(&TaskId::Server(7), "Water all plants", None)
        .await;
    h.gateway.fail_next(Op::Update, network_down());
    h.gateway.fail_next(Op::List, network_down());
    h.orchestrator.set_online(true).await;
}

#[tokio::test]
async fn temporary_toggle_stays_local() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), false);
    h.service.add_task("Draft", None).await;
    let id = h.service.tasks()[0].id.clone();

    let outcome = h.service.toggle_complete(&id, true).await;

    assert_eq!(outcome, MutationOutcome::LocalOnly);
    assert!(h.gateway.calls().is_empty());
    assert!(h.service.tasks()[0].pending_sync);
}

#[tokio::test]
async fn deleting_temporary_task_never_calls_remote() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, false);
    h.service.add_task("Scratch", None).await;
    let id = h.service.tasks()[0].id.clone();

    let outcome = h.service.delete_task(&id).await;

    assert_eq!(outcome, MutationOutcome::LocalOnly);
    assert!(h.service.tasks().is_empty());
    assert!(h.service.pending_deletes().is_empty());
    assert!(h.gateway.calls().is_empty());
    assert!(cached_tasks(&path).is_empty());
}

#[tokio::test]
async fn offline_delete_queues_record() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(42, "Old chore", false);
    h.orchestrator.load_and_sync().await;
    h.orchestrator.set_online(false).await;

    let outcome = h.service.delete_task(&TaskId::Server(42)).await;

    assert_eq!(outcome, MutationOutcome::Queued);
    assert!(h.service.tasks().is_empty());
    assert_eq!(h.service.pending_deletes().len(), 1);
    assert_eq!(h.service.pending_deletes()[0].id, 42);
}

#[tokio::test]
async fn failed_online_delete_restores_original_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    h.gateway.seed(1, "First", false);
    h.gateway.seed(2, "Second", false);
    h.gateway.seed(3, "Third", false);
    h.orchestrator.load_and_sync().await;
    let before = h.service.tasks();
    h.gateway.fail_next(Op::Delete, network_down());

    let outcome = h.service.delete_task(&TaskId::Server(2)).await;

    assert_eq!(outcome, MutationOutcome::Reverted(network_down()));
    assert_eq!(h.service.tasks(), before);
    assert_eq!(cached_tasks(&path), before);
    assert!(h.service.pending_deletes().is_empty());
}

#[tokio::test]
async fn delete_of_already_removed_task_counts_as_success() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(5, "Gone soon", false);
    h.orchestrator.load_and_sync().await;
    h.gateway
        .fail_next(Op::Delete, RemoteError::from_status(404, "Not found."));

    let outcome = h.service.delete_task(&TaskId::Server(5)).await;

    assert_eq!(outcome, MutationOutcome::Confirmed);
    assert!(h.service.tasks().is_empty());
}

#[tokio::test]
async fn edit_updates_fields_and_leaves_edit_mode() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(9, "Read book", false);
    h.orchestrator.load_and_sync().await;
    let id = TaskId::Server(9);
    assert!(h.service.begin_edit(&id));

    let outcome = h
        .service
        .edit_task(&id, "  Read two books ", Some(date("2025-03-01")))
        .await;

    assert_eq!(outcome, MutationOutcome::Confirmed);
    assert_eq!(h.service.editing(), None);
    let task = &h.service.tasks()[0];
    assert_eq!(task.title, "Read two books");
    assert_eq!(task.due_date, Some(date("2025-03-01")));
    assert_eq!(
        h.gateway.calls().last(),
        Some(&Call::Update(
            9,
            TaskPatch::details("Read two books", Some(date("2025-03-01")))
        ))
    );
}

#[tokio::test]
async fn blank_edit_is_ignored_and_keeps_edit_mode() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(9, "Read book", false);
    h.orchestrator.load_and_sync().await;
    let id = TaskId::Server(9);
    h.service.begin_edit(&id);

    assert_eq!(h.service.edit_task(&id, " ", None).await, MutationOutcome::Ignored);
    assert_eq!(h.service.editing(), Some(id));
    assert_eq!(h.service.tasks()[0].title, "Read book");
}

#[tokio::test]
async fn failed_edit_reverts_title_and_due_date() {
    let dir = tempfile::tempdir().unwrap();
    let path = cache_path(&dir);
    let h = harness(&path, true);
    h.gateway.seed(9, "Read book", false);
    h.orchestrator.load_and_sync().await;
    h.gateway.fail_next(Op::Update, network_down());
    let id = TaskId::Server(9);
    h.service.begin_edit(&id);

    let outcome = h.service.edit_task(&id, "Read", Some(date("2025-03-01"))).await;

    assert_eq!(outcome, MutationOutcome::Reverted(network_down()));
    assert_eq!(h.service.editing(), None);
    let cached = cached_tasks(&path);
    assert_eq!(cached[0].title, "Read book");
    assert_eq!(cached[0].due_date, None);
}

#[tokio::test]
async fn begin_edit_rejects_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), false);

    assert!(!h.service.begin_edit(&TaskId::Server(404)));
    assert_eq!(h.service.editing(), None);
}

#[tokio::test]
async fn visible_tasks_applies_filter() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), true);
    h.gateway.seed(1, "Done already", true);
    h.gateway.seed(2, "Still open", false);
    h.orchestrator.load_and_sync().await;

    let completed = h.service.visible_tasks(TaskFilter::Completed);
    let pending = h.service.visible_tasks(TaskFilter::Pending);

    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].title, "Done already");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "Still open");
    assert_eq!(h.service.visible_tasks(TaskFilter::All).len(), 2);
}

#[tokio::test]
async fn subscribers_see_every_committed_change() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&cache_path(&dir), false);
    let mut updates = h.service.subscribe();

    h.service.add_task("Watch me", None).await;

    assert!(updates.has_changed().unwrap());
    let snapshot = updates.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].title, "Watch me");
}
