mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{at, board, Failure};
use taskdeck_client::{
    due_label, BoardConfig, BoardEvent, ClientDatabase, ClientError, RefreshOutcome, Session,
    SessionStore, TaskDraft, TaskEdit,
};
use taskdeck_core::{DueKind, TaskStatus, UserSummary};

#[tokio::test]
async fn test_sweep_marks_past_due_task_overdue() {
    let (board, api, events) = board();
    let task = api.task("Pay rent", TaskStatus::Pending, Some("2025-08-15T23:59:00Z"));
    api.seed(task.clone());
    board.load().await.unwrap();

    let report = board.sweep_overdue(at("2025-08-16T00:00:00Z")).await;

    assert_eq!(report.marked, vec![task.id]);
    assert!(report.rolled_back.is_empty());
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(board.task(task.id).await.unwrap().status, TaskStatus::Overdue);
    assert_eq!(api.server_tasks()[0].status, TaskStatus::Overdue);
    assert!(events
        .lock()
        .unwrap()
        .contains(&BoardEvent::OverdueMarked { task_id: task.id }));
}

#[tokio::test]
async fn test_failed_sweep_update_falls_back_to_pending() {
    let (board, api, _) = board();
    let task = api.task("Ship it", TaskStatus::InProgress, Some("2025-08-15T23:59:00Z"));
    api.seed(task.clone());
    board.load().await.unwrap();
    api.fail_writes(Failure::Network);

    let report = board.sweep_overdue(at("2025-08-16T00:00:00Z")).await;

    assert_eq!(report.rolled_back, vec![task.id]);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(board.task(task.id).await.unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_sweep_ignores_completed_overdue_and_future_tasks() {
    let (board, api, _) = board();
    api.seed(api.task("done", TaskStatus::Completed, Some("2025-08-01 10:00:00")));
    api.seed(api.task("late", TaskStatus::Overdue, Some("2025-08-01 10:00:00")));
    api.seed(api.task("later", TaskStatus::Pending, Some("2025-09-01 10:00:00")));
    api.seed(api.task("undated", TaskStatus::Pending, None));
    board.load().await.unwrap();

    let report = board.sweep_overdue(at("2025-08-16T00:00:00Z")).await;

    assert!(report.marked.is_empty());
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_add_task_composes_due_date_and_prepends() {
    let (board, api, _) = board();
    api.seed(api.task("older", TaskStatus::Pending, None));
    board.load().await.unwrap();

    let task = board
        .add_task(TaskDraft::new("Pay rent").due("2025-08-15", None))
        .await
        .unwrap();

    let sent = api.last_create.lock().unwrap().clone().unwrap();
    assert_eq!(sent.due_date.as_deref(), Some("2025-08-15 23:59:00"));
    assert_eq!(task.due_date, Some(at("2025-08-15T23:59:00Z")));

    let titles: Vec<_> = board.tasks().await.into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["Pay rent", "older"]);
}

#[tokio::test]
async fn test_write_failure_is_reported_and_state_kept() {
    let (board, api, events) = board();
    let task = api.task("keep me", TaskStatus::Pending, None);
    api.seed(task.clone());
    board.load().await.unwrap();
    api.fail_writes(Failure::Network);

    let err = board
        .set_status(task.id, TaskStatus::Completed)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(board.delete_task(task.id).await.is_err());

    assert_eq!(board.task(task.id).await.unwrap().status, TaskStatus::Pending);
    let write_failures = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, BoardEvent::WriteFailed { .. }))
        .count();
    assert_eq!(write_failures, 2);
}

#[tokio::test]
async fn test_edit_and_delete_update_local_state() {
    let (board, api, _) = board();
    let task = api.task("draft", TaskStatus::Pending, Some("2025-08-20 18:00:00"));
    api.seed(task.clone());
    board.load().await.unwrap();

    let edited = board
        .edit_task(task.id, TaskEdit::default().title("final").due("", None))
        .await
        .unwrap();
    assert_eq!(edited.title, "final");
    assert_eq!(edited.due_date, None);
    assert_eq!(board.task(task.id).await.unwrap().title, "final");

    board.delete_task(task.id).await.unwrap();
    assert!(board.tasks().await.is_empty());
}

#[tokio::test]
async fn test_read_failure_emits_retryable_banner() {
    let (board, api, events) = board();
    api.fail_reads(Failure::Network);

    assert!(board.load().await.is_err());
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&BoardEvent::ReadFailed {
            message: "Server error (503): Service Unavailable".into(),
            retryable: true,
        })
    );
}

#[tokio::test]
async fn test_unauthorized_clears_session() {
    let (board, api, events) = board();
    let db = ClientDatabase::new("sqlite::memory:").await.unwrap();
    db.run_migrations().await.unwrap();
    let session = Arc::new(SessionStore::restore(Arc::new(db)).await.unwrap());
    session
        .save(Session {
            token: "tdk_revoked".into(),
            user: UserSummary {
                id: api.user_id,
                name: "Ada".into(),
                email: "ada@example.com".into(),
                created_at: chrono::Utc::now(),
            },
        })
        .await
        .unwrap();
    let board = board.with_session(session.clone());
    api.fail_reads(Failure::Unauthorized);

    let err = board.load().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));
    assert!(!session.is_authenticated().await);
    assert!(events.lock().unwrap().contains(&BoardEvent::SessionExpired));
}

#[tokio::test]
async fn test_refresh_adopts_only_changed_payloads() {
    let (board, api, events) = board();
    let task = api.task("original", TaskStatus::Pending, None);
    api.seed(task.clone());
    board.load().await.unwrap();
    let changed_before = events.lock().unwrap().len();

    assert_eq!(board.refresh().await.unwrap(), RefreshOutcome::Unchanged);
    assert_eq!(events.lock().unwrap().len(), changed_before);

    api.edit_on_server(task.id, "edited elsewhere");
    assert_eq!(board.refresh().await.unwrap(), RefreshOutcome::Replaced);
    assert_eq!(board.task(task.id).await.unwrap().title, "edited elsewhere");
}

#[tokio::test]
async fn test_refresh_refreshes_an_empty_board() {
    let (board, api, _) = board();
    board.load().await.unwrap();

    api.seed(api.task("from another device", TaskStatus::Pending, None));
    assert_eq!(board.refresh().await.unwrap(), RefreshOutcome::Replaced);
    assert_eq!(board.tasks().await.len(), 1);
}

#[tokio::test]
async fn test_refresh_yields_to_local_edit_in_flight() {
    let (board, api, _) = board();
    let task = api.task("racing", TaskStatus::Pending, None);
    api.seed(task.clone());
    board.load().await.unwrap();
    api.edit_on_server(task.id, "stale server copy");
    api.delay_lists(Duration::from_millis(200));

    let (outcome, edited) = tokio::join!(board.refresh(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        board.set_status(task.id, TaskStatus::Completed).await
    });

    assert_eq!(outcome.unwrap(), RefreshOutcome::Superseded);
    assert_eq!(edited.unwrap().status, TaskStatus::Completed);
    assert_eq!(board.task(task.id).await.unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_sweep_is_skipped_while_refresh_in_flight() {
    let (board, api, _) = board();
    api.seed(api.task("late", TaskStatus::Pending, Some("2025-08-15 09:00:00")));
    board.load().await.unwrap();
    api.delay_lists(Duration::from_millis(200));

    let (_, report) = tokio::join!(board.refresh(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        board.sweep_overdue(at("2025-08-16T00:00:00Z")).await
    });

    assert!(report.skipped);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_status_counts_and_due_labels() {
    let (board, api, _) = board();
    api.seed(api.task("a", TaskStatus::Pending, Some("2025-08-17 12:00:00")));
    api.seed(api.task("b", TaskStatus::Completed, None));
    api.seed(api.task("c", TaskStatus::Overdue, Some("2025-08-10 12:00:00")));
    api.seed(api.task("d", TaskStatus::InProgress, None));
    board.load().await.unwrap();

    let counts = board.status_counts().await;
    assert_eq!(
        (counts.pending, counts.in_progress, counts.completed, counts.overdue),
        (1, 1, 1, 1)
    );
    assert_eq!(counts.total(), 4);

    let now = at("2025-08-16T12:00:00Z");
    let tasks = board.tasks().await;
    let label = |title: &str| {
        let task = tasks.iter().find(|t| t.title == title).unwrap();
        due_label(task, now)
    };
    assert_eq!(label("a").unwrap().text, "Due tomorrow");
    assert_eq!(label("c").unwrap().kind, DueKind::Overdue);
    assert_eq!(label("c").unwrap().text, "Overdue by 6 days");
    assert!(label("b").is_none());
}

#[tokio::test]
async fn test_reconciler_sweeps_on_schedule_and_stops_on_shutdown() {
    let (board, api, _) = board();
    let task = api.task("late", TaskStatus::Pending, Some("2020-01-01 00:00:00"));
    api.seed(task.clone());
    board.load().await.unwrap();

    let handle = board.spawn_reconciler(BoardConfig {
        initial_sweep_delay: Duration::from_millis(10),
        sweep_interval: Duration::from_millis(20),
        refresh_interval: Duration::from_millis(30),
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(board.task(task.id).await.unwrap().status, TaskStatus::Overdue);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    assert!(api.list_calls.load(Ordering::SeqCst) >= 2);

    handle.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let lists = api.list_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.list_calls.load(Ordering::SeqCst), lists);
}

#[tokio::test]
async fn test_dropping_reconciler_handle_stops_it() {
    let (board, api, _) = board();
    board.load().await.unwrap();

    let handle = board.spawn_reconciler(BoardConfig {
        initial_sweep_delay: Duration::from_millis(5),
        sweep_interval: Duration::from_millis(10),
        refresh_interval: Duration::from_millis(10),
    });
    drop(handle);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let lists = api.list_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(api.list_calls.load(Ordering::SeqCst), lists);
}
