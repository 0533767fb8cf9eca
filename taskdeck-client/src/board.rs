use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskdeck_core::due_date::{compose_optional, find_overdue, relative_label, DueLabel};
use taskdeck_core::{CreateTaskRequest, StatusCounts, Task, TaskStatus, UpdateTaskRequest};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::api::TaskApi;
use crate::errors::{ClientError, ClientResult};
use crate::events::{BoardEvent, EventDispatcher};
use crate::session::SessionStore;

#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Delay between starting the reconciler and its first overdue sweep.
    pub initial_sweep_delay: Duration,
    pub sweep_interval: Duration,
    pub refresh_interval: Duration,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            initial_sweep_delay: Duration::from_millis(1500),
            sweep_interval: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(300),
        }
    }
}

/// Form input for a new task. The due date is kept as picker values and
/// composed only when sent.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due_date: String,
    pub due_time: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due(mut self, date: impl Into<String>, time: Option<&str>) -> Self {
        self.due_date = date.into();
        self.due_time = time.map(String::from);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn to_request(&self) -> CreateTaskRequest {
        CreateTaskRequest {
            title: Some(self.title.clone()),
            description: self.description.clone(),
            status: self.status.map(|s| s.to_string()),
            due_date: compose_optional(&self.due_date, self.due_time.as_deref()),
        }
    }
}

/// Fields to change on an existing task. `None` leaves a field alone;
/// `Some(None)` clears an optional one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<String>>,
}

impl TaskEdit {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    /// An empty date clears the due date.
    pub fn due(mut self, date: &str, time: Option<&str>) -> Self {
        self.due_date = Some(compose_optional(date, time));
        self
    }

    pub fn to_request(&self) -> UpdateTaskRequest {
        UpdateTaskRequest {
            title: self.title.clone().map(Some),
            description: self.description.clone(),
            status: self.status.map(|s| Some(s.to_string())),
            due_date: self.due_date.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub marked: Vec<Uuid>,
    /// Tasks whose overdue update failed; they are now pending locally.
    pub rolled_back: Vec<Uuid>,
    /// Another sweep or refresh was running, so nothing was done.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Replaced,
    Unchanged,
    /// Local state changed while the fetch was in flight; the fetched list was dropped.
    Superseded,
    Skipped,
}

#[derive(Default)]
struct BoardState {
    tasks: Vec<Task>,
    // Bumped on every local change.
    version: u64,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The signed-in user's task list and every operation on it.
pub struct TaskBoard<A: TaskApi> {
    api: Arc<A>,
    state: Arc<RwLock<BoardState>>,
    events: Arc<EventDispatcher>,
    in_flight: Arc<AtomicBool>,
    session: Option<Arc<SessionStore>>,
}

impl<A: TaskApi> Clone for TaskBoard<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            in_flight: self.in_flight.clone(),
            session: self.session.clone(),
        }
    }
}

impl<A: TaskApi> TaskBoard<A> {
    pub fn new(api: Arc<A>, events: Arc<EventDispatcher>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(BoardState::default())),
            events,
            in_flight: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    /// Clears this session when the server rejects the credential.
    pub fn with_session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub async fn load(&self) -> ClientResult<Vec<Task>> {
        match self.api.list_tasks().await {
            Ok(tasks) => {
                let count = tasks.len();
                {
                    let mut state = self.state.write().await;
                    state.tasks = tasks.clone();
                    state.version += 1;
                }
                tracing::debug!(count, "loaded tasks");
                self.events.emit(BoardEvent::TasksChanged { count });
                Ok(tasks)
            }
            Err(e) => {
                tracing::warn!(%e, "failed to load tasks");
                if e.is_unauthorized() {
                    self.expire_session().await;
                }
                self.events.emit(BoardEvent::read_failed(&e));
                Err(e)
            }
        }
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.clone()
    }

    pub async fn task(&self, id: Uuid) -> Option<Task> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub async fn status_counts(&self) -> StatusCounts {
        StatusCounts::tally(self.state.read().await.tasks.iter())
    }

    pub async fn add_task(&self, draft: TaskDraft) -> ClientResult<Task> {
        let task = match self.api.create_task(&draft.to_request()).await {
            Ok(task) => task,
            Err(e) => return Err(self.write_failed(e).await),
        };

        let count = {
            let mut state = self.state.write().await;
            state.tasks.insert(0, task.clone());
            state.version += 1;
            state.tasks.len()
        };
        tracing::info!(task_id = %task.id, "added task");
        self.events.emit(BoardEvent::TasksChanged { count });
        Ok(task)
    }

    pub async fn edit_task(&self, id: Uuid, edit: TaskEdit) -> ClientResult<Task> {
        let task = match self.api.update_task(id, &edit.to_request()).await {
            Ok(task) => task,
            Err(e) => return Err(self.write_failed(e).await),
        };

        let count = self.replace(task.clone()).await;
        self.events.emit(BoardEvent::TasksChanged { count });
        Ok(task)
    }

    /// Quick status change from the list view.
    pub async fn set_status(&self, id: Uuid, status: TaskStatus) -> ClientResult<Task> {
        self.edit_task(id, TaskEdit::status(status)).await
    }

    pub async fn delete_task(&self, id: Uuid) -> ClientResult<()> {
        if let Err(e) = self.api.delete_task(id).await {
            return Err(self.write_failed(e).await);
        }

        let count = {
            let mut state = self.state.write().await;
            state.tasks.retain(|t| t.id != id);
            state.version += 1;
            state.tasks.len()
        };
        tracing::info!(task_id = %id, "deleted task");
        self.events.emit(BoardEvent::TasksChanged { count });
        Ok(())
    }

    /// Marks every past-due, unfinished task overdue and pushes each change.
    /// A failed push leaves the task pending, whatever it was before.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> SweepReport {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("sweep skipped; reconciliation already in flight");
            return SweepReport {
                skipped: true,
                ..SweepReport::default()
            };
        };

        let due = {
            let mut state = self.state.write().await;
            let due = find_overdue(&state.tasks, now);
            for task in state.tasks.iter_mut().filter(|t| due.contains(&t.id)) {
                task.status = TaskStatus::Overdue;
            }
            if !due.is_empty() {
                state.version += 1;
            }
            due
        };

        let mut report = SweepReport::default();
        let mut session_expired = false;
        let request = UpdateTaskRequest::status(TaskStatus::Overdue.to_string());
        for id in due {
            match self.api.update_task(id, &request).await {
                Ok(task) => {
                    self.replace(task).await;
                    report.marked.push(id);
                    self.events.emit(BoardEvent::OverdueMarked { task_id: id });
                }
                Err(e) => {
                    tracing::warn!(task_id = %id, %e, "failed to mark task overdue");
                    self.set_local_status(id, TaskStatus::Pending).await;
                    report.rolled_back.push(id);
                    if e.is_unauthorized() && !session_expired {
                        session_expired = true;
                        self.expire_session().await;
                    }
                }
            }
        }

        if !report.marked.is_empty() || !report.rolled_back.is_empty() {
            let count = self.state.read().await.tasks.len();
            self.events.emit(BoardEvent::TasksChanged { count });
        }
        report
    }

    /// Re-fetches the list and adopts it only when it differs from what is
    /// shown and nothing changed locally in the meantime.
    pub async fn refresh(&self) -> ClientResult<RefreshOutcome> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            return Ok(RefreshOutcome::Skipped);
        };

        let version = self.state.read().await.version;
        let tasks = match self.api.list_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(%e, "background refresh failed");
                if e.is_unauthorized() {
                    self.expire_session().await;
                }
                return Err(e);
            }
        };
        let incoming = serde_json::to_string(&tasks)?;

        let count = {
            let mut state = self.state.write().await;
            if state.version != version {
                return Ok(RefreshOutcome::Superseded);
            }
            if serde_json::to_string(&state.tasks)? == incoming {
                return Ok(RefreshOutcome::Unchanged);
            }
            state.tasks = tasks;
            state.version += 1;
            state.tasks.len()
        };

        tracing::debug!(count, "adopted refreshed task list");
        self.events.emit(BoardEvent::TasksChanged { count });
        Ok(RefreshOutcome::Replaced)
    }

    /// Starts the single background task that sweeps and refreshes on a
    /// schedule. Call after [`TaskBoard::load`].
    pub fn spawn_reconciler(&self, config: BoardConfig) -> ReconcilerHandle {
        let board = self.clone();
        ReconcilerHandle {
            handle: tokio::spawn(board.reconcile(config)),
        }
    }

    async fn reconcile(self, config: BoardConfig) {
        let min = Duration::from_millis(1);
        let sweep_every = config.sweep_interval.max(min);
        let refresh_every = config.refresh_interval.max(min);

        tokio::time::sleep(config.initial_sweep_delay).await;
        self.log_sweep(self.sweep_overdue(Utc::now()).await);

        let start = Instant::now();
        let mut sweep = tokio::time::interval_at(start + sweep_every, sweep_every);
        let mut refresh = tokio::time::interval_at(start + refresh_every, refresh_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.log_sweep(self.sweep_overdue(Utc::now()).await);
                }
                _ = refresh.tick() => {
                    match self.refresh().await {
                        Ok(outcome) => tracing::debug!(?outcome, "refresh finished"),
                        Err(e) => tracing::debug!(%e, "refresh failed"),
                    }
                }
            }
        }
    }

    fn log_sweep(&self, report: SweepReport) {
        if !report.marked.is_empty() || !report.rolled_back.is_empty() {
            tracing::info!(
                marked = report.marked.len(),
                rolled_back = report.rolled_back.len(),
                "overdue sweep finished"
            );
        }
    }

    async fn replace(&self, task: Task) -> usize {
        let mut state = self.state.write().await;
        if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == task.id) {
            *slot = task;
        }
        state.version += 1;
        state.tasks.len()
    }

    async fn set_local_status(&self, id: Uuid, status: TaskStatus) {
        let mut state = self.state.write().await;
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
        }
        state.version += 1;
    }

    async fn write_failed(&self, error: ClientError) -> ClientError {
        tracing::warn!(%error, "task write failed");
        if error.is_unauthorized() {
            self.expire_session().await;
        }
        self.events.emit(BoardEvent::write_failed(&error));
        error
    }

    async fn expire_session(&self) {
        if let Some(session) = &self.session {
            if let Err(e) = session.clear().await {
                tracing::error!(%e, "failed to clear expired session");
            }
        }
        self.events.emit(BoardEvent::SessionExpired);
    }
}

/// Label for a task's due date, if it has one.
pub fn due_label(task: &Task, now: DateTime<Utc>) -> Option<DueLabel> {
    task.due_date.map(|due| relative_label(due, now))
}

/// Owns the reconciler task; dropping it stops the task.
pub struct ReconcilerHandle {
    handle: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn shutdown(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
