use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskdeck_client::{ClientError, ClientResult, EventDispatcher, TaskApi, TaskBoard};
use taskdeck_core::due_date::parse_utc;
use taskdeck_core::{CreateTaskRequest, Task, TaskChanges, TaskStatus, UpdateTaskRequest};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum Failure {
    None,
    Network,
    Unauthorized,
}

impl Failure {
    fn error(self) -> Option<ClientError> {
        match self {
            Failure::None => None,
            Failure::Network => Some(ClientError::Server {
                status: 503,
                message: "Service Unavailable".into(),
            }),
            Failure::Unauthorized => Some(ClientError::Unauthorized),
        }
    }
}

/// In-process stand-in for the task endpoints.
pub struct FakeApi {
    pub user_id: Uuid,
    tasks: Mutex<Vec<Task>>,
    reads: Mutex<Failure>,
    writes: Mutex<Failure>,
    list_delay: Mutex<Option<Duration>>,
    pub list_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub last_create: Mutex<Option<CreateTaskRequest>>,
    pub listing: AtomicBool,
}

#[allow(dead_code)]
impl FakeApi {
    pub fn new() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            tasks: Mutex::new(Vec::new()),
            reads: Mutex::new(Failure::None),
            writes: Mutex::new(Failure::None),
            list_delay: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            last_create: Mutex::new(None),
            listing: AtomicBool::new(false),
        }
    }

    pub fn seed(&self, task: Task) {
        self.tasks.lock().unwrap().insert(0, task);
    }

    pub fn server_tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    /// Changes a task behind the board's back, as another device would.
    pub fn edit_on_server(&self, id: Uuid, title: &str) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.title = title.to_string();
        }
    }

    pub fn fail_reads(&self, failure: Failure) {
        *self.reads.lock().unwrap() = failure;
    }

    pub fn fail_writes(&self, failure: Failure) {
        *self.writes.lock().unwrap() = failure;
    }

    pub fn delay_lists(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn task(&self, title: &str, status: TaskStatus, due: Option<&str>) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            title: title.to_string(),
            description: None,
            status,
            due_date: due.and_then(parse_utc),
            created_at: now,
            updated_at: now,
        }
    }
}

impl TaskApi for FakeApi {
    async fn list_tasks(&self) -> ClientResult<Vec<Task>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            self.listing.store(true, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.listing.store(false, Ordering::SeqCst);
        }
        let failure = *self.reads.lock().unwrap();
        match failure.error() {
            Some(e) => Err(e),
            None => Ok(self.server_tasks()),
        }
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> ClientResult<Task> {
        *self.last_create.lock().unwrap() = Some(request.clone());
        let failure = *self.writes.lock().unwrap();
        if let Some(e) = failure.error() {
            return Err(e);
        }

        let status = request
            .status
            .as_deref()
            .map(|s| TaskStatus::from_str(s).unwrap())
            .unwrap_or_default();
        let mut task = self.task(request.title.as_deref().unwrap_or_default(), status, None);
        task.description = request.description.clone();
        task.due_date = request.due_date.as_deref().and_then(parse_utc);
        self.seed(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: Uuid, request: &UpdateTaskRequest) -> ClientResult<Task> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.writes.lock().unwrap();
        if let Some(e) = failure.error() {
            return Err(e);
        }

        let changes = TaskChanges {
            title: request.title.clone().flatten(),
            description: request.description.clone(),
            status: request
                .status
                .clone()
                .flatten()
                .map(|s| TaskStatus::from_str(&s).unwrap()),
            due_date: request
                .due_date
                .clone()
                .map(|raw| raw.as_deref().and_then(parse_utc)),
        };

        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(ClientError::NotFound)?;
        changes.apply_to(task);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> ClientResult<()> {
        let failure = *self.writes.lock().unwrap();
        if let Some(e) = failure.error() {
            return Err(e);
        }
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(ClientError::NotFound);
        }
        Ok(())
    }
}

/// A board over a fresh fake, with every event recorded.
#[allow(dead_code)]
pub fn board() -> (
    TaskBoard<FakeApi>,
    Arc<FakeApi>,
    Arc<Mutex<Vec<taskdeck_client::BoardEvent>>>,
) {
    let api = Arc::new(FakeApi::new());
    let events = Arc::new(EventDispatcher::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    events
        .register_callback(move |event| sink.lock().unwrap().push(event.clone()), None)
        .unwrap();
    (TaskBoard::new(api.clone(), events), api, seen)
}

#[allow(dead_code)]
pub fn at(raw: &str) -> DateTime<Utc> {
    parse_utc(raw).unwrap()
}
