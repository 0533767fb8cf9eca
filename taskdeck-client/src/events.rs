use std::sync::Mutex;

use uuid::Uuid;

use crate::errors::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TasksChanged,
    ReadFailed,
    WriteFailed,
    OverdueMarked,
    SessionExpired,
}

/// What the board tells the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    TasksChanged { count: usize },
    /// A fetch failed. Shown as a banner; `retryable` offers "try again".
    ReadFailed { message: String, retryable: bool },
    /// A create, update or delete failed. Shown as a blocking alert.
    WriteFailed { message: String, details: Vec<String> },
    OverdueMarked { task_id: Uuid },
    /// The credential was rejected and the session has been cleared.
    SessionExpired,
}

impl BoardEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            BoardEvent::TasksChanged { .. } => EventType::TasksChanged,
            BoardEvent::ReadFailed { .. } => EventType::ReadFailed,
            BoardEvent::WriteFailed { .. } => EventType::WriteFailed,
            BoardEvent::OverdueMarked { .. } => EventType::OverdueMarked,
            BoardEvent::SessionExpired => EventType::SessionExpired,
        }
    }

    pub fn read_failed(error: &ClientError) -> Self {
        BoardEvent::ReadFailed {
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    pub fn write_failed(error: &ClientError) -> Self {
        BoardEvent::WriteFailed {
            message: error.to_string(),
            details: error.field_messages(),
        }
    }
}

pub type EventCallback = Box<dyn Fn(&BoardEvent) + Send + Sync>;

struct CallbackEntry {
    callback: EventCallback,
    event_filter: Option<EventType>,
}

/// Fans events out to registered callbacks. Callbacks run on the emitting
/// task and must not register further callbacks.
pub struct EventDispatcher {
    callbacks: Mutex<Vec<CallbackEntry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn register_callback<F>(&self, callback: F, event_filter: Option<EventType>) -> ClientResult<()>
    where
        F: Fn(&BoardEvent) + Send + Sync + 'static,
    {
        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callback registry".into()))?;

        callbacks.push(CallbackEntry {
            callback: Box::new(callback),
            event_filter,
        });
        Ok(())
    }

    pub fn emit(&self, event: BoardEvent) {
        let callbacks = match self.callbacks.lock() {
            Ok(callbacks) => callbacks,
            Err(_) => {
                tracing::error!("Failed to acquire callback lock for event emission");
                return;
            }
        };

        let event_type = event.event_type();
        for entry in callbacks.iter() {
            if let Some(filter) = entry.event_filter {
                if filter != event_type {
                    continue;
                }
            }
            (entry.callback)(&event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
