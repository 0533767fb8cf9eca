pub mod api;
pub mod board;
pub mod client;
pub mod database;
pub mod errors;
pub mod events;
pub mod session;

pub use api::{ApiClient, TaskApi};
pub use board::{
    due_label, BoardConfig, ReconcilerHandle, RefreshOutcome, SweepReport, TaskBoard, TaskDraft,
    TaskEdit,
};
pub use client::{Client, ClientConfig};
pub use database::ClientDatabase;
pub use errors::{ClientError, ClientResult};
pub use events::{BoardEvent, EventDispatcher, EventType};
pub use session::{Session, SessionStore};
