//! Taskdeck - personal task management
//!
//! This crate provides a unified API over the taskdeck server, client and
//! shared model.
//!
//! # Example
//!
//! ```ignore
//! use taskdeck::{Client, ClientConfig, TaskDraft};
//!
//! let client = Client::connect(ClientConfig::default()).await?;
//! client.login("ada@example.com", "secret-password").await?;
//! let board = client.board();
//! board.load().await?;
//! board.add_task(TaskDraft::new("Pay rent").due("2025-09-01", None)).await?;
//! ```

// Re-export client types
pub use taskdeck_client::{
    BoardConfig, BoardEvent, Client, ClientConfig, ClientError, TaskBoard, TaskDraft, TaskEdit,
};

// Re-export server types
pub use taskdeck_server::{app, config::ServerConfig, AppState as Server};

// Re-export core types that external applications may need
pub use taskdeck_core::due_date;
pub use taskdeck_core::errors::{DomainError, ValidationErrors};
pub use taskdeck_core::models::{StatusCounts, Task, TaskStatus, UserSummary};
