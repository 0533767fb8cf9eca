use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use taskdeck_core::{Task, TaskStatus, UserSummary};
use uuid::Uuid;

use crate::errors::{ServerError, ServerResult};

/// SQL used by [`crate::database::ServerDatabase`].
pub struct Queries;

impl Queries {
    // Users
    pub const INSERT_USER: &'static str = r#"
        INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
    "#;

    pub const GET_USER: &'static str = r#"
        SELECT id, name, email, password_hash, created_at
        FROM users
        WHERE id = ?1
    "#;

    pub const GET_USER_BY_EMAIL: &'static str = r#"
        SELECT id, name, email, password_hash, created_at
        FROM users
        WHERE email = ?1
    "#;

    pub const DELETE_USER: &'static str = "DELETE FROM users WHERE id = ?1";

    // Access tokens
    pub const INSERT_TOKEN: &'static str = r#"
        INSERT INTO access_tokens (id, user_id, token_hash, name, expires_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    "#;

    pub const GET_TOKEN: &'static str = r#"
        SELECT id, user_id, expires_at, last_used_at
        FROM access_tokens
        WHERE token_hash = ?1
    "#;

    pub const TOUCH_TOKEN: &'static str =
        "UPDATE access_tokens SET last_used_at = ?2 WHERE token_hash = ?1";

    pub const DELETE_TOKEN: &'static str = "DELETE FROM access_tokens WHERE token_hash = ?1";

    pub const GET_USER_TOKEN_HASHES: &'static str =
        "SELECT token_hash FROM access_tokens WHERE user_id = ?1";

    // Tasks
    pub const INSERT_TASK: &'static str = r#"
        INSERT INTO tasks (id, user_id, title, description, status, due_date, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
    "#;

    pub const GET_TASK: &'static str = r#"
        SELECT id, user_id, title, description, status, due_date, created_at, updated_at
        FROM tasks
        WHERE id = ?1
    "#;

    pub const GET_USER_TASKS: &'static str = r#"
        SELECT id, user_id, title, description, status, due_date, created_at, updated_at
        FROM tasks
        WHERE user_id = ?1
        ORDER BY created_at DESC, rowid DESC
    "#;

    pub const UPDATE_TASK: &'static str = r#"
        UPDATE tasks
        SET title = ?2, description = ?3, status = ?4, due_date = ?5, updated_at = ?6
        WHERE id = ?1
    "#;

    pub const DELETE_TASK: &'static str = "DELETE FROM tasks WHERE id = ?1";
}

/// A user row including the password hash. Only the auth layer sees this.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

fn uuid_column(row: &SqliteRow, column: &str) -> ServerResult<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| ServerError::CorruptRow(format!("{column}: {e}")))
}

pub fn parse_user(row: &SqliteRow) -> ServerResult<UserRecord> {
    Ok(UserRecord {
        id: uuid_column(row, "id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

pub fn parse_token(row: &SqliteRow) -> ServerResult<TokenRecord> {
    Ok(TokenRecord {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        expires_at: row.try_get("expires_at")?,
        last_used_at: row.try_get("last_used_at")?,
    })
}

pub fn parse_task(row: &SqliteRow) -> ServerResult<Task> {
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: TaskStatus::from_str(&status)
            .map_err(|e| ServerError::CorruptRow(format!("status {status:?}: {e}")))?,
        due_date: row.try_get("due_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
