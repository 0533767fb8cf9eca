use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use taskdeck_core::{NewTask, Task, TaskChanges};
use uuid::Uuid;

use crate::errors::ServerResult;
use crate::queries::{self, Queries, TokenRecord, UserRecord};

/// Current time at the precision the API serializes.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub struct ServerDatabase {
    pub pool: SqlitePool,
}

impl ServerDatabase {
    pub async fn new(database_url: &str) -> ServerResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 10 })
            .idle_timeout(if in_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> ServerResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> ServerResult<UserRecord> {
        let user = UserRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now(),
        };

        sqlx::query(Queries::INSERT_USER)
            .bind(user.id.to_string())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user(&self, id: &Uuid) -> ServerResult<Option<UserRecord>> {
        sqlx::query(Queries::GET_USER)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| queries::parse_user(&row))
            .transpose()
    }

    /// Case-insensitive lookup.
    pub async fn find_user_by_email(&self, email: &str) -> ServerResult<Option<UserRecord>> {
        sqlx::query(Queries::GET_USER_BY_EMAIL)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| queries::parse_user(&row))
            .transpose()
    }

    /// Deletes the user; tokens and tasks go with it through `ON DELETE CASCADE`.
    pub async fn delete_user(&self, id: &Uuid) -> ServerResult<bool> {
        let result = sqlx::query(Queries::DELETE_USER)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_token(
        &self,
        user_id: &Uuid,
        token_hash: &str,
        name: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> ServerResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(Queries::INSERT_TOKEN)
            .bind(id.to_string())
            .bind(user_id.to_string())
            .bind(token_hash)
            .bind(name)
            .bind(expires_at)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn find_token(&self, token_hash: &str) -> ServerResult<Option<TokenRecord>> {
        sqlx::query(Queries::GET_TOKEN)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| queries::parse_token(&row))
            .transpose()
    }

    pub async fn touch_token(&self, token_hash: &str) -> ServerResult<()> {
        sqlx::query(Queries::TOUCH_TOKEN)
            .bind(token_hash)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_token(&self, token_hash: &str) -> ServerResult<bool> {
        let result = sqlx::query(Queries::DELETE_TOKEN)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn user_token_hashes(&self, user_id: &Uuid) -> ServerResult<Vec<String>> {
        let rows = sqlx::query(Queries::GET_USER_TOKEN_HASHES)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("token_hash").map_err(Into::into))
            .collect()
    }

    /// Newest first.
    pub async fn list_tasks(&self, user_id: &Uuid) -> ServerResult<Vec<Task>> {
        let rows = sqlx::query(Queries::GET_USER_TASKS)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(queries::parse_task).collect()
    }

    pub async fn get_task(&self, id: &Uuid) -> ServerResult<Option<Task>> {
        sqlx::query(Queries::GET_TASK)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| queries::parse_task(&row))
            .transpose()
    }

    pub async fn insert_task(&self, user_id: &Uuid, new_task: NewTask) -> ServerResult<Task> {
        let created_at = now();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: *user_id,
            title: new_task.title,
            description: new_task.description,
            status: new_task.status,
            due_date: new_task.due_date,
            created_at,
            updated_at: created_at,
        };

        sqlx::query(Queries::INSERT_TASK)
            .bind(task.id.to_string())
            .bind(task.user_id.to_string())
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_ref())
            .bind(task.due_date)
            .bind(task.created_at)
            .execute(&self.pool)
            .await?;

        Ok(task)
    }

    /// Applies `changes` to `task` and writes the whole row back.
    pub async fn update_task(&self, mut task: Task, changes: &TaskChanges) -> ServerResult<Task> {
        changes.apply_to(&mut task);
        task.updated_at = now();

        sqlx::query(Queries::UPDATE_TASK)
            .bind(task.id.to_string())
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_ref())
            .bind(task.due_date)
            .bind(task.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(task)
    }

    pub async fn delete_task(&self, id: &Uuid) -> ServerResult<bool> {
        let result = sqlx::query(Queries::DELETE_TASK)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
