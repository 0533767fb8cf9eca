use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use taskdeck_core::validation::{
    validate_login, validate_new_task, validate_registration, validate_task_changes,
};
use taskdeck_core::{
    CreateTaskRequest, DomainError, LoginRequest, LoginResponse, MessageResponse,
    RegisterRequest, Task, UpdateTaskRequest, UserSummary,
};
use uuid::Uuid;

use crate::auth::{AuthState, AuthUser};
use crate::errors::ServerResult;
use crate::middleware::{clear_session_cookie, presented_credential, session_cookie, xsrf_cookie};
use crate::AppState;

pub async fn csrf_cookie(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let token = AuthState::generate_csrf_token();
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, xsrf_cookie(&token, state.config.secure_cookies))]),
    )
}

/// Creates the account without signing in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let Json(req) = payload?;
    let registration = validate_registration(&req)?;
    state.auth.register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully".to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let Json(req) = payload?;
    let credentials = validate_login(&req)?;
    let (user, token) = state.auth.login(&credentials).await?;

    let cookie = session_cookie(&token, state.config.secure_cookies);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(LoginResponse { user, token }),
    ))
}

/// Revokes whatever credential the request carries. Succeeds even when it is
/// already gone.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ServerResult<impl IntoResponse> {
    if let Some(token) = presented_credential(&headers) {
        state.auth.revoke(&token).await?;
    }

    Ok((
        AppendHeaders([(SET_COOKIE, clear_session_cookie(state.config.secure_cookies))]),
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

pub async fn current_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ServerResult<Json<UserSummary>> {
    Ok(Json(state.auth.current_user(&user.user_id).await?))
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ServerResult<impl IntoResponse> {
    state.auth.delete_account(&user.user_id).await?;

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, clear_session_cookie(state.config.secure_cookies))]),
    ))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ServerResult<Json<Vec<Task>>> {
    let tasks = state.db.list_tasks(&user.user_id).await?;
    tracing::debug!(user_id = %user.user_id, count = tasks.len(), "listed tasks");
    Ok(Json(tasks))
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let Json(req) = payload?;
    let new_task = validate_new_task(&req)?;
    let task = state.db.insert_task(&user.user_id, new_task).await?;

    tracing::info!(task_id = %task.id, user_id = %user.user_id, "created task");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn show_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ServerResult<Json<Task>> {
    Ok(Json(owned_task(&state, &user, &id).await?))
}

/// Serves both PUT and PATCH; only keys present in the body change.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> ServerResult<Json<Task>> {
    let task = owned_task(&state, &user, &id).await?;
    let Json(req) = payload?;
    let changes = validate_task_changes(&req)?;
    if changes.is_empty() {
        return Ok(Json(task));
    }

    let task = state.db.update_task(task, &changes).await?;
    tracing::info!(task_id = %task.id, status = task.status.as_ref(), "updated task");
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    let task = owned_task(&state, &user, &id).await?;
    state.db.delete_task(&task.id).await?;

    tracing::info!(task_id = %task.id, "deleted task");
    Ok(StatusCode::NO_CONTENT)
}

/// Loads a task the caller owns. Malformed ids, unknown ids and other users'
/// tasks are all reported as not found.
async fn owned_task(state: &AppState, user: &AuthUser, raw_id: &str) -> ServerResult<Task> {
    let id = Uuid::parse_str(raw_id)
        .map_err(|_| DomainError::NotFound(format!("task {raw_id}")))?;
    let task = state
        .db
        .get_task(&id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("task {id}")))?;

    if !task.is_owned_by(&user.user_id) {
        return Err(DomainError::Authorization(id).into());
    }
    Ok(task)
}
