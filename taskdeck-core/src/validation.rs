//! Field rules for registration, login and task input.
//!
//! Strings are trimmed first and an empty string counts as absent.

use std::str::FromStr;

use crate::due_date;
use crate::errors::{DomainError, ValidationErrors};
use crate::models::{NewTask, TaskChanges, TaskStatus};
use crate::protocol::{CreateTaskRequest, LoginRequest, RegisterRequest, UpdateTaskRequest};

pub const MAX_STRING_LENGTH: usize = 255;
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

fn normalized(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(errors: &mut ValidationErrors, field: &str, value: Option<&String>) -> Option<String> {
    match normalized(value) {
        Some(v) => Some(v),
        None => {
            errors.add(field, format!("The {} field is required.", label(field)));
            None
        }
    }
}

fn max_length(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.chars().count() > MAX_STRING_LENGTH {
        errors.add(
            field,
            format!(
                "The {} field must not be greater than {} characters.",
                label(field),
                MAX_STRING_LENGTH
            ),
        );
    }
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

fn status(errors: &mut ValidationErrors, raw: &str) -> Option<TaskStatus> {
    match TaskStatus::from_str(raw.trim()) {
        Ok(status) => Some(status),
        Err(_) => {
            errors.add("status", "The selected status is invalid.");
            None
        }
    }
}

fn due(errors: &mut ValidationErrors, raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let parsed = due_date::parse_utc(raw);
    if parsed.is_none() {
        errors.add("due_date", "The due date field must be a valid date.");
    }
    parsed
}

/// Loose `local@domain.tld` check.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

pub fn validate_registration(req: &RegisterRequest) -> Result<Registration, DomainError> {
    let mut errors = ValidationErrors::new();

    let name = required(&mut errors, "name", req.name.as_ref());
    if let Some(name) = &name {
        max_length(&mut errors, "name", name);
    }

    let email = required(&mut errors, "email", req.email.as_ref());
    if let Some(email) = &email {
        if !is_valid_email(email) {
            errors.add("email", "The email field must be a valid email address.");
        }
        max_length(&mut errors, "email", email);
    }

    // Passwords are not trimmed.
    let password = req.password.clone().filter(|p| !p.is_empty());
    match &password {
        None => errors.add("password", "The password field is required."),
        Some(p) => {
            if p.chars().count() < MIN_PASSWORD_LENGTH {
                errors.add(
                    "password",
                    format!(
                        "The password field must be at least {} characters.",
                        MIN_PASSWORD_LENGTH
                    ),
                );
            }
            if req.password_confirmation.as_deref() != Some(p.as_str()) {
                errors.add("password", "The password field confirmation does not match.");
            }
        }
    }

    errors.into_result()?;
    match (name, email, password) {
        (Some(name), Some(email), Some(password)) => Ok(Registration {
            name,
            email,
            password,
        }),
        _ => Err(DomainError::Validation(ValidationErrors::new())),
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<Credentials, DomainError> {
    let mut errors = ValidationErrors::new();
    let email = required(&mut errors, "email", req.email.as_ref());
    let password = req.password.clone().filter(|p| !p.is_empty());
    if password.is_none() {
        errors.add("password", "The password field is required.");
    }

    errors.into_result()?;
    match (email, password) {
        (Some(email), Some(password)) => Ok(Credentials { email, password }),
        _ => Err(DomainError::Validation(ValidationErrors::new())),
    }
}

pub fn validate_new_task(req: &CreateTaskRequest) -> Result<NewTask, DomainError> {
    let mut errors = ValidationErrors::new();

    let title = required(&mut errors, "title", req.title.as_ref());
    if let Some(title) = &title {
        max_length(&mut errors, "title", title);
    }

    let task_status = match normalized(req.status.as_ref()) {
        Some(raw) => status(&mut errors, &raw),
        None => Some(TaskStatus::default()),
    };

    let due_date = match normalized(req.due_date.as_ref()) {
        Some(raw) => due(&mut errors, &raw),
        None => None,
    };

    errors.into_result()?;
    Ok(NewTask {
        title: title.unwrap_or_default(),
        description: normalized(req.description.as_ref()),
        status: task_status.unwrap_or_default(),
        due_date,
    })
}

pub fn validate_task_changes(req: &UpdateTaskRequest) -> Result<TaskChanges, DomainError> {
    let mut errors = ValidationErrors::new();
    let mut changes = TaskChanges::default();

    if let Some(title) = &req.title {
        changes.title = required(&mut errors, "title", title.as_ref());
        if let Some(title) = &changes.title {
            max_length(&mut errors, "title", title);
        }
    }

    if let Some(description) = &req.description {
        changes.description = Some(normalized(description.as_ref()));
    }

    // A null status leaves the current one in place.
    if let Some(Some(raw)) = &req.status {
        changes.status = status(&mut errors, raw);
    }

    if let Some(raw) = &req.due_date {
        changes.due_date = match normalized(raw.as_ref()) {
            Some(raw) => due(&mut errors, &raw).map(Some),
            None => Some(None),
        };
    }

    errors.into_result()?;
    Ok(changes)
}
