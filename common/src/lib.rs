// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod filter;

pub use filter::{
    FilterOptions, ParseFilterError, PriorityFilter, SortBy, derive_view, incomplete_count, overdue_ids,
};

/// Maximum number of characters accepted in a task title.
pub const TITLE_MAX_LEN: usize = 100;

/// Represents a task within the system.
///
/// A task always belongs to exactly one user. `id`, `user_id` and
/// `created_at` are assigned by the store and never change afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    pub description: Option<String>,

    pub status: TaskStatus,

    // We use NaiveDate because a deadline is a calendar day,
    // without a timezone.
    pub due_date: Option<NaiveDate>,

    pub priority: Option<TaskPriority>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub user_id: String,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// A task is overdue when its deadline lies strictly before `today`
    /// and it has not been completed yet.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_complete() && self.due_date.is_some_and(|due| due < today)
    }
}

/// Completion state of a task.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(ParseFilterError::new("status", other)),
        }
    }
}

/// How urgent a task is. Absence of a priority is modelled as `None`
/// on the task itself.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    /// Severity used when ordering by priority; a missing priority weighs 0.
    pub fn weight(priority: Option<TaskPriority>) -> u8 {
        match priority {
            Some(TaskPriority::High) => 3,
            Some(TaskPriority::Medium) => 2,
            Some(TaskPriority::Low) => 1,
            None => 0,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(ParseFilterError::new("priority", other)),
        }
    }
}

/// Rejections raised before anything is sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title is required.")]
    EmptyTitle,
    #[error("Title must be at most {max} characters (got {len}).")]
    TitleTooLong { len: usize, max: usize },
}

/// Checks a title and returns its trimmed form.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = trimmed.chars().count();
    if len > TITLE_MAX_LEN {
        return Err(ValidationError::TitleTooLong {
            len,
            max: TITLE_MAX_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Drops blank labels and repeated ones, keeping the first occurrence.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.filter(|d| !d.trim().is_empty())
}

/// Structure used to receive task creation data from the API.
/// The status is not part of it: every task starts as `todo`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CreateTaskPayload {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateTaskPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Validates the payload and returns it with normalised fields.
    pub fn validated(self) -> Result<Self, ValidationError> {
        Ok(Self {
            title: validate_title(&self.title)?,
            description: normalize_description(self.description),
            due_date: self.due_date,
            priority: self.priority,
            tags: normalize_tags(self.tags),
        })
    }
}

/// Partial update of a task. Omitted fields are left untouched.
///
/// For the nullable columns the outer `Option` tells whether the key was
/// present and the inner one carries the new value, so `"due_date": null`
/// clears the deadline while a missing `due_date` keeps it.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateTaskPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Option<TaskPriority>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateTaskPayload {
    /// An update that only changes the completion state.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Validates the provided title, if any.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(title) = self.title.take() {
            self.title = Some(validate_title(&title)?);
        }
        self.description = self.description.map(normalize_description);
        self.tags = self.tags.map(normalize_tags);
        Ok(self)
    }

    /// Applies the provided fields to `task`. Identity fields are never touched.
    pub fn apply_to(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(tags) = self.tags {
            task.tags = tags;
        }
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
