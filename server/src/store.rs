// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use async_trait::async_trait;
use sqlx::SqlitePool;
use common::{CreateTaskPayload, Task, TaskStatus, UpdateTaskPayload};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::changes::{ChangeCallback, ChangeEvent, ChangeFeed, ChangeKind, Subscription};
use crate::database;
use crate::error::StoreError;
use crate::identity::CurrentUser;

/// Access to the tasks of one user.
///
/// Every operation fails loudly; nothing is retried.
#[async_trait]
pub trait TaskStore: Send + Sync {
    fn current_user(&self) -> &CurrentUser;

    /// All tasks of the current user, earliest deadline first.
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Validates the payload before anything reaches the backend.
    async fn create_task(&self, payload: CreateTaskPayload) -> Result<Task, StoreError>;

    async fn update_task(&self, id: Uuid, payload: UpdateTaskPayload) -> Result<Task, StoreError>;

    async fn delete_task(&self, id: Uuid) -> Result<(), StoreError>;

    async fn toggle_completion(&self, id: Uuid, complete: bool) -> Result<Task, StoreError> {
        let status = if complete {
            TaskStatus::Completed
        } else {
            TaskStatus::Todo
        };
        self.update_task(id, UpdateTaskPayload::status(status)).await
    }

    /// Registers `callback` for every insert, update and delete on the
    /// current user's tasks.
    fn subscribe_to_changes(&self, callback: ChangeCallback) -> Subscription;
}

/// SQLite-backed store. Cheap to build, one per request or per session.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
    changes: ChangeFeed,
    user: CurrentUser,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool, changes: ChangeFeed, user: CurrentUser) -> Self {
        Self { pool, changes, user }
    }

    fn publish(&self, kind: ChangeKind, task_id: Uuid) {
        self.changes.publish(ChangeEvent::new(kind, task_id, &self.user.id));
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn current_user(&self) -> &CurrentUser {
        &self.user
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = database::list_tasks_from_db(&self.pool, &self.user.id).await?;
        debug!("Loaded {} tasks for user {}", tasks.len(), self.user.id);
        Ok(tasks)
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        database::get_task_from_db(&self.pool, &self.user.id, id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn create_task(&self, payload: CreateTaskPayload) -> Result<Task, StoreError> {
        let payload = payload.validated().inspect_err(|e| {
            error!("Validation failed: {}", e);
        })?;

        let task = database::create_task_in_db(&self.pool, &self.user.id, payload).await?;
        info!("Task created successfully with ID: {}", task.id);
        self.publish(ChangeKind::Insert, task.id);
        Ok(task)
    }

    async fn update_task(&self, id: Uuid, payload: UpdateTaskPayload) -> Result<Task, StoreError> {
        let payload = payload.validated().inspect_err(|e| {
            error!("Validation failed for task {}: {}", id, e);
        })?;

        let task = database::update_task_in_db(&self.pool, &self.user.id, id, payload)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        self.publish(ChangeKind::Update, id);
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        if !database::delete_task_from_db(&self.pool, &self.user.id, id).await? {
            error!("Task with ID {} not found for deletion.", id);
            return Err(StoreError::NotFound(id));
        }
        info!("Task with ID {} deleted successfully.", id);
        self.publish(ChangeKind::Delete, id);
        Ok(())
    }

    fn subscribe_to_changes(&self, callback: ChangeCallback) -> Subscription {
        self.changes.subscribe(&self.user.id, callback)
    }
}
