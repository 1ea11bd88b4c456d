// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    Extension,
    extract::{
        Json, Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use chrono::Utc;
use common::{CreateTaskPayload, FilterOptions, Task, UpdateTaskPayload, derive_view, incomplete_count, overdue_ids};
use tracing::{debug, info};
use uuid::Uuid;

use crate::changes::{ChangeFeed, ChangeQueue};
use crate::error::AppError;
use crate::identity::CurrentUser;
use crate::store::{SqliteTaskStore, TaskStore};

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub changes: ChangeFeed,
}

impl AppState {
    pub fn new(pool: SqlitePool, changes: ChangeFeed) -> Self {
        Self { pool, changes }
    }

    fn store_for(&self, user: CurrentUser) -> SqliteTaskStore {
        SqliteTaskStore::new(self.pool.clone(), self.changes.clone(), user)
    }
}

#[derive(Deserialize, Debug)]
pub struct CompletionPayload {
    pub complete: bool,
}

#[derive(Serialize, Debug)]
pub struct TaskViewResponse {
    pub tasks: Vec<Task>,
    pub incomplete_count: usize,
    /// Ids of the listed tasks whose deadline has passed.
    pub overdue: Vec<Uuid>,
    pub filters: FilterOptions,
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Handler for listing the caller's tasks.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state.store_for(user).list_tasks().await?;
    info!("Successfully retrieved {} tasks.", tasks.len());
    Ok(Json(tasks))
}

/// Handler for the filtered and sorted list.
pub async fn task_view(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filters): Query<FilterOptions>,
) -> Result<Json<TaskViewResponse>, AppError> {
    debug!("Deriving view with {:?}", filters);
    let tasks = state.store_for(user).list_tasks().await?;
    let view = derive_view(&tasks, &filters);
    Ok(Json(TaskViewResponse {
        incomplete_count: incomplete_count(&tasks),
        overdue: overdue_ids(&view, Utc::now().date_naive()),
        tasks: view,
        filters,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = state.store_for(user).get_task(task_id).await?;
    Ok(Json(task))
}

/// Handler for creating a new task.
pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    debug!("Received request to create task: {}", payload.title);
    let task = state.store_for(user).create_task(payload).await?;

    // Return a 201 Created status with the new task as JSON.
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTaskPayload>,
) -> Result<Json<Task>, AppError> {
    debug!("Received update for task with ID: {}", task_id);
    let task = state.store_for(user).update_task(task_id, payload).await?;
    Ok(Json(task))
}

pub async fn set_completion(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<CompletionPayload>,
) -> Result<Json<Task>, AppError> {
    let task = state
        .store_for(user)
        .toggle_completion(task_id, payload.complete)
        .await?;
    info!("Task {} marked as {}", task_id, task.status);
    Ok(Json(task))
}

/// Handler for deleting a task by ID.
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store_for(user).delete_task(task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams the caller's change events as JSON text frames.
pub async fn changes_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> impl IntoResponse {
    let capacity = state.changes.capacity();
    ws.on_upgrade(move |socket| handle_socket(socket, state.store_for(user), capacity))
}

async fn handle_socket(socket: WebSocket, store: SqliteTaskStore, capacity: usize) {
    let (mut sender, mut receiver) = socket.split();
    let (callback, mut queue) = ChangeQueue::bounded(&store.current_user().id, capacity);

    // Dropped when this function returns, which stops the forwarding.
    let _subscription = store.subscribe_to_changes(callback);
    info!("Change socket opened for user {}", store.current_user().id);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = queue.next().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // The client has nothing to say; we only watch for it leaving.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!("Change socket closed for user {}", store.current_user().id);
}
