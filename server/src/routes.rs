// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers::{self, AppState};
use crate::identity;
use axum::{
    Router, middleware,
    routing::{get, put},
};
use tower_http::trace::TraceLayer;

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    // Everything under /api/tasks needs a user identity.
    let tasks = Router::new()
        .route("/api/tasks", get(handlers::list_tasks).post(handlers::create_task))
        // Filtered and sorted list, same options as the UI filter bar
        .route("/api/tasks/view", get(handlers::task_view))
        // WebSocket stream of change notifications
        .route("/api/tasks/changes", get(handlers::changes_socket))
        .route(
            "/api/tasks/{id}",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/api/tasks/{id}/completion", put(handlers::set_completion))
        .route_layer(middleware::from_fn(identity::require_identity));

    Router::new()
        .route("/api/health", get(handlers::health))
        .merge(tasks)
        .layer(TraceLayer::new_for_http())
        // Adds the shared handles to the application state
        .with_state(state)
}
