// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Task list view controller.
//!
//! Holds the last loaded task list and the active filters for one user,
//! keeps the list fresh through change notifications and hands out a
//! render-ready [`TaskView`]. Every notification triggers a full reload;
//! when two reloads race, whichever finishes last wins.

use std::sync::{Arc, Weak};

use chrono::{NaiveDate, Utc};
use common::{
    CreateTaskPayload, FilterOptions, Task, UpdateTaskPayload, derive_view, incomplete_count, overdue_ids,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::changes::{ChangeEvent, ChangeKind, Subscription};
use crate::error::StoreError;
use crate::store::TaskStore;

pub const NEW_TASK_NOTICE: &str = "A new task has been added to your list.";
pub const LOAD_FAILED: &str = "Failed to load tasks.";
pub const REFRESH_FAILED: &str = "Failed to refresh tasks.";
pub const WRITE_FAILED: &str = "Failed to save your changes.";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum LoadState {
    Loading,
    Loaded,
    /// The first load failed; the list is empty.
    Error(String),
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A dismissible message that never blocks the list.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: &str) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Why the view has nothing to show.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptyState {
    NoTasks,
    NoMatches,
}

/// Everything the presentation layer needs to render the list.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TaskView {
    pub tasks: Vec<Task>,
    pub incomplete_count: usize,
    /// Ids of the listed tasks whose deadline has passed.
    pub overdue: Vec<Uuid>,
    pub filters: FilterOptions,
    pub load: LoadState,
    pub notice: Option<Notice>,
    pub empty: Option<EmptyState>,
}

#[derive(Debug)]
struct ViewState {
    load: LoadState,
    tasks: Vec<Task>,
    filters: FilterOptions,
    notice: Option<Notice>,
    has_loaded: bool,
}

impl ViewState {
    fn new() -> Self {
        Self {
            load: LoadState::Loading,
            tasks: Vec::new(),
            filters: FilterOptions::default(),
            notice: None,
            has_loaded: false,
        }
    }
}

struct Inner {
    store: Arc<dyn TaskStore>,
    state: Mutex<ViewState>,
    subscription: Mutex<Option<Subscription>>,
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ViewController {
    inner: Arc<Inner>,
}

impl ViewController {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                state: Mutex::new(ViewState::new()),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Opens the change subscription and performs the first load.
    /// Calling it again on a mounted controller only reloads.
    pub async fn mount(&self) {
        {
            let mut subscription = self.inner.subscription.lock();
            if subscription.is_none() {
                let weak = Arc::downgrade(&self.inner);
                *subscription = Some(
                    self.inner
                        .store
                        .subscribe_to_changes(Arc::new(move |event| on_change(&weak, event))),
                );
                info!("View mounted for user {}", self.inner.store.current_user().id);
            }
        }
        self.refresh().await;
    }

    /// Cancels the change subscription. Safe to call more than once.
    pub fn unmount(&self) {
        let subscription = self.inner.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
            info!("View unmounted for user {}", self.inner.store.current_user().id);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.subscription.lock().is_some()
    }

    /// Reloads the full list from the store.
    ///
    /// A failure before the first successful load leaves the view in
    /// [`LoadState::Error`]; later failures keep the last good list and
    /// raise a notice instead.
    pub async fn refresh(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.has_loaded {
                state.load = LoadState::Loading;
            }
        }

        let result = self.inner.store.list_tasks().await;

        let mut state = self.inner.state.lock();
        match result {
            Ok(tasks) => {
                debug!("View reloaded with {} tasks", tasks.len());
                state.tasks = tasks;
                state.load = LoadState::Loaded;
                state.has_loaded = true;
            }
            Err(err) if state.has_loaded => {
                warn!("Refetch failed, keeping last known list: {:?}", err);
                state.notice = Some(Notice::error(REFRESH_FAILED));
            }
            Err(err) => {
                warn!("Initial load failed: {:?}", err);
                state.tasks.clear();
                state.load = LoadState::Error(LOAD_FAILED.to_string());
            }
        }
    }

    pub fn set_filters(&self, filters: FilterOptions) {
        self.inner.state.lock().filters = filters;
    }

    pub fn reset_filters(&self) {
        self.inner.state.lock().filters.reset();
    }

    pub fn filters(&self) -> FilterOptions {
        self.inner.state.lock().filters
    }

    pub fn dismiss_notice(&self) {
        self.inner.state.lock().notice = None;
    }

    /// The authoritative, unfiltered list.
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.state.lock().tasks.clone()
    }

    /// Derives the current view from the list and the filters.
    pub fn view(&self) -> TaskView {
        self.view_on(Utc::now().date_naive())
    }

    /// Same as [`view`](Self::view), with overdue tasks judged against `today`.
    pub fn view_on(&self, today: NaiveDate) -> TaskView {
        let state = self.inner.state.lock();
        let tasks = derive_view(&state.tasks, &state.filters);
        let empty = match (state.load == LoadState::Loading, state.tasks.is_empty(), tasks.is_empty()) {
            (true, _, _) | (false, _, false) => None,
            (false, true, true) => Some(EmptyState::NoTasks),
            (false, false, true) => Some(EmptyState::NoMatches),
        };

        TaskView {
            incomplete_count: incomplete_count(&state.tasks),
            overdue: overdue_ids(&tasks, today),
            tasks,
            filters: state.filters,
            load: state.load.clone(),
            notice: state.notice.clone(),
            empty,
        }
    }

    pub async fn create_task(&self, payload: CreateTaskPayload) -> Result<Task, StoreError> {
        let result = self.inner.store.create_task(payload).await;
        self.after_write(result).await
    }

    pub async fn update_task(&self, id: Uuid, payload: UpdateTaskPayload) -> Result<Task, StoreError> {
        let result = self.inner.store.update_task(id, payload).await;
        self.after_write(result).await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        let result = self.inner.store.delete_task(id).await;
        self.after_write(result).await
    }

    pub async fn toggle_completion(&self, id: Uuid, complete: bool) -> Result<Task, StoreError> {
        let result = self.inner.store.toggle_completion(id, complete).await;
        self.after_write(result).await
    }

    /// Reloads after a write. Validation errors are left to the caller to
    /// show inline; a stale id also reloads so the task disappears.
    async fn after_write<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match &result {
            Ok(_) => self.refresh().await,
            Err(StoreError::Validation(_)) => {}
            Err(err @ StoreError::NotFound(_)) => {
                self.set_notice(Notice::error(err.to_string()));
                self.refresh().await;
            }
            Err(StoreError::Backend(err)) => {
                warn!("Write failed: {:?}", err);
                self.set_notice(Notice::error(WRITE_FAILED));
            }
        }
        result
    }

    fn set_notice(&self, notice: Notice) {
        self.inner.state.lock().notice = Some(notice);
    }
}

fn on_change(inner: &Weak<Inner>, event: ChangeEvent) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    debug!("Change notification {:?} for task {:?}", event.kind, event.task_id);

    if event.kind == ChangeKind::Insert {
        inner.state.lock().notice = Some(Notice::info(NEW_TASK_NOTICE));
    }

    let controller = ViewController { inner };
    tokio::spawn(async move { controller.refresh().await });
}
