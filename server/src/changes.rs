// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Change notifications for the `tasks` collection.
//!
//! Every successful write publishes a [`ChangeEvent`] on the process-wide
//! [`ChangeFeed`]. Consumers register a callback and get back a
//! [`Subscription`] handle; a forwarding task pumps events from the
//! broadcast channel into the callback until the handle is cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// What happened to a row.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Events were dropped for this subscriber; it must reload everything.
    Resync,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub task_id: Option<Uuid>,
    pub user_id: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, task_id: Uuid, user_id: &str) -> Self {
        Self {
            kind,
            task_id: Some(task_id),
            user_id: user_id.to_string(),
        }
    }

    pub(crate) fn resync(user_id: &str) -> Self {
        Self {
            kind: ChangeKind::Resync,
            task_id: None,
            user_id: user_id.to_string(),
        }
    }
}

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Shared broadcast channel all store writes publish to.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    capacity: usize,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Events a subscriber may fall behind by before it is told to resync.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receiver simply means nobody is listening right now.
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(
            "Published {:?} for task {:?} to {} subscribers",
            event.kind, event.task_id, receivers
        );
    }

    /// Forwards the changes of `user_id` to `callback` until the returned
    /// handle is cancelled or dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, user_id: &str, callback: ChangeCallback) -> Subscription {
        let mut receiver = self.sender.subscribe();
        let gate = Arc::new(Mutex::new(true));
        let task_gate = Arc::clone(&gate);
        let user_id = user_id.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) if event.user_id == user_id => event,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber for {} lagged by {} events, asking for resync", user_id, skipped);
                        ChangeEvent::resync(&user_id)
                    }
                    Err(RecvError::Closed) => break,
                };
                if !deliver(&task_gate, &callback, event) {
                    break;
                }
            }
            debug!("Change forwarding for {} stopped", user_id);
        });

        Subscription {
            gate,
            abort: handle.abort_handle(),
        }
    }
}

/// Bounded hand-off from a subscription callback to a consumer that may
/// stall, such as a socket writer.
///
/// When the consumer falls `capacity` events behind, the backlog is
/// thrown away and the next event it receives is a single resync.
pub struct ChangeQueue {
    receiver: mpsc::Receiver<ChangeEvent>,
    overflowed: Arc<AtomicBool>,
    user_id: String,
}

impl ChangeQueue {
    /// Returns the callback to subscribe with and the receiving end.
    pub fn bounded(user_id: &str, capacity: usize) -> (ChangeCallback, ChangeQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&overflowed);
        let owner = user_id.to_string();

        let callback: ChangeCallback = Arc::new(move |event: ChangeEvent| match sender.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                if !flag.swap(true, Ordering::SeqCst) {
                    warn!("Change queue for {} is full, dropping backlog", owner);
                }
            }
        });

        let queue = ChangeQueue {
            receiver,
            overflowed,
            user_id: user_id.to_string(),
        };
        (callback, queue)
    }

    /// Waits for the next event. `None` once the callback is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        let event = self.receiver.recv().await?;
        if !self.overflowed.swap(false, Ordering::SeqCst) {
            return Some(event);
        }

        let mut dropped = 1;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        debug!("Dropped {} queued events for {}", dropped, self.user_id);
        Some(ChangeEvent::resync(&self.user_id))
    }
}

/// Runs the callback while holding the gate, so that `cancel` cannot
/// return while a delivery is in progress.
fn deliver(gate: &Mutex<bool>, callback: &ChangeCallback, event: ChangeEvent) -> bool {
    let open = gate.lock();
    if !*open {
        return false;
    }
    callback(event);
    true
}

/// Handle to a registered change callback.
///
/// Cancelling is synchronous and idempotent: once `cancel` returns, the
/// callback is neither running nor going to run again. The callback must
/// not cancel its own subscription. Dropping the handle cancels it.
pub struct Subscription {
    gate: Arc<Mutex<bool>>,
    abort: AbortHandle,
}

impl Subscription {
    pub fn cancel(&self) {
        let mut open = self.gate.lock();
        if *open {
            *open = false;
            self.abort.abort();
            debug!("Change subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        !*self.gate.lock()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
