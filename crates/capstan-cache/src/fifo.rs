//! Coalescing keyed work queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use capstan_core::Object;
use capstan_store::{EventKind, WatchEvent};
use tokio::sync::Notify;

use crate::sink::EventSink;

struct FifoState<T> {
    /// Delivery order of pending ids.
    order: VecDeque<String>,
    /// Latest payload per pending id.
    items: HashMap<String, T>,
    closed: bool,
}

/// Ordered queue keyed by object id, with exactly one consumer.
///
/// Re-enqueueing a pending id collapses to the most recent payload
/// without changing its queue position, so the consumer always sees the
/// latest state for a key and memory stays bounded by the number of
/// distinct objects. A deletion removes the pending key outright.
pub struct Fifo<T> {
    state: Mutex<FifoState<T>>,
    notify: Notify,
}

impl<T: Object> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Fifo<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FifoState {
                order: VecDeque::new(),
                items: HashMap::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FifoState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue `obj`, collapsing onto any pending entry for the same id.
    pub fn push(&self, obj: T) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let id = obj.id().to_string();
        if let Some(pending) = state.items.get_mut(&id) {
            // Keep queue position, never deliver a stale payload.
            if obj.resource_version() >= pending.resource_version() {
                *pending = obj;
            }
        } else {
            state.order.push_back(id.clone());
            state.items.insert(id, obj);
        }
        drop(state);
        self.notify.notify_one();
    }

    fn remove(&self, id: &str) {
        let mut state = self.lock();
        if state.items.remove(id).is_some() {
            state.order.retain(|pending| pending != id);
        }
    }

    /// Next object in arrival order. Blocks until one is available;
    /// returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(id) = state.order.pop_front() {
                    if let Some(item) = state.items.remove(&id) {
                        return Some(item);
                    }
                    continue;
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue: `pop` drains what is pending, then returns `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }
}

impl<T: Object> EventSink<T> for Fifo<T> {
    fn replace(&self, items: &[T]) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.order.clear();
            state.items.clear();
            for item in items {
                state.order.push_back(item.id().to_string());
                state.items.insert(item.id().to_string(), item.clone());
            }
        }
        self.notify.notify_one();
    }

    fn apply(&self, event: &WatchEvent<T>) {
        match event.kind {
            EventKind::Added | EventKind::Modified => self.push(event.object.clone()),
            EventKind::Deleted => self.remove(event.object.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::DeploymentConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(id: &str, rv: u64) -> DeploymentConfig {
        DeploymentConfig {
            id: id.to_string(),
            resource_version: rv,
            ..DeploymentConfig::default()
        }
    }

    #[tokio::test]
    async fn pops_in_arrival_order() {
        let fifo = Fifo::new();
        fifo.push(config("a", 1));
        fifo.push(config("b", 2));

        assert_eq!(fifo.pop().await.unwrap().id, "a");
        assert_eq!(fifo.pop().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn reenqueue_collapses_to_latest_payload() {
        let fifo = Fifo::new();
        fifo.push(config("a", 1));
        fifo.push(config("b", 2));
        let mut newer = config("a", 3);
        newer.latest_version = 5;
        fifo.push(newer);

        // Position of "a" is unchanged, payload is the newest.
        let popped = fifo.pop().await.unwrap();
        assert_eq!(popped.id, "a");
        assert_eq!(popped.latest_version, 5);
        assert_eq!(fifo.pop().await.unwrap().id, "b");
        assert!(fifo.is_empty());
    }

    #[tokio::test]
    async fn stale_payload_does_not_replace_newer() {
        let fifo = Fifo::new();
        let mut newer = config("a", 5);
        newer.latest_version = 5;
        fifo.push(newer);
        fifo.push(config("a", 2));

        assert_eq!(fifo.pop().await.unwrap().latest_version, 5);
    }

    #[tokio::test]
    async fn deleted_event_removes_pending_key() {
        let fifo = Fifo::new();
        fifo.push(config("a", 1));
        fifo.push(config("b", 2));
        fifo.apply(&WatchEvent {
            kind: EventKind::Deleted,
            object: config("a", 3),
        });

        assert_eq!(fifo.len(), 1);
        assert_eq!(fifo.pop().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn replace_seeds_full_listing() {
        let fifo = Fifo::new();
        fifo.push(config("stale", 1));
        fifo.replace(&[config("a", 2), config("b", 3)]);

        assert_eq!(fifo.pop().await.unwrap().id, "a");
        assert_eq!(fifo.pop().await.unwrap().id, "b");
        assert!(fifo.is_empty());
    }

    #[tokio::test]
    async fn close_drains_then_terminates() {
        let fifo = Fifo::new();
        fifo.push(config("a", 1));
        fifo.close();

        assert_eq!(fifo.pop().await.unwrap().id, "a");
        assert!(fifo.pop().await.is_none());
    }

    #[tokio::test]
    async fn blocked_pop_wakes_on_push() {
        let fifo = Arc::new(Fifo::new());
        let popper = {
            let fifo = Arc::clone(&fifo);
            tokio::spawn(async move { fifo.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        fifo.push(config("a", 1));

        let popped = popper.await.unwrap().unwrap();
        assert_eq!(popped.id, "a");
    }

    #[tokio::test]
    async fn blocked_pop_wakes_on_close() {
        let fifo: Arc<Fifo<DeploymentConfig>> = Arc::new(Fifo::new());
        let popper = {
            let fifo = Arc::clone(&fifo);
            tokio::spawn(async move { fifo.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        fifo.close();

        assert!(popper.await.unwrap().is_none());
    }
}
