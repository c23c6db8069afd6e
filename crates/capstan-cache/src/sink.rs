//! Reflector sinks.

use std::sync::Arc;

use capstan_core::Object;
use capstan_store::WatchEvent;

/// Receives the reflector's output: a full listing on (re)start, then
/// individual watch events.
pub trait EventSink<T: Object>: Send + Sync {
    /// Replace the sink's contents with a full listing.
    fn replace(&self, items: &[T]);

    /// Apply one watch event.
    fn apply(&self, event: &WatchEvent<T>);
}

impl<T: Object, S: EventSink<T> + ?Sized> EventSink<T> for Arc<S> {
    fn replace(&self, items: &[T]) {
        (**self).replace(items)
    }

    fn apply(&self, event: &WatchEvent<T>) {
        (**self).apply(event)
    }
}

/// Fans one reflector out to two sinks (e.g. a work FIFO plus a cache).
pub struct Tee<A, B>(pub A, pub B);

impl<T: Object, A: EventSink<T>, B: EventSink<T>> EventSink<T> for Tee<A, B> {
    fn replace(&self, items: &[T]) {
        self.0.replace(items);
        self.1.replace(items);
    }

    fn apply(&self, event: &WatchEvent<T>) {
        self.0.apply(event);
        self.1.apply(event);
    }
}
