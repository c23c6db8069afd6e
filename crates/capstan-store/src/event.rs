//! Watch events and streams.

use tokio::sync::mpsc;

/// What happened to a watched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

/// A single change observed on a watch stream.
///
/// The object carries its post-write `resource_version`; versions are
/// monotonic across all writes to a registry.
#[derive(Debug, Clone)]
pub struct WatchEvent<T> {
    pub kind: EventKind,
    pub object: T,
}

/// A pull-based stream of watch events.
///
/// The stream is not guaranteed lossless across resubscribes; consumers
/// heal gaps by re-listing (the reflector's job).
pub struct WatchStream<T> {
    rx: mpsc::UnboundedReceiver<WatchEvent<T>>,
}

impl<T> WatchStream<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<WatchEvent<T>>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the store drops the subscription.
    pub async fn next(&mut self) -> Option<WatchEvent<T>> {
        self.rx.recv().await
    }
}
