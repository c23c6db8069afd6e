//! The list+watch engine.

use std::sync::Arc;
use std::time::Duration;

use capstan_core::{LabelSelector, Object};
use capstan_store::{ResourceClient, StoreError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::sink::EventSink;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Keeps an in-memory sink synchronized with one resource kind.
///
/// The loop subscribes, lists the full current state into the sink, then
/// forwards watch events until the stream ends; any failure or stream end
/// restarts the whole sequence with exponential backoff. Because every
/// restart re-lists, events dropped by the watch are healed by
/// reconciliation.
pub struct Reflector<T: Object, S> {
    client: Arc<dyn ResourceClient<T>>,
    sink: S,
    selector: LabelSelector,
    resync: Option<Duration>,
}

impl<T: Object, S: EventSink<T>> Reflector<T, S> {
    pub fn new(client: Arc<dyn ResourceClient<T>>, sink: S) -> Self {
        Self {
            client,
            sink,
            selector: LabelSelector::everything(),
            resync: None,
        }
    }

    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Re-list into the sink every `period` even while the watch stream
    /// stays healthy. Controllers that poll external state (the
    /// deployment controller's pod checks) rely on this redelivery.
    pub fn resync_every(mut self, period: Duration) -> Self {
        self.resync = Some(period);
        self
    }

    /// Run until the shutdown signal fires or the store closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sync_once(&mut shutdown).await {
                SyncOutcome::Shutdown => break,
                SyncOutcome::StreamEnded => {
                    backoff = INITIAL_BACKOFF;
                    debug!(kind = T::KIND, "watch stream ended, relisting");
                }
                SyncOutcome::Failed => {
                    warn!(
                        kind = T::KIND,
                        backoff_secs = backoff.as_secs(),
                        "reflector sync failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!(kind = T::KIND, "reflector stopped");
    }

    /// One subscribe → list → forward cycle.
    async fn sync_once(&self, shutdown: &mut watch::Receiver<bool>) -> SyncOutcome {
        // Subscribe before listing so nothing written in between is lost;
        // sinks discard payloads older than what the list seeded.
        let mut stream = match self.client.watch(0).await {
            Ok(stream) => stream,
            Err(StoreError::Closed) => return SyncOutcome::Shutdown,
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "watch open failed");
                return SyncOutcome::Failed;
            }
        };

        let (items, rv) = match self.client.list(&self.selector).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "list failed");
                return SyncOutcome::Failed;
            }
        };
        debug!(kind = T::KIND, items = items.len(), rv, "listed");
        self.sink.replace(&items);

        let resync = async {
            match self.resync {
                Some(period) => tokio::time::sleep(period).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(resync);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return SyncOutcome::Shutdown,
                _ = &mut resync => return SyncOutcome::StreamEnded,
                event = stream.next() => match event {
                    Some(event) => self.sink.apply(&event),
                    None => return SyncOutcome::StreamEnded,
                },
            }
        }
    }
}

enum SyncOutcome {
    Shutdown,
    StreamEnded,
    Failed,
}
