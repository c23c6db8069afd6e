//! List+watch machinery: reflector, work queue, and lookup store.
//!
//! A `Reflector` pairs a store client with a typed in-memory sink and
//! keeps the sink synchronized: initial list, then watch, then restart
//! with backoff when the stream ends. Two sink shapes cover the
//! controllers' needs: a coalescing keyed `Fifo` for work dispatch (one
//! consumer) and a `KeyedStore` for lookup.
//!
//! Watch streams are not lossless; every reflector restart re-lists, so
//! consumers recover missed events by reconciliation rather than relying
//! on exactly-once delivery.

pub mod fifo;
pub mod reflector;
pub mod sink;
pub mod store;

pub use fifo::Fifo;
pub use reflector::Reflector;
pub use sink::{EventSink, Tee};
pub use store::KeyedStore;
