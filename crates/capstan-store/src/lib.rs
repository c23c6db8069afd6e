//! Object store client surface for the Capstan control plane.
//!
//! Controllers never talk to a concrete store; they hold narrow
//! capability handles to the traits defined here. The in-memory
//! implementations back the standalone daemon and every test.
//!
//! # Components
//!
//! - **`error`** — the store error taxonomy (`NotFound`, `AlreadyExists`,
//!   `Conflict`, `Invalid`, `Transport`, `Closed`)
//! - **`event`** — watch events and streams
//! - **`client`** — per-kind CRUD + watch capability traits
//! - **`memory`** — in-memory watchable registry with compare-and-set
//! - **`pods`** — the consumed pod API and its in-memory implementation

pub mod client;
pub mod error;
pub mod event;
pub mod memory;
pub mod pods;

pub use client::ResourceClient;
pub use error::{StoreError, StoreResult};
pub use event::{EventKind, WatchEvent, WatchStream};
pub use memory::MemoryRegistry;
pub use pods::{MemoryPods, PodClient};
