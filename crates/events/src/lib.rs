//! Object store access, watch feed and event recording.
//!
//! This crate holds the collaborators the controller core talks to:
//!
//! - **Object store**: CRUD + watch per kind (`ObjectApi`), with an in-memory
//!   implementation and a tracing decorator
//! - **Watch bus**: per-kind fan-out of `Added`/`Modified`/`Deleted` events
//! - **Event recorder**: best-effort operational events about objects
//!
//! # Example
//!
//! ```ignore
//! use app_events::{InMemoryObjectStore, ObjectApi, WatchEvent};
//! use app_core::Kind;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryObjectStore::new();
//!     let mut apps = store.watch(Kind::App);
//!
//!     store.create(app).await?;
//!
//!     let event = apps.recv().await?;
//!     println!("Received: {}", event.event_type());
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bus;
pub mod error;
pub mod event;
pub mod recorder;
pub mod store;

// Re-export main types
pub use bus::{DEFAULT_WATCH_CAPACITY, WatchBus, WatchStream};
pub use error::{Error, Result};
pub use event::WatchEvent;
pub use recorder::{EventRecorder, EventType, InMemoryRecorder, RecordedEvent, TracingRecorder};
pub use store::{InMemoryObjectStore, ObjectApi, Operation, TracingObjectApi};
