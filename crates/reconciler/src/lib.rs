//! K8s-style reconciliation controller for App resources.
//!
//! An App declares a workload, an optional service in front of it and an
//! optional ingress routing to that service. The controller keeps the
//! matching Deployment, Service and Ingress objects in line with that
//! declaration.
//!
//! # Data flow
//!
//! ```text
//! watch feed ─▶ Informer ─▶ Cache
//!                  │
//!                  ▼ ResourceEvent (mpsc)
//!             EventRouter ─▶ WorkQueue ─▶ WorkerPool ─▶ Reconciler ─▶ ObjectApi
//!                                ▲                          │
//!                                └── rate-limited requeue ──┘
//! ```
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! Level triggered: a pass reads the App from the cache, builds the desired
//! dependents and creates, updates or deletes whatever differs. Dependents
//! controlled by something else are never touched; meeting one is a
//! conflict.
//!
//! ## Work queue
//!
//! Keys are deduplicated while waiting, and a key is never processed by two
//! workers at once. Failed keys are requeued with backoff up to
//! `max_retries` times.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use app_core::Scheme;
//! use app_events::{InMemoryObjectStore, TracingRecorder};
//! use app_reconciler::{Controller, ControllerConfig};
//!
//! #[tokio::main]
//! async fn main() -> app_reconciler::Result<()> {
//!     let controller = Controller::new(
//!         InMemoryObjectStore::new_arc(),
//!         Arc::new(TracingRecorder::new()),
//!         Scheme::with_defaults(),
//!         ControllerConfig::default(),
//!     )?;
//!
//!     let stopper = controller.stopper();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stopper.stop();
//!     });
//!
//!     controller.run().await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cache;
pub mod config;
pub mod controller;
pub mod desired;
pub mod error;
pub mod informer;
pub mod queue;
pub mod rate_limit;
pub mod reconciler;
pub mod router;
pub mod worker;

// Re-export main types
pub use cache::{Cache, ResourceEvent};
pub use config::{ControllerConfig, RateLimitConfig};
pub use controller::{Controller, ControllerStopper, EVENT_BUFFER};
pub use desired::{
    DesiredDependent, SERVICE_PORT, desired_dependents, desired_deployment, desired_ingress,
    desired_service, selector_labels,
};
pub use error::{Error, Result};
pub use informer::{Informer, RELIST_BACKOFF};
pub use queue::WorkQueue;
pub use rate_limit::{
    BucketRateLimiter, ExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};
pub use reconciler::{
    MESSAGE_SYNCED, REASON_CREATED, REASON_DELETED, REASON_RESOURCE_EXISTS, REASON_SYNCED,
    REASON_UPDATED, ReconcileOutcome, Reconciler, SyncSummary,
};
pub use router::{EventRouter, route};
pub use worker::{ItemDisposition, Worker, WorkerPool};
