//! Operational event recording.
//!
//! Controllers report noteworthy outcomes (synced, conflicts, dependent
//! mutations) against the object they concern. Recording is best effort:
//! callers log and carry on when it fails.

use std::fmt;

use app_core::ObjectReference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::Result;

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// An event as kept by [`InMemoryRecorder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub subject: ObjectReference,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Sink for operational events.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Record an event about `subject`.
    async fn record(
        &self,
        subject: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

/// Recorder that writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl TracingRecorder {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventRecorder for TracingRecorder {
    async fn record(
        &self,
        subject: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        match event_type {
            EventType::Normal => info!(
                kind = %subject.kind,
                key = %subject.key(),
                reason,
                "{message}"
            ),
            EventType::Warning => warn!(
                kind = %subject.kind,
                key = %subject.key(),
                reason,
                "{message}"
            ),
        }
        Ok(())
    }
}

/// Recorder that keeps every event in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    events: RwLock<Vec<RecordedEvent>>,
}

impl InMemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, oldest first.
    pub async fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().await.clone()
    }

    /// Number of recorded events with the given reason.
    pub async fn count_reason(&self, reason: &str) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.reason == reason)
            .count()
    }
}

#[async_trait]
impl EventRecorder for InMemoryRecorder {
    async fn record(
        &self,
        subject: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        self.events.write().await.push(RecordedEvent {
            subject: subject.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
