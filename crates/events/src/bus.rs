//! Per-kind watch fan-out.

use std::collections::HashMap;

use app_core::Kind;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{Error, Result};
use crate::event::WatchEvent;

/// Default per-kind channel capacity.
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// Subscription to the watch feed of one kind.
pub struct WatchStream {
    kind: Kind,
    receiver: broadcast::Receiver<WatchEvent>,
}

impl WatchStream {
    /// Kind this stream delivers.
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// Receive the next event.
    ///
    /// # Errors
    ///
    /// [`Error::WatchLagged`] if the subscriber fell behind (the stream stays
    /// usable, but events were lost and the caller should relist), and
    /// [`Error::ChannelClosed`] once the store is gone.
    pub async fn recv(&mut self) -> Result<WatchEvent> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => Error::WatchLagged { skipped },
            broadcast::error::RecvError::Closed => Error::ChannelClosed,
        })
    }
}

/// Broadcasts store changes to watchers, one channel per kind.
pub struct WatchBus {
    channels: HashMap<Kind, broadcast::Sender<WatchEvent>>,
}

impl WatchBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create a bus whose per-kind channels buffer `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let channels = Kind::ALL
            .into_iter()
            .map(|kind| (kind, broadcast::channel(capacity.max(1)).0))
            .collect();
        Self { channels }
    }

    /// Publish an event to watchers of its kind. Having no watchers is fine.
    pub fn publish(&self, event: WatchEvent) {
        if let Some(sender) = self.channels.get(&event.kind()) {
            trace!(
                kind = %event.kind(),
                key = %event.object().key(),
                event_type = event.event_type(),
                "Publishing watch event"
            );
            let _ = sender.send(event);
        }
    }

    /// Subscribe to changes of one kind.
    pub fn subscribe(&self, kind: Kind) -> WatchStream {
        let receiver = match self.channels.get(&kind) {
            Some(sender) => sender.subscribe(),
            // Every kind gets a channel in the constructor; an orphan receiver
            // whose sender is dropped reports Closed on first recv.
            None => broadcast::channel(1).1,
        };
        WatchStream { kind, receiver }
    }
}

impl Default for WatchBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_core::{Object, ObjectMeta, Service, ServiceSpec};

    fn service(name: &str) -> Object {
        Object::from(Service {
            metadata: ObjectMeta::new("default", name),
            spec: ServiceSpec {
                selector: Default::default(),
                ports: Vec::new(),
            },
        })
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_of_its_kind() -> Result<()> {
        let bus = WatchBus::new();
        let mut services = bus.subscribe(Kind::Service);

        bus.publish(WatchEvent::Added(service("web")));

        let event = services.recv().await?;
        assert_eq!(event.kind(), Kind::Service);
        assert_eq!(event.event_type(), "added");
        Ok(())
    }

    #[tokio::test]
    async fn test_other_kinds_are_not_delivered() {
        let bus = WatchBus::new();
        let mut apps = bus.subscribe(Kind::App);

        bus.publish(WatchEvent::Added(service("web")));
        drop(bus);

        assert_eq!(apps.recv().await, Err(Error::ChannelClosed));
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_lag() {
        let bus = WatchBus::with_capacity(2);
        let mut services = bus.subscribe(Kind::Service);

        for name in ["a", "b", "c", "d"] {
            bus.publish(WatchEvent::Added(service(name)));
        }

        assert!(matches!(
            services.recv().await,
            Err(Error::WatchLagged { skipped: 2 })
        ));
        assert!(services.recv().await.is_ok());
    }
}
