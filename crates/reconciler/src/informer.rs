//! Watch adapter: keeps one kind of the cache current and reports changes.
//!
//! An informer subscribes to the watch feed of its kind, lists the kind,
//! replaces the cache contents with the listing (which marks the kind
//! synced), then applies watch events one by one. Every change that reaches
//! the cache is forwarded to the event router as a [`ResourceEvent`].
//!
//! Subscribing before listing means nothing written after the listing is
//! missed; events already covered by the listing are dropped by the cache's
//! resource version check. When the feed lags, the informer relists and
//! forwards the difference.

use std::sync::Arc;
use std::time::Duration;

use app_core::Kind;
use app_events::ObjectApi;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::cache::{Cache, ResourceEvent};
use crate::controller::wait_for_stop;
use crate::error::Result;

/// Pause between failed listings.
pub const RELIST_BACKOFF: Duration = Duration::from_millis(500);

/// Watch adapter for one kind.
pub struct Informer {
    kind: Kind,
    api: Arc<dyn ObjectApi>,
    cache: Arc<Cache>,
    events: mpsc::Sender<ResourceEvent>,
}

impl Informer {
    pub fn new(
        kind: Kind,
        api: Arc<dyn ObjectApi>,
        cache: Arc<Cache>,
        events: mpsc::Sender<ResourceEvent>,
    ) -> Self {
        Self {
            kind,
            api,
            cache,
            events,
        }
    }

    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// List the kind, replace the cache contents and forward the difference.
    ///
    /// Returns the number of listed objects.
    ///
    /// # Errors
    ///
    /// Returns the API error if the listing fails; the cache is untouched.
    pub async fn resync(&self) -> Result<usize> {
        let listed = self.api.list(self.kind, None).await?;
        let count = listed.len();
        let changes = self.cache.replace(self.kind, listed);
        debug!(
            kind = %self.kind,
            objects = count,
            changes = changes.len(),
            "Listed"
        );

        for change in changes {
            self.forward(change).await;
        }
        Ok(count)
    }

    /// Relist until it succeeds. Returns `false` if stopped first.
    async fn resync_until_stopped(&self, stop: &mut watch::Receiver<bool>) -> bool {
        loop {
            match self.resync().await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(kind = %self.kind, error = %e, "List failed, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(RELIST_BACKOFF) => {}
                        () = wait_for_stop(stop) => return false,
                    }
                }
            }
        }
    }

    async fn forward(&self, change: ResourceEvent) {
        if self.events.send(change).await.is_err() {
            trace!(kind = %self.kind, "Event router gone, dropping change");
        }
    }

    /// Run until `stop` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch feed closes.
    pub async fn run(self, mut stop: watch::Receiver<bool>) -> Result<()> {
        let mut stream = self.api.watch(self.kind);
        info!(kind = %self.kind, "Starting informer");

        if !self.resync_until_stopped(&mut stop).await {
            info!(kind = %self.kind, "Informer stopped before sync");
            return Ok(());
        }

        loop {
            tokio::select! {
                () = wait_for_stop(&mut stop) => {
                    info!(kind = %self.kind, "Informer stopped");
                    return Ok(());
                }
                received = stream.recv() => match received {
                    Ok(event) => {
                        if let Some(change) = self.cache.apply(&event) {
                            self.forward(change).await;
                        }
                    }
                    Err(app_events::Error::WatchLagged { skipped }) => {
                        warn!(kind = %self.kind, skipped, "Watch lagged, relisting");
                        if !self.resync_until_stopped(&mut stop).await {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        warn!(kind = %self.kind, error = %e, "Watch ended");
                        return Err(e.into());
                    }
                },
            }
        }
    }
}
