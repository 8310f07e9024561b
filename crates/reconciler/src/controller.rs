//! Controller: wires informers, router, queue and workers together.
//!
//! Startup is gated on every cache having synced. Workers never start
//! against a partial view: if the caches do not sync within the configured
//! deadline, [`Controller::run`] fails instead.

use std::sync::Arc;
use std::time::Duration;

use app_core::{Kind, Scheme};
use app_events::{EventRecorder, ObjectApi};
use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::Cache;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::informer::Informer;
use crate::queue::WorkQueue;
use crate::rate_limit::default_controller_rate_limiter;
use crate::reconciler::Reconciler;
use crate::router::EventRouter;
use crate::worker::WorkerPool;

/// Capacity of the informer to router channel.
pub const EVENT_BUFFER: usize = 1024;

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Resolve once `stop` carries `true` or its sender is gone.
pub(crate) async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// The App controller.
pub struct Controller {
    api: Arc<dyn ObjectApi>,
    cache: Arc<Cache>,
    queue: Arc<WorkQueue<String>>,
    reconciler: Arc<Reconciler>,
    config: ControllerConfig,
    stop_tx: watch::Sender<bool>,
}

impl Controller {
    /// Create a controller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(
        api: Arc<dyn ObjectApi>,
        recorder: Arc<dyn EventRecorder>,
        scheme: Scheme,
        config: ControllerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(Cache::new());
        let queue = WorkQueue::new_arc("apps", default_controller_rate_limiter(&config.rate_limit));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&api),
            Arc::clone(&cache),
            recorder,
            scheme,
        ));
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            api,
            cache,
            queue,
            reconciler,
            config,
            stop_tx,
        })
    }

    /// Get a handle that stops [`Self::run`].
    pub fn stopper(&self) -> ControllerStopper {
        ControllerStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// The informer cache (read only from outside).
    pub const fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// The work queue.
    pub const fn queue(&self) -> &Arc<WorkQueue<String>> {
        &self.queue
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run until stopped.
    ///
    /// Starts one informer per kind, waits for every cache to sync, then runs
    /// the worker pool until the stop signal. On stop the queue is shut down
    /// first, in-flight reconciles finish, then informers and the router are
    /// wound down.
    ///
    /// A controller runs once. The stop signal stays raised, so calling
    /// `run` again after a stop (or after a stop issued before the first
    /// call) returns `Ok(())` promptly without reconciling anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheSyncTimeout`] if the caches do not sync in time;
    /// no reconcile has been attempted in that case.
    pub async fn run(&self) -> Result<()> {
        info!(workers = self.config.workers, "Starting App controller");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let informers: Vec<JoinHandle<Result<()>>> = Kind::ALL
            .into_iter()
            .map(|kind| {
                let informer = Informer::new(
                    kind,
                    Arc::clone(&self.api),
                    Arc::clone(&self.cache),
                    events_tx.clone(),
                );
                tokio::spawn(informer.run(self.stop_tx.subscribe()))
            })
            .collect();
        drop(events_tx);
        let router = tokio::spawn(EventRouter::new(Arc::clone(&self.queue)).run(events_rx));

        info!("Waiting for informer caches to sync");
        let result = match self.wait_for_cache_sync().await {
            Ok(true) => {
                self.run_workers().await;
                Ok(())
            }
            Ok(false) => {
                info!("Stopped before caches synced");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to wait for caches to sync");
                Err(e)
            }
        };

        self.queue.shut_down();
        self.stop_tx.send_replace(true);
        for (kind, joined) in Kind::ALL.into_iter().zip(join_all(informers).await) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(kind = %kind, error = %e, "Informer failed"),
                Err(e) => error!(kind = %kind, error = %e, "Informer task failed"),
            }
        }
        if let Err(e) = router.await {
            error!(error = %e, "Event router task failed");
        }

        info!("Controller stopped");
        result
    }

    async fn run_workers(&self) {
        let pool = WorkerPool::spawn(
            self.config.workers,
            &self.queue,
            &self.reconciler,
            self.config.max_retries,
        );

        wait_for_stop(&mut self.stop_tx.subscribe()).await;

        info!("Shutting down workers");
        self.queue.shut_down();
        pool.join().await;
    }

    /// `Ok(true)` once every cache synced, `Ok(false)` if stopped first.
    async fn wait_for_cache_sync(&self) -> Result<bool> {
        let timeout = self.config.cache_sync_timeout();
        let mut stop = self.stop_tx.subscribe();

        let synced = async {
            loop {
                if self.cache.all_synced() {
                    return true;
                }
                tokio::select! {
                    () = tokio::time::sleep(SYNC_POLL_INTERVAL) => {}
                    () = wait_for_stop(&mut stop) => return false,
                }
            }
        };

        tokio::time::timeout(timeout, synced)
            .await
            .map_err(|_| Error::CacheSyncTimeout {
                timeout,
                pending: self.cache.unsynced_kinds(),
            })
    }
}

/// Handle to stop a running controller.
#[derive(Debug, Clone)]
pub struct ControllerStopper {
    stop_tx: watch::Sender<bool>,
}

impl ControllerStopper {
    /// Stop the controller.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use app_events::{InMemoryObjectStore, TracingRecorder};

    use super::*;

    fn controller(config: ControllerConfig) -> Result<Controller> {
        Controller::new(
            InMemoryObjectStore::new_arc(),
            Arc::new(TracingRecorder::new()),
            Scheme::with_defaults(),
            config,
        )
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ControllerConfig {
            workers: 0,
            ..ControllerConfig::default()
        };
        assert!(matches!(controller(config), Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_stop_before_run_returns_promptly() -> Result<()> {
        let controller = controller(ControllerConfig::default())?;
        let stopper = controller.stopper();
        stopper.stop();
        assert!(stopper.is_stopped());

        let result = tokio::time::timeout(Duration::from_secs(5), controller.run()).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(controller.queue().is_shutting_down());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_after_stop_returns_promptly() -> Result<()> {
        let controller = controller(ControllerConfig::default())?;
        let stopper = controller.stopper();
        stopper.stop();
        tokio::time::timeout(Duration::from_secs(5), controller.run())
            .await
            .map_err(|_| Error::invalid_config("first run hung"))??;

        let again = tokio::time::timeout(Duration::from_secs(5), controller.run()).await;

        assert!(matches!(again, Ok(Ok(()))));
        assert!(stopper.is_stopped());
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_for_stop_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_stop(&mut rx).await });

        tx.send_replace(true);

        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_stop_resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        let waited = tokio::time::timeout(Duration::from_secs(1), wait_for_stop(&mut rx)).await;
        assert!(waited.is_ok());
    }
}
