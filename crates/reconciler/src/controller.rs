//! Controller runtime: event sources, resync, workers.
//!
//! Sources and the resync timer feed object keys into a [`WorkQueue`]; workers
//! take keys off the queue and run the [`Reconciler`]. Failed passes are
//! requeued with exponential backoff.

use std::sync::Arc;

use cfp_core::{ObjectKey, Resource};
use cfp_store::{Error as StoreError, ObjectStore, WatchStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;

/// Produces reconcile requests for a controller.
///
/// `start` subscribes before returning so no change made after the call is
/// missed.
pub trait Source: Send + Sync {
    /// Start feeding `queue` until `stop` fires.
    fn start(&self, queue: Arc<WorkQueue>, stop: watch::Receiver<bool>) -> JoinHandle<()>;
}

/// Wait until the stop flag is raised or its sender is gone.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Enqueues the key of every object of one kind that changes.
pub struct KindSource<R: Resource> {
    store: Arc<dyn ObjectStore<R>>,
}

impl<R: Resource> KindSource<R> {
    pub fn new(store: Arc<dyn ObjectStore<R>>) -> Self {
        Self { store }
    }
}

impl<R: Resource> Source for KindSource<R> {
    fn start(&self, queue: Arc<WorkQueue>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut events: WatchStream<R> = self.store.watch();
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            debug!(kind = %R::KIND, object = %event.object().key(), event = event.event_type(), "Watch event");
                            queue.add(event.object().key()).await;
                        }
                        Err(StoreError::WatchLagged { skipped }) => {
                            warn!(kind = %R::KIND, skipped, "Watch lagged, relisting");
                            enqueue_all(store.as_ref(), &queue).await;
                        }
                        Err(_) => break,
                    },
                    () = stopped(&mut stop) => break,
                }
            }
            debug!(kind = %R::KIND, "Watch source stopped");
        })
    }
}

async fn enqueue_all<R: Resource>(store: &dyn ObjectStore<R>, queue: &WorkQueue) {
    match store.list(None).await {
        Ok(objects) => {
            for obj in &objects {
                queue.add(obj.key()).await;
            }
        }
        Err(e) => warn!(kind = %R::KIND, error = %e, "Relist failed"),
    }
}

/// Drives one [`Reconciler`].
pub struct Controller<K: Reconciler> {
    reconciler: Arc<K>,
    store: Arc<dyn ObjectStore<K::Object>>,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
    sources: Vec<Box<dyn Source>>,
}

impl<K: Reconciler> Controller<K> {
    /// Create a controller watching its own kind in `store`.
    pub fn new(
        reconciler: Arc<K>,
        store: Arc<dyn ObjectStore<K::Object>>,
        config: ControllerConfig,
    ) -> Self {
        let queue = WorkQueue::new_arc(config.backoff_base, config.backoff_max);
        let own: Box<dyn Source> = Box::new(KindSource::new(Arc::clone(&store)));
        Self {
            reconciler,
            store,
            queue,
            config,
            sources: vec![own],
        }
    }

    /// Add another source of reconcile requests.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// The controller's queue.
    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Subscribe every source.
    pub fn start_sources(&self, stop: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.sources
            .iter()
            .map(|source| source.start(Arc::clone(&self.queue), stop.clone()))
            .collect()
    }

    /// Spawn the resync timer and the workers.
    pub fn start_workers(&self, stop: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            kind = %<K::Object as Resource>::KIND,
            workers = self.config.workers,
            resync_secs = self.config.resync_interval.as_secs(),
            "Starting controller"
        );

        let mut handles = vec![self.spawn_resync(stop.clone())];
        handles.extend((0..self.config.workers).map(|worker| {
            spawn_worker(
                worker,
                Arc::clone(&self.reconciler),
                Arc::clone(&self.queue),
                stop.clone(),
            )
        }));
        handles
    }

    fn spawn_resync(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let queue = Arc::clone(&self.queue);
        let period = self.config.resync_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!(kind = %<K::Object as Resource>::KIND, "Resync");
                        enqueue_all(store.as_ref(), &queue).await;
                    }
                    () = stopped(&mut stop) => break,
                }
            }
        })
    }
}

fn spawn_worker<K: Reconciler>(
    worker: usize,
    reconciler: Arc<K>,
    queue: Arc<WorkQueue>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                key = queue.get() => match key {
                    Some(key) => process(reconciler.as_ref(), &queue, key).await,
                    None => break,
                },
                () = stopped(&mut stop) => break,
            }
        }
        debug!(kind = %<K::Object as Resource>::KIND, worker, "Worker stopped");
    })
}

/// Run one pass and schedule what follows.
async fn process<K: Reconciler>(reconciler: &K, queue: &Arc<WorkQueue>, key: ObjectKey) {
    match reconciler.reconcile(&key).await {
        Ok(result) => {
            queue.forget(&key).await;
            queue.done(&key).await;
            if result.requeue {
                queue.add(key).await;
            }
        }
        Err(e) if e.is_retryable() => {
            queue.done(&key).await;
            let delay = queue.add_rate_limited(key.clone()).await;
            warn!(
                kind = %<K::Object as Resource>::KIND,
                object = %key,
                error = %e,
                retry_ms = delay.as_millis(),
                "Reconcile failed"
            );
        }
        Err(e) => {
            error!(kind = %<K::Object as Resource>::KIND, object = %key, error = %e, "Reconcile failed permanently");
            queue.forget(&key).await;
            queue.done(&key).await;
        }
    }
}
