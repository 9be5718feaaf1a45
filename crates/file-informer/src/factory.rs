//! Informer factory
//!
//! The factory hands out one [`FileInformer`] per [`ResourceId`], creating it
//! on first request. Controllers register their observers on the informers
//! they obtain, then call [`FileInformerFactory::start_all`] and
//! [`FileInformerFactory::wait_for_sync`]. Both may be called repeatedly; an
//! informer is only ever started once.
//!
//! The registry lock is held for map reads and writes only. Watch
//! construction and sync waits happen outside it.

use crate::config::InformerConfig;
use crate::error::WatchError;
use crate::informer::FileInformer;
use crate::resource::ResourceId;
use crate::watch::{FileWatch, NotifyWatch, WatchStreams};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Builds a fresh watch primitive for a new informer.
pub type WatchBuilder =
    Arc<dyn Fn() -> Result<(Box<dyn FileWatch>, WatchStreams), WatchError> + Send + Sync>;

#[derive(Default)]
struct Registry {
    informers: HashMap<ResourceId, Arc<FileInformer>>,
    // informers whose run has been launched
    started: HashSet<ResourceId>,
}

/// Registry of file informers keyed by resource identity.
pub struct FileInformerFactory {
    config: InformerConfig,
    new_watch: WatchBuilder,
    registry: Mutex<Registry>,
}

impl FileInformerFactory {
    /// Creates a factory with default settings and `notify`-backed watches.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(InformerConfig::default())
    }

    /// Creates a factory with `notify`-backed watches.
    #[must_use]
    pub fn with_config(config: InformerConfig) -> Self {
        Self::with_watch_builder(config, || {
            let (watch, streams) = NotifyWatch::new()?;
            Ok((Box::new(watch) as Box<dyn FileWatch>, streams))
        })
    }

    /// Creates a factory that builds watch primitives with `builder`.
    pub fn with_watch_builder(
        config: InformerConfig,
        builder: impl Fn() -> Result<(Box<dyn FileWatch>, WatchStreams), WatchError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            config,
            new_watch: Arc::new(builder),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Settings applied to every informer this factory creates.
    #[must_use]
    pub fn config(&self) -> &InformerConfig {
        &self.config
    }

    /// Returns the informer for `id`, creating it if needed.
    ///
    /// Repeated calls with the same identity return the same instance.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Init`] if the watch primitive for a new informer
    /// cannot be built. Nothing is registered in that case and the call is
    /// not retried.
    pub fn get_or_create(&self, id: &ResourceId) -> Result<Arc<FileInformer>, WatchError> {
        if let Some(informer) = self.registry().informers.get(id) {
            return Ok(Arc::clone(informer));
        }

        let (watch, streams) = (self.new_watch)()?;
        let informer = Arc::new(FileInformer::new(
            id.path(),
            watch,
            streams,
            self.config.default_resync_period,
        ));

        // another caller may have won the race while the watch was built
        let mut registry = self.registry();
        let informer = registry
            .informers
            .entry(id.clone())
            .or_insert_with(|| {
                debug!("created informer for {}", id);
                informer
            });
        Ok(Arc::clone(informer))
    }

    /// Launches every registered informer that has not been started yet.
    ///
    /// Each informer runs on its own task and stops when `cancel` fires.
    /// Must be called from within a Tokio runtime.
    pub fn start_all(&self, cancel: &CancellationToken) {
        let mut registry = self.registry();
        let Registry { informers, started } = &mut *registry;

        for (id, informer) in informers.iter() {
            if !started.insert(id.clone()) {
                continue;
            }
            let informer = Arc::clone(informer);
            let cancel = cancel.clone();
            tokio::spawn(async move { informer.run(&cancel) });
            info!("started informer for {}", id);
        }
    }

    /// Waits for every started informer to sync or for `cancel` to fire.
    ///
    /// Returns, per started informer, whether it synced. Informers that were
    /// never started are left out.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) -> HashMap<ResourceId, bool> {
        let started: Vec<(ResourceId, Arc<FileInformer>)> = {
            let registry = self.registry();
            registry
                .informers
                .iter()
                .filter(|(id, _)| registry.started.contains(*id))
                .map(|(id, informer)| (id.clone(), Arc::clone(informer)))
                .collect()
        };

        join_all(started.into_iter().map(|(id, informer)| async move {
            let synced = informer.wait_for_sync(cancel).await;
            (id, synced)
        }))
        .await
        .into_iter()
        .collect()
    }

    /// Number of informers created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().informers.len()
    }

    /// Whether no informer has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().informers.is_empty()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FileInformerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileInformerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("FileInformerFactory")
            .field("config", &self.config)
            .field("informers", &registry.informers.len())
            .field("started", &registry.started.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockWatch, MockWatchHandle};
    use crate::observer::ResourceEventHandlerFuncs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Factory whose watches are mocks; every handle is kept for inspection.
    fn mock_factory() -> (FileInformerFactory, Arc<Mutex<Vec<MockWatchHandle>>>) {
        let handles = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let handles = Arc::clone(&handles);
            FileInformerFactory::with_watch_builder(InformerConfig::default(), move || {
                let (watch, streams, handle) = MockWatch::new();
                handles.lock().unwrap().push(handle);
                Ok((Box::new(watch) as Box<dyn FileWatch>, streams))
            })
        };
        (factory, handles)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let (factory, handles) = mock_factory();
        let id = ResourceId::file("/tmp/x");

        let first = factory.get_or_create(&id).unwrap();
        let second = factory.get_or_create(&id).unwrap();
        let other = factory.get_or_create(&ResourceId::file("/tmp/y")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(first.path(), PathBuf::from("/tmp/x"));
        assert_eq!(other.path(), PathBuf::from("/tmp/y"));
        assert_eq!(factory.len(), 2);
        assert_eq!(handles.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_informers_use_configured_resync_period() {
        let config = InformerConfig::default().with_resync_period(Duration::from_secs(7));
        let factory = FileInformerFactory::with_watch_builder(config, || {
            let (watch, streams, _handle) = MockWatch::new();
            Ok((Box::new(watch) as Box<dyn FileWatch>, streams))
        });

        let informer = factory.get_or_create(&ResourceId::file("/tmp/x")).unwrap();
        assert_eq!(informer.resync_period(), Duration::from_secs(7));
    }

    #[test]
    fn test_watch_construction_failure_is_returned() {
        let factory = FileInformerFactory::with_watch_builder(InformerConfig::default(), || {
            Err(WatchError::Init("too many open files".to_string()))
        });

        let result = factory.get_or_create(&ResourceId::file("/tmp/x"));
        assert!(matches!(result, Err(WatchError::Init(_))));
        assert!(factory.is_empty());
    }

    #[tokio::test]
    async fn test_start_all_launches_each_informer_once() {
        let (factory, handles) = mock_factory();
        let adds = Arc::new(AtomicUsize::new(0));
        for path in ["/tmp/a", "/tmp/b"] {
            let informer = factory.get_or_create(&ResourceId::file(path)).unwrap();
            let adds = Arc::clone(&adds);
            informer.add_event_handler(ResourceEventHandlerFuncs::new().add_func(move |_| {
                adds.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let cancel = CancellationToken::new();
        factory.start_all(&cancel);
        factory.start_all(&cancel);
        let synced = factory.wait_for_sync(&cancel).await;
        factory.start_all(&cancel);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(synced.len(), 2);
        assert!(synced.values().all(|s| *s));
        assert_eq!(adds.load(Ordering::SeqCst), 2);
        for handle in handles.lock().unwrap().iter() {
            assert_eq!(handle.add_calls().len(), 1);
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_start_all_picks_up_informers_created_later() {
        let (factory, _handles) = mock_factory();
        let cancel = CancellationToken::new();

        let a = factory.get_or_create(&ResourceId::file("/tmp/a")).unwrap();
        factory.start_all(&cancel);
        let b = factory.get_or_create(&ResourceId::file("/tmp/b")).unwrap();
        assert_eq!(factory.wait_for_sync(&cancel).await.len(), 1);

        factory.start_all(&cancel);
        let synced = factory.wait_for_sync(&cancel).await;
        assert_eq!(synced.len(), 2);
        assert!(a.has_synced());
        assert!(b.has_synced());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_wait_for_sync_excludes_unstarted_informers() {
        let (factory, _handles) = mock_factory();
        factory.get_or_create(&ResourceId::file("/tmp/a")).unwrap();

        let cancel = CancellationToken::new();
        assert!(factory.wait_for_sync(&cancel).await.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_sync_reports_cancellation() {
        let (factory, _handles) = mock_factory();
        let synced_id = ResourceId::file("/tmp/a");
        let silent_id = ResourceId::file("");
        factory.get_or_create(&synced_id).unwrap();
        factory.get_or_create(&silent_id).unwrap();

        let cancel = CancellationToken::new();
        factory.start_all(&cancel);
        let informer = factory.get_or_create(&synced_id).unwrap();
        wait_until(|| informer.has_synced()).await;

        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };
        let synced = factory.wait_for_sync(&cancel).await;
        waiter.await.unwrap();

        assert_eq!(synced.get(&synced_id), Some(&true));
        assert_eq!(synced.get(&silent_id), Some(&false));
    }

    #[tokio::test]
    async fn test_cancel_tears_down_every_informer() {
        let (factory, handles) = mock_factory();
        factory.get_or_create(&ResourceId::file("/tmp/a")).unwrap();
        factory.get_or_create(&ResourceId::file("/tmp/b")).unwrap();

        let cancel = CancellationToken::new();
        factory.start_all(&cancel);
        factory.wait_for_sync(&cancel).await;
        cancel.cancel();

        let handles = handles.lock().unwrap().clone();
        wait_until(|| handles.iter().all(|h| h.close_count() == 1)).await;
    }
}
