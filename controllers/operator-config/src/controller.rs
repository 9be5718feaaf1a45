//! Main controller implementation.
//!
//! Wires a file informer for the operator config to the [`Watcher`] and
//! [`Reconciler`], then runs until the shared cancellation token fires.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::{self, Watcher};
use file_informer::{FileInformerFactory, InformerConfig, ResourceId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main controller for the operator config file.
pub struct Controller {
    factory: FileInformerFactory,
    resource: ResourceId,
    reconciler: Arc<Reconciler>,
    config_watcher: JoinHandle<Result<(), ControllerError>>,
    sync_timeout: Duration,
    cancel: CancellationToken,
}

impl Controller {
    /// Creates a controller backed by filesystem watches.
    pub fn new(config: &ControllerConfig, cancel: CancellationToken) -> Result<Self, ControllerError> {
        let factory = FileInformerFactory::with_config(
            InformerConfig::default().with_resync_period(config.resync_period),
        );
        Self::with_factory(config, factory, cancel)
    }

    /// Creates a controller using informers from `factory`.
    pub fn with_factory(
        config: &ControllerConfig,
        factory: FileInformerFactory,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing Operator Config Controller");

        let resource = ResourceId::file(&config.config_path);
        let informer = factory.get_or_create(&resource)?;

        let (handler, events) = watcher::queue();
        informer.add_event_handler(handler);

        let reconciler = Arc::new(Reconciler::new());
        let config_watcher = {
            let watcher = Watcher::new(Arc::clone(&reconciler), events);
            let cancel = cancel.clone();
            tokio::spawn(async move { watcher.watch_config(cancel).await })
        };

        Ok(Self {
            factory,
            resource,
            reconciler,
            config_watcher,
            sync_timeout: config.sync_timeout,
            cancel,
        })
    }

    /// Shared handle to the loaded config.
    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    /// Starts the informer, waits for its initial sync and runs until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        self.factory.start_all(&self.cancel);

        let synced = tokio::time::timeout(self.sync_timeout, self.factory.wait_for_sync(&self.cancel))
            .await
            .map_err(|_| {
                self.cancel.cancel();
                ControllerError::Watch(format!(
                    "timed out after {:?} waiting for {} to sync",
                    self.sync_timeout, self.resource
                ))
            })?;

        if self.cancel.is_cancelled() {
            warn!("Shutdown requested before the config informer synced");
        } else if synced.get(&self.resource) != Some(&true) {
            self.cancel.cancel();
            return Err(ControllerError::Watch(format!(
                "informer for {} did not sync",
                self.resource
            )));
        } else {
            info!("Operator Config Controller running");
        }

        // The watcher only exits on its own if its queue is gone
        let result = (&mut self.config_watcher)
            .await
            .map_err(|e| ControllerError::Watch(format!("config watcher panicked: {e}")))?;
        self.cancel.cancel();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_informer::{FileEvent, FileOp, FileWatch, MockWatch, MockWatchHandle, WatchError};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    fn controller_config(path: &Path) -> ControllerConfig {
        ControllerConfig {
            config_path: path.to_path_buf(),
            resync_period: Duration::from_secs(3600),
            sync_timeout: Duration::from_secs(5),
        }
    }

    fn mock_factory() -> (FileInformerFactory, Arc<Mutex<Option<MockWatchHandle>>>) {
        let handle = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&handle);
        let factory = FileInformerFactory::with_watch_builder(
            InformerConfig::default().with_resync_period(Duration::from_secs(3600)),
            move || {
                let (watch, streams, h) = MockWatch::new();
                *slot.lock().unwrap() = Some(h);
                Ok((Box::new(watch) as Box<dyn FileWatch>, streams))
            },
        );
        (factory, handle)
    }

    async fn wait_for_image(reconciler: &Reconciler, image: Option<&str>) {
        for _ in 0..200 {
            let current = reconciler.current().await.map(|s| s.config.image_name);
            if current.as_deref() == image {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("config never reached {image:?}");
    }

    #[tokio::test]
    async fn test_initial_sync_loads_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "imageName: example/image\n").unwrap();

        let (factory, _) = mock_factory();
        let cancel = CancellationToken::new();
        let controller =
            Controller::with_factory(&controller_config(&path), factory, cancel.clone()).unwrap();
        let reconciler = controller.reconciler();
        let run = tokio::spawn(controller.run());

        wait_for_image(&reconciler, Some("example/image")).await;

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_file_events_drive_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "imageName: example/image\n").unwrap();

        let (factory, handle) = mock_factory();
        let cancel = CancellationToken::new();
        let controller =
            Controller::with_factory(&controller_config(&path), factory, cancel.clone()).unwrap();
        let reconciler = controller.reconciler();
        let run = tokio::spawn(controller.run());
        wait_for_image(&reconciler, Some("example/image")).await;

        let handle = handle.lock().unwrap().clone().unwrap();

        fs::write(&path, "imageName: example/next\n").unwrap();
        handle.send(FileEvent::new(path.clone(), FileOp::Write));
        wait_for_image(&reconciler, Some("example/next")).await;

        fs::remove_file(&path).unwrap();
        handle.send(FileEvent::new(path.clone(), FileOp::Remove));
        wait_for_image(&reconciler, None).await;

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_real_file_watch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "imageName: example/image\n").unwrap();

        let cancel = CancellationToken::new();
        let controller = Controller::new(&controller_config(&path), cancel.clone()).unwrap();
        let reconciler = controller.reconciler();
        let run = tokio::spawn(controller.run());
        wait_for_image(&reconciler, Some("example/image")).await;

        fs::write(&path, "imageName: example/next\n").unwrap();
        wait_for_image(&reconciler, Some("example/next")).await;

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("absent.yaml");

        let (factory, _) = mock_factory();
        let cancel = CancellationToken::new();
        let controller =
            Controller::with_factory(&controller_config(&path), factory, cancel.clone()).unwrap();
        let reconciler = controller.reconciler();
        let run = tokio::spawn(controller.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reconciler.current().await.is_none());

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_watch_construction_failure() {
        let factory = FileInformerFactory::with_watch_builder(
            InformerConfig::default(),
            || Err(WatchError::Init("no inotify".to_string())),
        );
        let result = Controller::with_factory(
            &controller_config(Path::new("config.yaml")),
            factory,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(ControllerError::Informer(_))));
    }
}
