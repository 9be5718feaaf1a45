//! Operator config watcher.
//!
//! [`ConfigEventHandler`] is registered on the file informer and queues each
//! notification; [`Watcher`] drains the queue and drives the reconciler, so
//! informer callbacks never block on file I/O.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use file_informer::ResourceEventHandler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// A queued change to the operator config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    Applied(PathBuf),
    Updated(PathBuf),
    Deleted(PathBuf),
}

/// Observer that forwards informer notifications into the work queue.
#[derive(Debug, Clone)]
pub struct ConfigEventHandler {
    tx: UnboundedSender<ConfigEvent>,
}

impl ConfigEventHandler {
    fn enqueue(&self, event: ConfigEvent) {
        trace!("Queueing {:?}", event);
        if self.tx.send(event).is_err() {
            debug!("Config queue closed, dropping notification");
        }
    }
}

impl ResourceEventHandler for ConfigEventHandler {
    fn on_add(&self, path: &Path) {
        self.enqueue(ConfigEvent::Applied(path.to_path_buf()));
    }

    fn on_update(&self, _old: &Path, new: &Path) {
        self.enqueue(ConfigEvent::Updated(new.to_path_buf()));
    }

    fn on_delete(&self, path: &Path) {
        self.enqueue(ConfigEvent::Deleted(path.to_path_buf()));
    }
}

/// Creates a connected handler and receiving queue.
pub fn queue() -> (ConfigEventHandler, UnboundedReceiver<ConfigEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConfigEventHandler { tx }, rx)
}

/// Applies queued config events until cancelled.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    events: UnboundedReceiver<ConfigEvent>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, events: UnboundedReceiver<ConfigEvent>) -> Self {
        Self { reconciler, events }
    }

    /// Processes events until `cancel` fires or every handler is gone.
    pub async fn watch_config(mut self, cancel: CancellationToken) -> Result<(), ControllerError> {
        info!("Starting operator config watcher");

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Operator config watcher stopping");
                    return Ok(());
                }
                event = self.events.recv() => event,
            };

            let Some(event) = event else {
                return Err(ControllerError::Watch(
                    "config event queue closed".to_string(),
                ));
            };
            self.handle(event).await;
        }
    }

    async fn handle(&self, event: ConfigEvent) {
        match event {
            ConfigEvent::Applied(path) | ConfigEvent::Updated(path) => {
                if let Err(e) = self.reconciler.reconcile_config(&path).await {
                    error!("Failed to reconcile operator config: {}", e);
                }
            }
            ConfigEvent::Deleted(path) => {
                // a swapped configmap link retires the old file but the path still resolves
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    debug!("Operator config {} replaced, reloading", path.display());
                    if let Err(e) = self.reconciler.reconcile_config(&path).await {
                        error!("Failed to reconcile operator config: {}", e);
                    }
                } else {
                    self.reconciler.clear(&path).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_handler_maps_notifications() {
        let (handler, mut rx) = queue();
        let path = Path::new("/etc/operator/config.yaml");

        handler.on_add(path);
        handler.on_update(path, path);
        handler.on_delete(path);

        assert_eq!(rx.try_recv().unwrap(), ConfigEvent::Applied(path.to_path_buf()));
        assert_eq!(rx.try_recv().unwrap(), ConfigEvent::Updated(path.to_path_buf()));
        assert_eq!(rx.try_recv().unwrap(), ConfigEvent::Deleted(path.to_path_buf()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handler_tolerates_closed_queue() {
        let (handler, rx) = queue();
        drop(rx);
        handler.on_add(Path::new("config.yaml"));
    }

    async fn wait_for_loaded(reconciler: &Reconciler, loaded: bool) {
        for _ in 0..100 {
            if reconciler.current().await.is_some() == loaded {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("config never became loaded={loaded}");
    }

    #[tokio::test]
    async fn test_watcher_applies_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "imageName: example/image\n").unwrap();

        let reconciler = Arc::new(Reconciler::new());
        let (handler, rx) = queue();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Watcher::new(Arc::clone(&reconciler), rx).watch_config(cancel.clone()));

        handler.on_add(&path);
        wait_for_loaded(&reconciler, true).await;

        fs::remove_file(&path).unwrap();
        handler.on_delete(&path);
        wait_for_loaded(&reconciler, false).await;

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_delete_of_replaced_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "imageName: example/image\n").unwrap();

        let reconciler = Arc::new(Reconciler::new());
        let (handler, rx) = queue();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Watcher::new(Arc::clone(&reconciler), rx).watch_config(cancel.clone()));

        handler.on_add(&path);
        wait_for_loaded(&reconciler, true).await;

        fs::write(&path, "imageName: example/next\n").unwrap();
        handler.on_delete(&path);
        for _ in 0..100 {
            let image = reconciler.current().await.map(|s| s.config.image_name);
            if image.as_deref() == Some("example/next") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            reconciler.current().await.unwrap().config.image_name,
            "example/next"
        );

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_watcher_survives_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "imageName: [broken").unwrap();

        let reconciler = Arc::new(Reconciler::new());
        let (handler, rx) = queue();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Watcher::new(Arc::clone(&reconciler), rx).watch_config(cancel.clone()));

        handler.on_add(&path);
        fs::write(&path, "imageName: example/fixed\n").unwrap();
        handler.on_update(&path, &path);
        wait_for_loaded(&reconciler, true).await;
        assert_eq!(
            reconciler.current().await.unwrap().config.image_name,
            "example/fixed"
        );

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_watcher_fails_when_queue_closes() {
        let reconciler = Arc::new(Reconciler::new());
        let (handler, rx) = queue();
        drop(handler);

        let err = Watcher::new(reconciler, rx)
            .watch_config(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Watch(_)));
    }
}
