//! File-backed informer
//!
//! A [`FileInformer`] owns one watched path and republishes what happens to
//! it as add/update/delete notifications:
//!
//! | Source | Notification |
//! |---|---|
//! | startup | `on_add` once, before any event |
//! | create, write | `on_add` |
//! | rename, chmod | `on_update(path, path)` |
//! | remove | `on_delete`, then the watch is re-armed |
//! | resync timer | `on_update(path, path)` |
//!
//! Observers are registered while the informer is idle and frozen once
//! [`FileInformer::run`] is called. The event loop runs on its own task until
//! the cancellation token fires or the watch primitive closes its streams,
//! then unregisters the path and releases the primitive.

use crate::observer::ResourceEventHandler;
use crate::runtime::{handle_error, report_error};
use crate::watch::{FileEvent, FileOp, FileWatch, WatchStreams};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Lifecycle of an informer. It only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Accepting observers, not running
    Idle,
    /// `run` was called; observers are frozen
    Started,
    /// The initial notification pass completed
    Synced,
}

type Handlers = Arc<[Arc<dyn ResourceEventHandler>]>;

struct Shared {
    state: LifecycleState,
    handlers: Vec<Arc<dyn ResourceEventHandler>>,
}

/// Watches one file and fans its changes out to registered observers.
pub struct FileInformer {
    path: PathBuf,
    resync_period: Duration,
    shared: RwLock<Shared>,
    // handed to the event loop by the first run
    watch: Mutex<Option<(Box<dyn FileWatch>, WatchStreams)>>,
    synced: watch::Sender<bool>,
}

impl FileInformer {
    /// Creates an idle informer for `path`.
    ///
    /// An empty path produces an informer that starts but never syncs.
    pub fn new(
        path: impl Into<PathBuf>,
        watch: Box<dyn FileWatch>,
        streams: WatchStreams,
        resync_period: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            resync_period,
            shared: RwLock::new(Shared {
                state: LifecycleState::Idle,
                handlers: Vec::new(),
            }),
            watch: Mutex::new(Some((watch, streams))),
            synced: watch::Sender::new(false),
        }
    }

    /// The watched path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The resync period shared by all observers.
    #[must_use]
    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.read().state
    }

    /// Number of registered observers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.read().handlers.len()
    }

    /// Registers an observer. Observers are notified in registration order.
    ///
    /// # Panics
    ///
    /// Panics if [`FileInformer::run`] has already been called. The event loop
    /// reads the observer list without locking, so it must be complete before
    /// the informer starts.
    pub fn add_event_handler(&self, handler: impl ResourceEventHandler + 'static) {
        let mut shared = self.write();
        if shared.state != LifecycleState::Idle {
            panic!(
                "cannot add event handlers after informer for {} has started",
                self.path.display()
            );
        }
        shared.handlers.push(Arc::new(handler));
    }

    /// Starts the informer. Only the first call has any effect.
    ///
    /// Registers the path with the watch primitive, notifies every observer
    /// with `on_add`, marks the informer synced and spawns the event loop,
    /// which stops when `cancel` fires. A failed registration is logged and
    /// the informer carries on without filesystem events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, cancel: &CancellationToken) {
        let Some((handlers, mut watch, streams)) = self.start() else {
            trace!("informer for {} already started", self.path.display());
            return;
        };

        if self.path.as_os_str().is_empty() {
            debug!("informer has no file to watch and will never sync");
            handle_error(watch.close());
            return;
        }

        handle_error(watch.add(&self.path));
        debug!("started watching {}", self.path.display());

        // initial read
        for handler in handlers.iter() {
            handler.on_add(&self.path);
        }

        self.write().state = LifecycleState::Synced;
        self.synced.send_replace(true);
        info!("informer for {} synced", self.path.display());

        let event_loop = EventLoop {
            path: self.path.clone(),
            resync_period: self.resync_period,
            handlers,
            watch,
            streams,
            cancel: cancel.clone(),
        };
        tokio::spawn(event_loop.run());
    }

    /// Whether the initial notification pass has completed.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.read().state == LifecycleState::Synced
    }

    /// Waits until the informer has synced or `cancel` fires.
    ///
    /// Returns `true` if the informer synced; an informer that is already
    /// synced reports `true` even when `cancel` has fired.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) -> bool {
        let mut synced = self.synced.subscribe();
        tokio::select! {
            biased;
            res = synced.wait_for(|s| *s) => res.is_ok(),
            () = cancel.cancelled() => false,
        }
    }

    // Flips Idle to Started and hands out what the event loop needs. Returns
    // None for every call after the first.
    fn start(&self) -> Option<(Handlers, Box<dyn FileWatch>, WatchStreams)> {
        let handlers: Handlers = {
            let mut shared = self.write();
            if shared.state != LifecycleState::Idle {
                return None;
            }
            shared.state = LifecycleState::Started;
            shared.handlers.iter().cloned().collect()
        };
        let (watch, streams) = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some((handlers, watch, streams))
    }

    fn read(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FileInformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.read();
        f.debug_struct("FileInformer")
            .field("path", &self.path)
            .field("resync_period", &self.resync_period)
            .field("state", &shared.state)
            .field("handlers", &shared.handlers.len())
            .finish_non_exhaustive()
    }
}

struct EventLoop {
    path: PathBuf,
    resync_period: Duration,
    handlers: Handlers,
    watch: Box<dyn FileWatch>,
    streams: WatchStreams,
    cancel: CancellationToken,
}

impl EventLoop {
    async fn run(mut self) {
        // a zero period would spin; treat it as "never resync"
        let resync_enabled = !self.resync_period.is_zero();
        let resync = tokio::time::sleep(self.resync_period);
        tokio::pin!(resync);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("cancelled, stopping informer for {}", self.path.display());
                    break;
                }
                () = &mut resync, if resync_enabled => {
                    debug!(
                        "resyncing file {} after {:?}",
                        self.path.display(),
                        self.resync_period
                    );
                    self.notify_update();
                    resync.as_mut().reset(Instant::now() + self.resync_period);
                }
                event = self.streams.events.recv() => {
                    let Some(event) = event else {
                        debug!("event stream closed for {}", self.path.display());
                        break;
                    };
                    self.handle_event(&event);
                }
                err = self.streams.errors.recv() => {
                    let Some(err) = err else {
                        debug!("error stream closed for {}", self.path.display());
                        break;
                    };
                    report_error(&err);
                }
            }
        }

        self.teardown();
    }

    fn handle_event(&mut self, event: &FileEvent) {
        trace!("filewatcher got event {} for {}", event.op, event.path.display());
        if !event.is_for(&self.path) {
            return;
        }
        debug!("filewatcher got event {} for {}", event.op, self.path.display());

        match event.op {
            FileOp::Create | FileOp::Write => self.notify_add(),
            // chmod is what a mounted configmap or secret emits on reload
            FileOp::Rename | FileOp::Chmod => self.notify_update(),
            FileOp::Remove => {
                self.notify_delete();
                // a replaced file invalidates the old watch
                handle_error(self.watch.add(&self.path));
            }
        }
    }

    fn notify_add(&self) {
        for handler in self.handlers.iter() {
            handler.on_add(&self.path);
        }
    }

    fn notify_update(&self) {
        for handler in self.handlers.iter() {
            handler.on_update(&self.path, &self.path);
        }
    }

    fn notify_delete(&self) {
        for handler in self.handlers.iter() {
            handler.on_delete(&self.path);
        }
    }

    fn teardown(&mut self) {
        handle_error(self.watch.remove(&self.path));
        handle_error(self.watch.close());
        debug!("stopped watching {}", self.path.display());
    }
}
