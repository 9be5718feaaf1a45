//! Mock watch primitive for unit testing
//!
//! [`MockWatch`] records every call made by an informer and lets the test
//! inject change events and watch errors through a [`MockWatchHandle`],
//! without touching the filesystem.

use crate::error::WatchError;
use crate::watch::{FileEvent, FileWatch, WatchStreams};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug, Default)]
struct MockState {
    add_calls: Vec<PathBuf>,
    remove_calls: Vec<PathBuf>,
    close_count: usize,
    fail_adds: bool,
    event_tx: Option<UnboundedSender<FileEvent>>,
    error_tx: Option<UnboundedSender<WatchError>>,
}

/// In-memory [`FileWatch`].
#[derive(Debug)]
pub struct MockWatch {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle of a [`MockWatch`].
#[derive(Debug, Clone)]
pub struct MockWatchHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockWatch {
    /// Creates a mock, the streams it delivers on and a handle to drive it.
    #[must_use]
    pub fn new() -> (Self, WatchStreams, MockWatchHandle) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MockState {
            event_tx: Some(event_tx),
            error_tx: Some(error_tx),
            ..MockState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            WatchStreams { events, errors },
            MockWatchHandle { state },
        )
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FileWatch for MockWatch {
    fn add(&mut self, path: &Path) -> Result<(), WatchError> {
        let mut state = lock(&self.state);
        state.add_calls.push(path.to_path_buf());
        if state.fail_adds {
            return Err(WatchError::Add {
                path: path.to_path_buf(),
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<(), WatchError> {
        lock(&self.state).remove_calls.push(path.to_path_buf());
        Ok(())
    }

    fn close(&mut self) -> Result<(), WatchError> {
        let mut state = lock(&self.state);
        state.close_count += 1;
        state.event_tx = None;
        state.error_tx = None;
        Ok(())
    }
}

impl MockWatchHandle {
    /// Delivers a change event. Ignored once the streams are closed.
    pub fn send(&self, event: FileEvent) {
        if let Some(tx) = &lock(&self.state).event_tx {
            let _ = tx.send(event);
        }
    }

    /// Delivers a watch error. Ignored once the streams are closed.
    pub fn send_error(&self, err: WatchError) {
        if let Some(tx) = &lock(&self.state).error_tx {
            let _ = tx.send(err);
        }
    }

    /// Closes both streams as if the primitive had gone away.
    pub fn close_streams(&self) {
        let mut state = lock(&self.state);
        state.event_tx = None;
        state.error_tx = None;
    }

    /// Makes every subsequent `add` fail.
    pub fn fail_adds(&self, fail: bool) {
        lock(&self.state).fail_adds = fail;
    }

    /// Paths passed to `add`, in call order.
    #[must_use]
    pub fn add_calls(&self) -> Vec<PathBuf> {
        lock(&self.state).add_calls.clone()
    }

    /// Paths passed to `remove`, in call order.
    #[must_use]
    pub fn remove_calls(&self) -> Vec<PathBuf> {
        lock(&self.state).remove_calls.clone()
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }
}
