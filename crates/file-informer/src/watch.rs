//! Watch primitive
//!
//! A [`FileWatch`] registers paths with the operating system and delivers
//! what happens to them on two unbounded streams, one for change events and
//! one for errors. Both streams close once the primitive is released.
//!
//! [`NotifyWatch`] is the production implementation on top of `notify`. It
//! watches the parent directory of every registered path, so a file that does
//! not exist yet, or one that is deleted and recreated, still produces
//! events. Events for sibling files are delivered too; informers filter them
//! out.
//!
//! When a registered path is a symlink, the file it finally resolves to is
//! watched as well and its events are reported under the registered path.
//! Mounted configmaps and secrets are updated by swapping a directory link
//! the path resolves through, which the parent directory watch never sees.
//! Adding an already registered path again re-resolves the link.

use crate::error::WatchError;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// Kind of change observed on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOp {
    /// The path was created
    Create,
    /// The content of the path was written
    Write,
    /// The path was removed
    Remove,
    /// The path was renamed, either away or onto
    Rename,
    /// Permissions or other metadata changed
    Chmod,
}

impl FileOp {
    /// Translates a `notify` event kind; access and unknown kinds are dropped,
    /// as are paired renames, whose sides arrive as separate events.
    #[must_use]
    pub fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileOp::Create),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(FileOp::Chmod),
            // backends that pair renames also report each side on its own
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
            EventKind::Modify(ModifyKind::Name(_)) => Some(FileOp::Rename),
            EventKind::Modify(_) => Some(FileOp::Write),
            EventKind::Remove(_) => Some(FileOp::Remove),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileOp::Create => "CREATE",
            FileOp::Write => "WRITE",
            FileOp::Remove => "REMOVE",
            FileOp::Rename => "RENAME",
            FileOp::Chmod => "CHMOD",
        };
        f.write_str(name)
    }
}

/// A single change reported by a watch primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Path the change applies to
    pub path: PathBuf,
    /// What happened
    pub op: FileOp,
}

impl FileEvent {
    /// Creates an event.
    pub fn new(path: impl Into<PathBuf>, op: FileOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Whether this event concerns `path`.
    ///
    /// Leading `./` components are ignored, so `config.yaml` and
    /// `./config.yaml` refer to the same file.
    #[must_use]
    pub fn is_for(&self, path: &Path) -> bool {
        same_path(&self.path, path)
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    let a = a.components().filter(|c| *c != Component::CurDir);
    let b = b.components().filter(|c| *c != Component::CurDir);
    a.eq(b)
}

/// Delivery side of a watch primitive.
#[derive(Debug)]
pub struct WatchStreams {
    /// Change events; closed when the primitive is released
    pub events: UnboundedReceiver<FileEvent>,
    /// Watch errors; closed when the primitive is released
    pub errors: UnboundedReceiver<WatchError>,
}

/// Control side of a watch primitive.
pub trait FileWatch: Send {
    /// Starts watching `path`. Adding a path that is already watched succeeds.
    fn add(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Stops watching `path`.
    fn remove(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Releases the primitive; both streams close afterwards.
    fn close(&mut self) -> Result<(), WatchError>;
}

/// [`FileWatch`] backed by the platform's recommended `notify` watcher.
#[derive(Debug)]
pub struct NotifyWatch {
    watcher: Option<RecommendedWatcher>,
    // registered path -> resolved symlink target being watched, if any
    paths: HashMap<PathBuf, Option<PathBuf>>,
    // registrations per watched directory
    dirs: HashMap<PathBuf, usize>,
    // resolved target -> registered paths it stands for; shared with the callback
    targets: Arc<Mutex<TargetMap>>,
}

type TargetMap = HashMap<PathBuf, Vec<PathBuf>>;

fn lock(targets: &Mutex<TargetMap>) -> MutexGuard<'_, TargetMap> {
    targets.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NotifyWatch {
    /// Creates the watcher and the streams it delivers on.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Init`] when the platform watcher cannot be created.
    pub fn new() -> Result<(Self, WatchStreams), WatchError> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let targets = Arc::new(Mutex::new(TargetMap::new()));

        let watcher = {
            let targets = Arc::clone(&targets);
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                forward(res, &targets, &event_tx, &error_tx);
            })?
        };

        Ok((
            Self {
                watcher: Some(watcher),
                paths: HashMap::new(),
                dirs: HashMap::new(),
                targets,
            },
            WatchStreams { events, errors },
        ))
    }

    fn watch_dir(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    // Points the target watch of `path` at wherever its symlink chain
    // currently ends. Mounted configmaps and secrets are swapped by
    // replacing a symlink higher up the chain, which never touches `path`.
    fn arm_target(&mut self, path: &Path) -> Result<(), WatchError> {
        let previous = self.paths.get_mut(path).and_then(Option::take);
        if let Some(previous) = previous {
            self.release_target(path, &previous);
        }

        let Some(target) = resolve_link(path) else {
            return Ok(());
        };
        let first = {
            let mut targets = lock(&self.targets);
            let watchers = targets.entry(target.clone()).or_default();
            watchers.push(path.to_path_buf());
            watchers.len() == 1
        };
        if first {
            if let Some(watcher) = self.watcher.as_mut() {
                if let Err(e) = watcher.watch(&target, RecursiveMode::NonRecursive) {
                    lock(&self.targets).remove(&target);
                    return Err(WatchError::Add {
                        path: path.to_path_buf(),
                        reason: format!("cannot watch link target {}: {e}", target.display()),
                    });
                }
            }
            debug!("watching {} through link target {}", path.display(), target.display());
        }
        self.paths.insert(path.to_path_buf(), Some(target));
        Ok(())
    }

    fn release_target(&mut self, path: &Path, target: &Path) {
        let last = {
            let mut targets = lock(&self.targets);
            let Some(watchers) = targets.get_mut(target) else {
                return;
            };
            watchers.retain(|p| p != path);
            let last = watchers.is_empty();
            if last {
                targets.remove(target);
            }
            last
        };
        if last {
            if let Some(watcher) = self.watcher.as_mut() {
                // the backend drops the watch itself once the target is deleted
                if let Err(e) = watcher.unwatch(target) {
                    trace!("link target {} already unwatched: {}", target.display(), e);
                }
            }
        }
    }
}

// The final target of `path` if `path` is a symlink that resolves.
fn resolve_link(path: &Path) -> Option<PathBuf> {
    let meta = fs::symlink_metadata(path).ok()?;
    if !meta.file_type().is_symlink() {
        return None;
    }
    fs::canonicalize(path).ok()
}

fn forward(
    res: notify::Result<Event>,
    targets: &Mutex<TargetMap>,
    event_tx: &UnboundedSender<FileEvent>,
    error_tx: &UnboundedSender<WatchError>,
) {
    match res {
        Ok(event) => {
            let Some(op) = FileOp::from_kind(&event.kind) else {
                trace!("dropping {:?} for {:?}", event.kind, event.paths);
                return;
            };
            let targets = lock(targets);
            for path in event.paths {
                // receivers only go away once the informer has torn down
                match targets.get(&path) {
                    Some(watched) => {
                        for watched in watched {
                            let _ = event_tx.send(FileEvent::new(watched.clone(), op));
                        }
                    }
                    None => {
                        let _ = event_tx.send(FileEvent::new(path, op));
                    }
                }
            }
        }
        Err(e) => {
            let _ = error_tx.send(WatchError::Event(e.to_string()));
        }
    }
}

impl FileWatch for NotifyWatch {
    fn add(&mut self, path: &Path) -> Result<(), WatchError> {
        let add_err = |reason: &str| WatchError::Add {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if path.as_os_str().is_empty() {
            return Err(add_err("empty path"));
        }
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(add_err("watcher is closed"));
        };
        if self.paths.contains_key(path) {
            // re-arm: the link may point somewhere new
            return self.arm_target(path);
        }

        let dir = Self::watch_dir(path);
        let count = self.dirs.get(&dir).copied().unwrap_or(0);
        if count == 0 {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| add_err(&e.to_string()))?;
            debug!("watching directory {}", dir.display());
        }
        self.dirs.insert(dir, count + 1);
        self.paths.insert(path.to_path_buf(), None);
        self.arm_target(path)
    }

    fn remove(&mut self, path: &Path) -> Result<(), WatchError> {
        let remove_err = |reason: &str| WatchError::Remove {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let Some(target) = self.paths.remove(path) else {
            return Err(remove_err("path is not watched"));
        };
        if let Some(target) = target {
            self.release_target(path, &target);
        }

        let dir = Self::watch_dir(path);
        let remaining = self.dirs.get(&dir).copied().unwrap_or(1).saturating_sub(1);
        if remaining > 0 {
            self.dirs.insert(dir, remaining);
            return Ok(());
        }
        self.dirs.remove(&dir);

        let Some(watcher) = self.watcher.as_mut() else {
            return Err(remove_err("watcher is closed"));
        };
        watcher.unwatch(&dir).map_err(|e| remove_err(&e.to_string()))?;
        debug!("stopped watching directory {}", dir.display());
        Ok(())
    }

    fn close(&mut self) -> Result<(), WatchError> {
        // dropping the watcher drops the callback and with it both senders
        if self.watcher.take().is_some() {
            self.paths.clear();
            self.dirs.clear();
            lock(&self.targets).clear();
        }
        Ok(())
    }
}
