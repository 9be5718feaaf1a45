//! Notification sinks registered on informers.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Receives add/update/delete notifications from an informer.
///
/// Callbacks run synchronously on the informer's dispatch task, one at a
/// time, so they must return quickly. Items are the watched path; consumers
/// re-read the file themselves.
pub trait ResourceEventHandler: Send + Sync {
    /// The item appeared or its content changed.
    fn on_add(&self, item: &Path);

    /// The item was resynced, renamed or had its permissions changed.
    fn on_update(&self, old_item: &Path, new_item: &Path);

    /// The item was removed.
    fn on_delete(&self, item: &Path);
}

impl<T: ResourceEventHandler + ?Sized> ResourceEventHandler for Arc<T> {
    fn on_add(&self, item: &Path) {
        (**self).on_add(item);
    }

    fn on_update(&self, old_item: &Path, new_item: &Path) {
        (**self).on_update(old_item, new_item);
    }

    fn on_delete(&self, item: &Path) {
        (**self).on_delete(item);
    }
}

type AddFn = Box<dyn Fn(&Path) + Send + Sync>;
type UpdateFn = Box<dyn Fn(&Path, &Path) + Send + Sync>;
type DeleteFn = Box<dyn Fn(&Path) + Send + Sync>;

/// Closure-backed [`ResourceEventHandler`].
///
/// Any callback left unset is a no-op.
///
/// ```
/// use file_informer::ResourceEventHandlerFuncs;
///
/// let handler = ResourceEventHandlerFuncs::new()
///     .add_func(|path| println!("added {}", path.display()))
///     .delete_func(|path| println!("deleted {}", path.display()));
/// # let _ = handler;
/// ```
#[derive(Default)]
pub struct ResourceEventHandlerFuncs {
    add: Option<AddFn>,
    update: Option<UpdateFn>,
    delete: Option<DeleteFn>,
}

impl ResourceEventHandlerFuncs {
    /// Creates a handler that ignores every notification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the add callback.
    #[must_use]
    pub fn add_func(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    /// Sets the update callback.
    #[must_use]
    pub fn update_func(mut self, f: impl Fn(&Path, &Path) + Send + Sync + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    /// Sets the delete callback.
    #[must_use]
    pub fn delete_func(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }
}

impl ResourceEventHandler for ResourceEventHandlerFuncs {
    fn on_add(&self, item: &Path) {
        if let Some(f) = &self.add {
            f(item);
        }
    }

    fn on_update(&self, old_item: &Path, new_item: &Path) {
        if let Some(f) = &self.update {
            f(old_item, new_item);
        }
    }

    fn on_delete(&self, item: &Path) {
        if let Some(f) = &self.delete {
            f(item);
        }
    }
}

impl fmt::Debug for ResourceEventHandlerFuncs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEventHandlerFuncs")
            .field("add", &self.add.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}
