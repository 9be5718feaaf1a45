//! File Informers
//!
//! Lets a reconciler treat a local file (a mounted secret, configmap or
//! operator config) like any other watched resource: the file's changes
//! arrive as add/update/delete notifications through the same observer
//! contract used for API-server resources.
//!
//! # Example
//!
//! ```no_run
//! use file_informer::{FileInformerFactory, ResourceEventHandlerFuncs, ResourceId};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = FileInformerFactory::new();
//! let informer = factory.get_or_create(&ResourceId::file("/etc/operator/config.yaml"))?;
//!
//! informer.add_event_handler(
//!     ResourceEventHandlerFuncs::new()
//!         .add_func(|path| println!("reload {}", path.display()))
//!         .delete_func(|path| println!("{} is gone", path.display())),
//! );
//!
//! let cancel = CancellationToken::new();
//! factory.start_all(&cancel);
//! let synced = factory.wait_for_sync(&cancel).await;
//! assert!(synced.values().all(|s| *s));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Lazy factory**: one informer per resource identity, started exactly once
//! - **Initial sync**: every observer sees an add before any change is reported
//! - **Resync**: periodic updates even when nothing changed on disk
//! - **Watch recovery**: the watch is re-armed after the file is removed
//! - **Mocking**: `test-util` exposes an in-memory watch primitive

pub mod config;
pub mod error;
pub mod factory;
pub mod informer;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod observer;
pub mod resource;
pub mod runtime;
pub mod watch;

pub use config::{InformerConfig, DEFAULT_RESYNC_PERIOD};
pub use error::WatchError;
pub use factory::{FileInformerFactory, WatchBuilder};
pub use informer::{FileInformer, LifecycleState};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockWatch, MockWatchHandle};
pub use observer::{ResourceEventHandler, ResourceEventHandlerFuncs};
pub use resource::{ResourceId, FILE_GROUP, FILE_VERSION};
pub use watch::{FileEvent, FileOp, FileWatch, NotifyWatch, WatchStreams};
