//! Update Graph
//!
//! The operator config model (image name plus per-datastore update channels)
//! and the tables that generate the published upgrade graph.
//!
//! A channel lists the releases a cluster can run and, for each release,
//! the releases it may update to. Edges are written as version ranges and
//! expanded against the channel's releases by [`edges_from_patterns`];
//! deprecated releases are never offered as targets.
//!
//! ```
//! use update_graph::default_operator_config;
//!
//! let config = default_operator_config().unwrap();
//! let postgres = config.update_graph.channel_for("postgres").unwrap();
//! assert_eq!(postgres.next_states("v1.14.0-phase2"), ["v1.14.0"]);
//! ```

pub mod channels;
pub mod error;
pub mod graph;
pub mod model;
pub mod range;

pub use channels::{default_operator_config, IMAGE_NAME, STABLE_CHANNEL};
pub use error::{GraphError, Result};
pub use graph::edges_from_patterns;
pub use model::{Channel, OperatorConfig, State, UpdateGraph, DATASTORE_KEY, DEFAULT_KEY};
pub use range::{parse_version, VersionRange};
