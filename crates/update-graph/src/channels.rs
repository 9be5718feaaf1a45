//! Release tables for the supported datastores.
//!
//! Each table lists releases newest first together with the ranges each
//! release may update into. [`default_operator_config`] turns them into the
//! published operator config.

use crate::error::Result;
use crate::graph::edges_from_patterns;
use crate::model::{Channel, OperatorConfig, State, UpdateGraph, DATASTORE_KEY, DEFAULT_KEY};
use std::collections::BTreeMap;

/// Image every channel's tags refer to.
pub const IMAGE_NAME: &str = "ghcr.io/authzed/spicedb";

/// Name shared by all generated channels.
pub const STABLE_CHANNEL: &str = "stable";

#[derive(Debug, Clone, Copy)]
struct Release {
    id: &'static str,
    tag: &'static str,
    migration: Option<&'static str>,
    phase: Option<&'static str>,
    deprecated: bool,
}

impl Release {
    const fn new(id: &'static str, migration: &'static str) -> Self {
        Self {
            id,
            tag: id,
            migration: Some(migration),
            phase: None,
            deprecated: false,
        }
    }

    const fn bare(id: &'static str) -> Self {
        Self {
            id,
            tag: id,
            migration: None,
            phase: None,
            deprecated: false,
        }
    }

    const fn phased(self, tag: &'static str, phase: &'static str) -> Self {
        Self {
            tag,
            phase: Some(phase),
            ..self
        }
    }

    const fn deprecated(self) -> Self {
        Self {
            deprecated: true,
            ..self
        }
    }

    fn to_state(self) -> State {
        State {
            id: self.id.to_string(),
            tag: self.tag.to_string(),
            migration: self.migration.map(str::to_string),
            phase: self.phase.map(str::to_string),
            deprecated: self.deprecated,
        }
    }
}

const fn r(id: &'static str, migration: &'static str) -> Release {
    Release::new(id, migration)
}

const POSTGRES_RELEASES: &[Release] = &[
    r("v1.21.0", "add-gc-covering-index"),
    r("v1.19.1", "add-gc-covering-index"),
    r("v1.18.0", "drop-bigserial-ids"),
    r("v1.17.0", "drop-bigserial-ids"),
    r("v1.16.2", "drop-bigserial-ids"),
    r("v1.16.1", "drop-bigserial-ids").deprecated(),
    r("v1.16.0", "drop-bigserial-ids").deprecated(),
    r("v1.15.0", "drop-bigserial-ids"),
    r("v1.14.1", "drop-bigserial-ids"),
    r("v1.14.0", "drop-bigserial-ids"),
    r("v1.14.0-phase2", "add-xid-constraints").phased("v1.14.0", "write-both-read-new"),
    r("v1.14.0-phase1", "add-xid-columns").phased("v1.14.0", "write-both-read-old"),
    r("v1.13.0", "add-ns-config-id"),
    r("v1.12.0", "add-ns-config-id"),
    r("v1.11.0", "add-ns-config-id"),
    r("v1.10.0", "add-ns-config-id"),
    r("v1.9.0", "add-unique-datastore-id"),
    r("v1.8.0", "add-unique-datastore-id"),
    r("v1.7.1", "add-unique-datastore-id"),
    r("v1.7.0", "add-unique-datastore-id").deprecated(),
    r("v1.6.0", "add-unique-datastore-id"),
    r("v1.5.0", "add-transaction-timestamp-index"),
    r("v1.4.0", "add-transaction-timestamp-index"),
    r("v1.3.0", "add-transaction-timestamp-index"),
    r("v1.2.0", "add-transaction-timestamp-index"),
];

const POSTGRES_EDGES: &[(&str, &str)] = &[
    ("v1.19.1", ">=1.21.0"),
    ("v1.18.0", ">=1.19.1"),
    ("v1.17.0", ">=1.18.0"),
    ("v1.16.2", ">=1.17.0"),
    ("v1.16.1", ">=1.16.2"),
    ("v1.16.0", ">=1.16.2"),
    ("v1.15.0", ">=1.16.2"),
    ("v1.14.1", ">=1.15.0"),
    ("v1.14.0", ">=1.14.1"),
    ("v1.14.0-phase2", "1.14.0"),
    ("v1.14.0-phase1", "1.14.0-phase2"),
    ("v1.13.0", "1.14.0-phase1"),
    ("v1.12.0", ">=1.13.0 <=1.14.0-phase1"),
    ("v1.11.0", ">=1.12.0 <=1.14.0-phase1"),
    ("v1.10.0", ">=1.11.0 <=1.14.0-phase1"),
    ("v1.9.0", ">=1.10.0 <=1.14.0-phase1"),
    ("v1.8.0", ">=1.9.0 <=1.14.0-phase1"),
    ("v1.7.1", ">=1.8.0 <=1.14.0-phase1"),
    ("v1.7.0", ">=1.7.1 <=1.14.0-phase1"),
    ("v1.6.0", ">=1.7.1 <=1.14.0-phase1"),
    ("v1.5.0", ">=1.6.0 <=1.14.0-phase1"),
    ("v1.4.0", ">=1.5.0 <=1.14.0-phase1"),
    ("v1.3.0", ">=1.4.0 <=1.14.0-phase1"),
    ("v1.2.0", ">=1.3.0 <=1.14.0-phase1"),
];

const CRDB_RELEASES: &[Release] = &[
    r("v1.21.0", "add-caveats"),
    r("v1.19.1", "add-caveats"),
    r("v1.18.0", "add-caveats"),
    r("v1.17.0", "add-caveats"),
    r("v1.16.2", "add-caveats"),
    r("v1.16.1", "add-caveats").deprecated(),
    r("v1.16.0", "add-caveats").deprecated(),
    r("v1.15.0", "add-caveats"),
    r("v1.14.1", "add-caveats"),
    r("v1.14.0", "add-caveats").deprecated(),
    r("v1.13.0", "add-metadata-and-counters"),
    r("v1.12.0", "add-metadata-and-counters"),
    r("v1.11.0", "add-metadata-and-counters"),
    r("v1.10.0", "add-metadata-and-counters"),
    r("v1.9.0", "add-metadata-and-counters"),
    r("v1.8.0", "add-metadata-and-counters"),
    r("v1.7.1", "add-metadata-and-counters"),
    r("v1.7.0", "add-metadata-and-counters").deprecated(),
    r("v1.6.0", "add-metadata-and-counters"),
    r("v1.5.0", "add-transactions-table"),
    r("v1.4.0", "add-transactions-table"),
    r("v1.3.0", "add-transactions-table"),
    r("v1.2.0", "add-transactions-table"),
];

const CRDB_EDGES: &[(&str, &str)] = &[
    ("v1.19.1", ">=1.21.0"),
    ("v1.18.0", ">=1.19.1"),
    ("v1.17.0", ">=1.18.0"),
    ("v1.16.2", ">=1.17.0"),
    ("v1.16.1", ">=1.16.2"),
    ("v1.16.0", ">=1.16.2"),
    ("v1.15.0", ">=1.16.2"),
    ("v1.14.1", ">=1.15.0"),
    ("v1.14.0", ">=1.14.1"),
    ("v1.13.0", ">=1.14.1"),
    ("v1.12.0", ">=1.13.0"),
    ("v1.11.0", ">=1.12.0"),
    ("v1.10.0", ">=1.11.0"),
    ("v1.9.0", ">=1.10.0"),
    ("v1.8.0", ">=1.9.0"),
    ("v1.7.1", ">=1.8.0"),
    ("v1.7.0", ">=1.7.1"),
    ("v1.6.0", ">=1.7.1"),
    ("v1.5.0", ">=1.6.0"),
    ("v1.4.0", ">=1.5.0"),
    ("v1.3.0", ">=1.4.0"),
    ("v1.2.0", ">=1.3.0"),
];

const MYSQL_RELEASES: &[Release] = &[
    r("v1.21.0", "extend_object_id"),
    r("v1.19.1", "add_caveat"),
    r("v1.18.0", "add_caveat"),
    r("v1.17.0", "add_caveat"),
    r("v1.16.2", "add_caveat"),
    r("v1.16.1", "add_caveat").deprecated(),
    r("v1.16.0", "add_caveat").deprecated(),
    r("v1.15.0", "add_caveat"),
    r("v1.14.1", "add_caveat"),
    r("v1.14.0", "add_caveat").deprecated(),
    r("v1.13.0", "add_ns_config_id"),
    r("v1.12.0", "add_ns_config_id"),
    r("v1.11.0", "add_ns_config_id"),
    r("v1.10.0", "add_ns_config_id"),
    r("v1.9.0", "add_unique_datastore_id"),
    r("v1.8.0", "add_unique_datastore_id"),
    r("v1.7.1", "add_unique_datastore_id"),
    r("v1.7.0", "add_unique_datastore_id").deprecated(),
];

const MYSQL_EDGES: &[(&str, &str)] = &[
    ("v1.19.1", ">=1.21.0"),
    ("v1.18.0", ">=1.19.1"),
    ("v1.17.0", ">=1.18.0"),
    ("v1.16.2", ">=1.17.0"),
    ("v1.16.1", ">=1.16.2"),
    ("v1.16.0", ">=1.16.2"),
    ("v1.15.0", ">=1.16.2"),
    ("v1.14.1", ">=1.15.0"),
    ("v1.14.0", ">=1.14.1"),
    ("v1.13.0", ">=1.14.1"),
    ("v1.12.0", ">=1.13.0"),
    ("v1.11.0", ">=1.12.0"),
    ("v1.10.0", ">=1.11.0"),
    ("v1.9.0", ">=1.10.0"),
    ("v1.8.0", ">=1.9.0"),
    ("v1.7.1", ">=1.8.0"),
    ("v1.7.0", ">=1.7.1"),
];

const SPANNER_RELEASES: &[Release] = &[
    r("v1.21.0", "add-caveats"),
    r("v1.19.1", "add-caveats"),
    r("v1.18.0", "add-caveats"),
    r("v1.17.0", "add-caveats"),
    r("v1.16.2", "add-caveats"),
    r("v1.16.1", "add-caveats").deprecated(),
    r("v1.16.0", "add-caveats").deprecated(),
    r("v1.15.0", "add-caveats"),
    r("v1.14.1", "add-caveats"),
    r("v1.14.0", "add-caveats").deprecated(),
    r("v1.13.0", "add-metadata-and-counters"),
    r("v1.12.0", "add-metadata-and-counters"),
    r("v1.11.0", "add-metadata-and-counters"),
    r("v1.10.0", "add-metadata-and-counters"),
    r("v1.9.0", "add-metadata-and-counters"),
    r("v1.8.0", "add-metadata-and-counters"),
];

const SPANNER_EDGES: &[(&str, &str)] = &[
    ("v1.19.1", ">=1.21.0"),
    ("v1.18.0", ">=1.19.1"),
    ("v1.17.0", ">=1.18.0"),
    ("v1.16.2", ">=1.17.0"),
    ("v1.16.1", ">=1.16.2"),
    ("v1.16.0", ">=1.16.2"),
    ("v1.15.0", ">=1.16.2"),
    ("v1.14.1", ">=1.15.0"),
    ("v1.14.0", ">=1.14.1"),
    ("v1.13.0", ">=1.14.1"),
    ("v1.12.0", ">=1.13.0"),
    ("v1.11.0", ">=1.12.0"),
    ("v1.10.0", ">=1.11.0"),
    ("v1.9.0", ">=1.10.0"),
    ("v1.8.0", ">=1.9.0"),
];

const MEMORY_RELEASES: &[Release] = &[
    Release::bare("v1.21.0"),
    Release::bare("v1.19.1"),
    Release::bare("v1.18.0"),
    Release::bare("v1.17.0"),
    Release::bare("v1.16.2"),
    Release::bare("v1.16.1").deprecated(),
    Release::bare("v1.16.0").deprecated(),
    Release::bare("v1.15.0"),
    Release::bare("v1.14.1"),
    Release::bare("v1.14.0").deprecated(),
    Release::bare("v1.13.0"),
    Release::bare("v1.12.0"),
    Release::bare("v1.11.0"),
    Release::bare("v1.10.0"),
    Release::bare("v1.9.0"),
    Release::bare("v1.8.0"),
    Release::bare("v1.7.1"),
    Release::bare("v1.7.0").deprecated(),
    Release::bare("v1.6.0"),
    Release::bare("v1.5.0"),
    Release::bare("v1.4.0"),
    Release::bare("v1.3.0"),
    Release::bare("v1.2.0"),
];

fn channel<'a, I>(datastore: &str, releases: &[Release], patterns: I) -> Result<Channel>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let nodes: Vec<State> = releases.iter().copied().map(Release::to_state).collect();
    let edges = edges_from_patterns(patterns, &nodes)?;

    let mut metadata = BTreeMap::new();
    metadata.insert(DATASTORE_KEY.to_string(), datastore.to_string());
    metadata.insert(DEFAULT_KEY.to_string(), "true".to_string());

    Ok(Channel {
        name: STABLE_CHANNEL.to_string(),
        metadata,
        nodes,
        edges,
    })
}

/// The stable postgres channel.
///
/// # Errors
///
/// Fails only if the built-in tables are malformed.
pub fn postgres_channel() -> Result<Channel> {
    channel("postgres", POSTGRES_RELEASES, POSTGRES_EDGES.iter().copied())
}

/// The stable cockroachdb channel.
///
/// # Errors
///
/// Fails only if the built-in tables are malformed.
pub fn crdb_channel() -> Result<Channel> {
    channel("cockroachdb", CRDB_RELEASES, CRDB_EDGES.iter().copied())
}

/// The stable mysql channel.
///
/// # Errors
///
/// Fails only if the built-in tables are malformed.
pub fn mysql_channel() -> Result<Channel> {
    channel("mysql", MYSQL_RELEASES, MYSQL_EDGES.iter().copied())
}

/// The stable spanner channel.
///
/// # Errors
///
/// Fails only if the built-in tables are malformed.
pub fn spanner_channel() -> Result<Channel> {
    channel("spanner", SPANNER_RELEASES, SPANNER_EDGES.iter().copied())
}

/// The stable in-memory channel, where any release may move to any newer one.
///
/// # Errors
///
/// Fails only if the built-in tables are malformed.
pub fn memory_channel() -> Result<Channel> {
    let patterns: Vec<(&str, String)> = MEMORY_RELEASES
        .iter()
        .map(|r| (r.id, format!(">{}", r.id.trim_start_matches('v'))))
        .collect();
    channel(
        "memory",
        MEMORY_RELEASES,
        patterns.iter().map(|(from, to)| (*from, to.as_str())),
    )
}

/// The operator config published with each operator release.
///
/// # Errors
///
/// Fails only if the built-in tables are malformed.
pub fn default_operator_config() -> Result<OperatorConfig> {
    Ok(OperatorConfig {
        image_name: IMAGE_NAME.to_string(),
        update_graph: UpdateGraph {
            channels: vec![
                postgres_channel()?,
                crdb_channel()?,
                mysql_channel()?,
                spanner_channel()?,
                memory_channel()?,
            ],
        },
    })
}
