//! Operator config model
//!
//! The operator config names the image to run and, per datastore, the graph
//! of releases it may move between.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key naming the datastore a channel applies to.
pub const DATASTORE_KEY: &str = "datastore";

/// Metadata key marking the channel chosen when none is requested.
pub const DEFAULT_KEY: &str = "default";

/// Top-level operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Image repository releases are pulled from
    pub image_name: String,

    /// Upgrade graph, inlined at the top level
    #[serde(flatten)]
    pub update_graph: UpdateGraph,
}

impl OperatorConfig {
    /// Parses an operator config from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Serialization`](crate::GraphError::Serialization)
    /// if the document is not a valid operator config.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Renders the operator config as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Serialization`](crate::GraphError::Serialization)
    /// if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// All update channels known to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGraph {
    /// Channels, one or more per datastore
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl UpdateGraph {
    /// Finds the channel for a datastore.
    ///
    /// When several channels cover the datastore, the one marked default wins;
    /// otherwise the first listed is returned.
    #[must_use]
    pub fn channel_for(&self, datastore: &str) -> Option<&Channel> {
        let mut candidates = self
            .channels
            .iter()
            .filter(|c| c.datastore() == Some(datastore))
            .peekable();
        let first = *candidates.peek()?;
        Some(candidates.find(|c| c.is_default()).unwrap_or(first))
    }
}

/// A named sequence of releases for one datastore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Channel name (e.g. "stable")
    pub name: String,

    /// Free-form labels; see [`DATASTORE_KEY`] and [`DEFAULT_KEY`]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Releases in the channel, newest first
    #[serde(default)]
    pub nodes: Vec<State>,

    /// Allowed moves: release id to the ids it may update to, oldest first
    #[serde(default)]
    pub edges: BTreeMap<String, Vec<String>>,
}

impl Channel {
    /// Datastore this channel applies to, if labelled.
    #[must_use]
    pub fn datastore(&self) -> Option<&str> {
        self.metadata.get(DATASTORE_KEY).map(String::as_str)
    }

    /// Whether the channel is marked as the default for its datastore.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.metadata.get(DEFAULT_KEY).is_some_and(|v| v == "true")
    }

    /// Looks up a release by id.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<&State> {
        self.nodes.iter().find(|s| s.id == id)
    }

    /// Release ids reachable in one step from `id`; empty for a head release
    /// or an unknown id.
    #[must_use]
    pub fn next_states(&self, id: &str) -> &[String] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }
}

/// A single release a cluster can be running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Unique id within the channel
    pub id: String,

    /// Image tag to run
    pub tag: String,

    /// Datastore migration the release expects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<String>,

    /// Migration phase, for releases that run a multi-step migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Deprecated releases are never offered as update targets
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl State {
    /// Creates a release whose tag equals its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            tag: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Sets the image tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the expected migration.
    #[must_use]
    pub fn with_migration(mut self, migration: impl Into<String>) -> Self {
        self.migration = Some(migration.into());
        self
    }

    /// Sets the migration phase.
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Marks the release as deprecated.
    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}
