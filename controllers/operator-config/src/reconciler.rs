//! Reconciliation logic for the operator config file.
//!
//! Every add or update re-reads the file and, if it parses, replaces the
//! loaded config. A file that is missing or malformed leaves the last good
//! config in place; a delete clears it unless the path still resolves, as it
//! does after a mounted configmap swaps its data link.

use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use update_graph::OperatorConfig;

/// The operator config currently in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigState {
    pub config: OperatorConfig,
    pub loaded_at: DateTime<Utc>,
}

impl ConfigState {
    /// Releases a `datastore` cluster running `current` may update to next.
    ///
    /// Empty when no channel covers the datastore or `current` is a head or
    /// unknown release.
    pub fn update_targets(&self, datastore: &str, current: &str) -> &[String] {
        self.config
            .update_graph
            .channel_for(datastore)
            .map_or(&[], |channel| channel.next_states(current))
    }
}

fn log_channels(config: &OperatorConfig) {
    let datastores: BTreeSet<&str> = config
        .update_graph
        .channels
        .iter()
        .filter_map(|c| c.datastore())
        .collect();
    for datastore in datastores {
        let Some(channel) = config.update_graph.channel_for(datastore) else {
            continue;
        };
        let head = channel.nodes.first().map_or("<none>", |s| s.id.as_str());
        let oldest = channel.nodes.last().map_or("<none>", |s| s.id.as_str());
        debug!(
            "  {}: channel {}, head {}, {} update(s) from oldest release {}",
            datastore,
            channel.name,
            head,
            channel.next_states(oldest).len(),
            oldest
        );
    }
}

/// Reconciles the operator config file into [`ConfigState`].
#[derive(Debug, Default)]
pub struct Reconciler {
    state: RwLock<Option<ConfigState>>,
}

impl Reconciler {
    /// Creates a reconciler with no config loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the config at `path` and makes it current.
    ///
    /// An unchanged config keeps its original load time.
    pub async fn reconcile_config(&self, path: &Path) -> Result<(), ControllerError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ControllerError::Reconciliation(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = OperatorConfig::from_yaml(&contents).map_err(|e| {
            ControllerError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;

        let mut state = self.state.write().await;
        if state.as_ref().is_some_and(|s| s.config == config) {
            debug!("Operator config {} unchanged", path.display());
            return Ok(());
        }

        info!(
            "Loaded operator config from {}: image {}, {} channel(s)",
            path.display(),
            config.image_name,
            config.update_graph.channels.len()
        );
        log_channels(&config);

        *state = Some(ConfigState {
            config,
            loaded_at: Utc::now(),
        });
        Ok(())
    }

    /// Drops the current config after the file was removed.
    pub async fn clear(&self, path: &Path) {
        if self.state.write().await.take().is_some() {
            warn!("Operator config {} removed, config cleared", path.display());
        }
    }

    /// A snapshot of the current config, if one is loaded.
    pub async fn current(&self) -> Option<ConfigState> {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use update_graph::default_operator_config;

    const MINIMAL: &str = "imageName: example/image\nchannels: []\n";

    #[tokio::test]
    async fn test_loads_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let expected = default_operator_config().unwrap();
        fs::write(&path, expected.to_yaml().unwrap()).unwrap();

        let reconciler = Reconciler::new();
        assert!(reconciler.current().await.is_none());
        reconciler.reconcile_config(&path).await.unwrap();

        let state = reconciler.current().await.unwrap();
        assert_eq!(state.config, expected);
    }

    #[tokio::test]
    async fn test_unchanged_config_keeps_load_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let reconciler = Reconciler::new();
        reconciler.reconcile_config(&path).await.unwrap();
        let first = reconciler.current().await.unwrap();
        reconciler.reconcile_config(&path).await.unwrap();
        assert_eq!(reconciler.current().await.unwrap().loaded_at, first.loaded_at);
    }

    #[tokio::test]
    async fn test_changed_config_replaces_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let reconciler = Reconciler::new();
        reconciler.reconcile_config(&path).await.unwrap();
        fs::write(&path, "imageName: example/other\n").unwrap();
        reconciler.reconcile_config(&path).await.unwrap();

        assert_eq!(
            reconciler.current().await.unwrap().config.image_name,
            "example/other"
        );
    }

    #[tokio::test]
    async fn test_bad_file_keeps_last_good_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let reconciler = Reconciler::new();
        reconciler.reconcile_config(&path).await.unwrap();

        fs::write(&path, "imageName: [broken").unwrap();
        let err = reconciler.reconcile_config(&path).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));

        fs::remove_file(&path).unwrap();
        let err = reconciler.reconcile_config(&path).await.unwrap_err();
        assert!(matches!(err, ControllerError::Reconciliation(_)));

        assert_eq!(
            reconciler.current().await.unwrap().config.image_name,
            "example/image"
        );
    }

    #[tokio::test]
    async fn test_update_targets_follow_loaded_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, default_operator_config().unwrap().to_yaml().unwrap()).unwrap();

        let reconciler = Reconciler::new();
        reconciler.reconcile_config(&path).await.unwrap();
        let state = reconciler.current().await.unwrap();

        assert_eq!(state.update_targets("postgres", "v1.13.0"), ["v1.14.0-phase1"]);
        assert_eq!(state.update_targets("postgres", "v1.14.0-phase1"), ["v1.14.0-phase2"]);
        assert!(state.update_targets("postgres", "v0.0.1").is_empty());
        assert!(state.update_targets("sqlite", "v1.13.0").is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let reconciler = Reconciler::new();
        reconciler.reconcile_config(&path).await.unwrap();
        reconciler.clear(&path).await;
        assert!(reconciler.current().await.is_none());

        // clearing twice is harmless
        reconciler.clear(&path).await;
        assert!(reconciler.current().await.is_none());
    }
}
