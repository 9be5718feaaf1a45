//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::path::PathBuf;
use std::time::Duration;

/// Path of the operator config file to watch (required).
pub const CONFIG_PATH_VAR: &str = "OPERATOR_CONFIG_PATH";
/// Resync period in seconds; `0` disables resync.
pub const RESYNC_PERIOD_VAR: &str = "RESYNC_PERIOD_SECS";
/// Maximum time to wait for the initial sync, in seconds.
pub const SYNC_TIMEOUT_VAR: &str = "SYNC_TIMEOUT_SECS";

const DEFAULT_RESYNC_SECS: u64 = 900;
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

/// Runtime settings for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub config_path: PathBuf,
    pub resync_period: Duration,
    pub sync_timeout: Duration,
}

impl ControllerConfig {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let config_path = lookup(CONFIG_PATH_VAR)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "{CONFIG_PATH_VAR} environment variable is required"
                ))
            })?;

        Ok(Self {
            config_path,
            resync_period: Duration::from_secs(seconds(
                &lookup,
                RESYNC_PERIOD_VAR,
                DEFAULT_RESYNC_SECS,
            )?),
            sync_timeout: Duration::from_secs(seconds(
                &lookup,
                SYNC_TIMEOUT_VAR,
                DEFAULT_SYNC_TIMEOUT_SECS,
            )?),
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ControllerError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{key} must be a number of seconds, got '{raw}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            ControllerConfig::from_lookup(lookup(&[(CONFIG_PATH_VAR, "/etc/operator/config.yaml")]))
                .unwrap();
        assert_eq!(config.config_path, PathBuf::from("/etc/operator/config.yaml"));
        assert_eq!(config.resync_period, Duration::from_secs(900));
        assert_eq!(config.sync_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            (CONFIG_PATH_VAR, "config.yaml"),
            (RESYNC_PERIOD_VAR, "0"),
            (SYNC_TIMEOUT_VAR, " 5 "),
        ]))
        .unwrap();
        assert_eq!(config.resync_period, Duration::ZERO);
        assert_eq!(config.sync_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_path() {
        for vars in [&[][..], &[(CONFIG_PATH_VAR, "  ")][..]] {
            let err = ControllerConfig::from_lookup(lookup(vars)).unwrap_err();
            assert!(matches!(err, ControllerError::InvalidConfig(ref m) if m.contains(CONFIG_PATH_VAR)));
        }
    }

    #[test]
    fn test_invalid_number() {
        let err = ControllerConfig::from_lookup(lookup(&[
            (CONFIG_PATH_VAR, "config.yaml"),
            (RESYNC_PERIOD_VAR, "fifteen"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref m) if m.contains(RESYNC_PERIOD_VAR)));
    }
}
