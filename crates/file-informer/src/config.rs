//! Informer configuration

use std::time::Duration;

/// Resync period used when none is configured.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Settings shared by every informer a factory creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InformerConfig {
    /// How often every observer receives an update for the watched file even
    /// when nothing changed on disk. All observers of one informer share it.
    pub default_resync_period: Duration,
}

impl InformerConfig {
    /// Overrides the resync period.
    #[must_use]
    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.default_resync_period = period;
        self
    }
}

impl Default for InformerConfig {
    fn default() -> Self {
        Self {
            default_resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }
}
