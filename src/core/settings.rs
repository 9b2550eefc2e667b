use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_tracker_poll_interval_ms() -> u64 {
    10_000
}

fn default_restore_queue_depth() -> usize {
    16
}

fn default_master_node_timeout_secs() -> u64 {
    30
}

/// Tunables of the logical replication control plane.
///
/// Loaded from a TOML fragment by the surrounding node configuration; every
/// field has a default so an empty document is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationSettings {
    /// Interval between metadata-tracker ticks per subscription.
    #[serde(default = "default_tracker_poll_interval_ms")]
    pub tracker_poll_interval_ms: u64,
    /// Depth of the snapshot-restore submission queue; submissions beyond
    /// this are rejected rather than buffered.
    #[serde(default = "default_restore_queue_depth")]
    pub restore_queue_depth: usize,
    /// Timeout handed to the restore service for master-node operations.
    #[serde(default = "default_master_node_timeout_secs")]
    pub master_node_timeout_secs: u64,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            tracker_poll_interval_ms: default_tracker_poll_interval_ms(),
            restore_queue_depth: default_restore_queue_depth(),
            master_node_timeout_secs: default_master_node_timeout_secs(),
        }
    }
}

impl ReplicationSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read settings {}", path_ref.display()))?;
        let settings: Self = toml::from_str(&data)
            .with_context(|| format!("invalid TOML settings {}", path_ref.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations that would stall or wedge the control plane.
    pub fn validate(&self) -> Result<()> {
        if self.tracker_poll_interval_ms == 0 {
            anyhow::bail!("tracker_poll_interval_ms must be > 0");
        }
        if self.restore_queue_depth == 0 {
            anyhow::bail!("restore_queue_depth must be > 0");
        }
        if self.master_node_timeout_secs == 0 {
            anyhow::bail!("master_node_timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn tracker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tracker_poll_interval_ms)
    }

    pub fn master_node_timeout(&self) -> Duration {
        Duration::from_secs(self.master_node_timeout_secs)
    }
}
