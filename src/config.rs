use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{dlog_debug, Error, Result};

/// What `restart` does to contacts of a completed or canceled campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Re-arm the admission loop only. Contacts that are still eligible get
    /// dialed; terminal contacts keep their status and attempt count.
    #[default]
    Rearm,
    /// Return every contact that is neither skipped nor in flight to pending
    /// with a fresh attempt budget. Dispositions are preserved.
    ResetAll,
}

/// Engine-wide settings shared by every campaign loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub placement_timeout_ms: u64,
    pub reconcile_timeout_secs: u64,
    /// Consecutive placement failures after which a campaign pauses itself.
    pub placement_failure_threshold: u32,
    /// Upper bound on placements in progress across all campaigns.
    pub max_parallel_placements: usize,
    pub outcome_channel_capacity: usize,
    pub restart_policy: RestartPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            placement_timeout_ms: 10_000,
            reconcile_timeout_secs: 3_600,
            placement_failure_threshold: 5,
            max_parallel_placements: 32,
            outcome_channel_capacity: 1_024,
            restart_policy: RestartPolicy::Rearm,
        }
    }
}

impl EngineConfig {
    pub fn dialer_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".dialer"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::dialer_dir()?.join("dialer.toml"))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn placement_timeout(&self) -> Duration {
        Duration::from_millis(self.placement_timeout_ms)
    }

    pub fn reconcile_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reconcile_timeout_secs as i64)
    }

    /// Load from `~/.dialer/dialer.toml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        dlog_debug!("EngineConfig::load path={}", path.display());
        if !path.exists() {
            dlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        dlog_debug!(
            "Config loaded: tick={}ms threshold={} restart={:?}",
            config.tick_interval_ms,
            config.placement_failure_threshold,
            config.restart_policy
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        dlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Validation("tick_interval_ms must be positive".into()));
        }
        if self.placement_failure_threshold == 0 {
            return Err(Error::Validation(
                "placement_failure_threshold must be positive".into(),
            ));
        }
        if self.max_parallel_placements == 0 {
            return Err(Error::Validation(
                "max_parallel_placements must be positive".into(),
            ));
        }
        if self.outcome_channel_capacity == 0 {
            return Err(Error::Validation(
                "outcome_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
