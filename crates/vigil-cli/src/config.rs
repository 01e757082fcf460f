//! Daemon configuration (TOML).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

/// Top-level configuration. Every field has a default, so a missing file or
/// an empty table still yields a runnable setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub reconciler: ReconcilerConfig,
    pub access: AccessConfig,
    pub simulator: SimulatorConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Sqlite database path. `:memory:` gives a volatile store whose
    /// subscriptions die with the process.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vigil.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Seconds between polls of the remote source.
    pub interval_secs: u64,

    /// Consecutive not-found polls before a subscription is retired with an
    /// unknown-outcome notice. 0 keeps such subscriptions forever.
    pub stale_after_misses: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            stale_after_misses: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// Allowed chat ids. Empty means open access.
    pub allow: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// How long a simulated task runs before finishing.
    pub task_duration_secs: u64,

    /// A new task appears this often.
    pub spawn_interval_secs: u64,

    /// Every Nth task ends in error. 0 means every task succeeds.
    pub error_every: u32,

    /// Every Nth poll fails with a simulated outage. 0 disables outages.
    pub outage_every: u32,

    /// Terminal tasks drop out of the simulated history this long after
    /// completing, which is what exercises the stale-subscription path.
    pub retention_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            task_duration_secs: 150,
            spawn_interval_secs: 90,
            error_every: 4,
            outage_every: 0,
            retention_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_runnable() {
        let cfg = Config::default();
        assert_eq!(cfg.reconciler.interval_secs, 60);
        assert_eq!(cfg.reconciler.stale_after_misses, 10);
        assert_eq!(cfg.store.path, PathBuf::from("vigil.db"));
        assert!(cfg.access.allow.is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [reconciler]
            interval_secs = 5

            [access]
            allow = [42, 7]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.reconciler.interval_secs, 5);
        assert_eq!(cfg.reconciler.stale_after_misses, 10);
        assert_eq!(cfg.access.allow, vec![42, 7]);
    }

    #[test]
    fn volatile_store_is_selectable() {
        let cfg: Config = toml::from_str("[store]\npath = \":memory:\"\n").unwrap();
        assert_eq!(cfg.store.path, PathBuf::from(":memory:"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[reconciler]\ninterval = 5\n").is_err());
    }
}
