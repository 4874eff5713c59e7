//! Configuration loaded from `purger.toml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Duration;
use purger_core::impls::{
    FeedEndpoint, FileSnapshotSource, HttpListRegistry, HttpSnapshotSource, StaticRegistry,
};
use purger_core::policy::{LeasePolicy, PurgePolicy};
use purger_core::ports::{Clock, RegistryProvider, SnapshotSource};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub policy: PolicyConfig,
    /// Absent: every member counts as registered.
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
}

/// Where the member list comes from: `url` or `file`, not both.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: Option<String>,
    #[serde(default = "default_feed_path")]
    pub path: String,
    #[serde(default)]
    pub key_id: i64,
    #[serde(default)]
    pub verification_code: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    pub max_idle_days: i64,
    #[serde(default)]
    pub exempt_characters: Vec<String>,
    #[serde(default)]
    pub exempt_roles: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub url: Option<String>,
    /// Inline list instead of a download.
    pub names: Option<Vec<String>>,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_duration_mins")]
    pub duration_mins: i64,
    #[serde(default = "default_stasis_hours")]
    pub stasis_hours: i64,
}

fn default_feed_path() -> String {
    "/corp/MemberTracking.json".to_string()
}

fn default_refresh_secs() -> i64 {
    3600
}

fn default_state_path() -> PathBuf {
    PathBuf::from("purger-state.json")
}

fn default_batch_size() -> usize {
    10
}

fn default_duration_mins() -> i64 {
    60
}

fn default_stasis_hours() -> i64 {
    24
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            duration_mins: default_duration_mins(),
            stasis_hours: default_stasis_hours(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.policy.max_idle_days <= 0 {
            bail!("policy.max_idle_days must be positive");
        }
        if Duration::try_days(self.policy.max_idle_days).is_none() {
            bail!("policy.max_idle_days is out of range");
        }
        match (&self.feed.url, &self.feed.file) {
            (Some(_), Some(_)) => bail!("feed.url and feed.file are mutually exclusive"),
            (None, None) => bail!("feed.url or feed.file is required"),
            _ => {}
        }
        if let Some(registry) = &self.registry
            && registry.url.is_none()
            && registry.names.is_none()
        {
            bail!("registry needs either url or names");
        }
        if let Some(registry) = &self.registry
            && registry.refresh_secs <= 0
        {
            bail!("registry.refresh_secs must be positive");
        }
        if let Some(registry) = &self.registry
            && Duration::try_seconds(registry.refresh_secs).is_none()
        {
            bail!("registry.refresh_secs is out of range");
        }
        if self.lease.batch_size == 0 {
            bail!("lease.batch_size must be at least 1");
        }
        if self.lease.duration_mins <= 0 || self.lease.stasis_hours <= 0 {
            bail!("lease.duration_mins and lease.stasis_hours must be positive");
        }
        if Duration::try_minutes(self.lease.duration_mins).is_none()
            || Duration::try_hours(self.lease.stasis_hours).is_none()
        {
            bail!("lease.duration_mins or lease.stasis_hours is out of range");
        }
        Ok(())
    }

    pub fn purge_policy(&self) -> PurgePolicy {
        for role in self.policy.exempt_roles.iter().filter(|role| **role <= 0) {
            warn!(role, "ignoring invalid exempt role");
        }
        PurgePolicy::with_idle_days(self.policy.max_idle_days)
            .exempt_roles(self.policy.exempt_roles.iter().copied())
            .exempt_names(&self.policy.exempt_characters)
    }

    pub fn lease_policy(&self) -> LeasePolicy {
        LeasePolicy {
            batch_size: self.lease.batch_size,
            lease_duration: Duration::minutes(self.lease.duration_mins),
            stasis: Duration::hours(self.lease.stasis_hours),
        }
    }

    pub fn snapshot_source(&self) -> anyhow::Result<Arc<dyn SnapshotSource>> {
        let source: Arc<dyn SnapshotSource> = match (&self.feed.url, &self.feed.file) {
            (Some(url), _) => Arc::new(HttpSnapshotSource::new(FeedEndpoint {
                base_url: url.clone(),
                path: self.feed.path.clone(),
                key_id: self.feed.key_id,
                verification_code: self.feed.verification_code.clone(),
            })),
            (None, Some(file)) => Arc::new(FileSnapshotSource::new(file.clone())),
            (None, None) => bail!("feed.url or feed.file is required"),
        };
        Ok(source)
    }

    pub fn registry(&self, clock: Arc<dyn Clock>) -> Option<Arc<dyn RegistryProvider>> {
        let registry = self.registry.as_ref()?;
        if let Some(names) = &registry.names {
            return Some(Arc::new(StaticRegistry::new(names)));
        }
        let url = registry.url.as_ref()?;
        Some(Arc::new(
            HttpListRegistry::new(url.clone(), clock)
                .refresh_every(Duration::seconds(registry.refresh_secs)),
        ))
    }
}
