use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

/// Ingestion-relevant slice of process configuration. `events-api` owns the
/// full configuration surface; this is the subset the engine needs to run
/// standalone in tests.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IngestConfig {
    pub github_token: Option<String>,
    pub target_repositories: Vec<String>,
    #[serde(rename = "poll_interval")]
    pub poll_interval_seconds: u64,
    pub worker_count: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            target_repositories: Vec::new(),
            poll_interval_seconds: 300,
            worker_count: 4,
        }
    }
}

impl IngestConfig {
    /// Reads the literal, unprefixed variable names spec.md §6 documents
    /// (`GITHUB_TOKEN`, `TARGET_REPOSITORIES`, `POLL_INTERVAL`) — no
    /// `EVENTS_` prefix. `events-api::Config` is the authoritative loader
    /// for the running process; this exists for standalone use of the
    /// engine outside `events-api`.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::raw())
    }

    pub fn from_env() -> figment::Result<Self> {
        let mut config: Self = Self::figment().extract()?;
        if config.poll_interval_seconds < 1 {
            config.poll_interval_seconds = 1;
        }
        Ok(config)
    }

    /// `None` means global mode; `Some` lists the targeted repositories.
    pub fn targets(&self) -> Option<&[String]> {
        if self.target_repositories.is_empty() {
            None
        } else {
            Some(&self.target_repositories)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_interval_is_300() {
        assert_eq!(IngestConfig::default().poll_interval_seconds, 300);
    }

    #[test]
    fn empty_targets_means_global_mode() {
        let config = IngestConfig::default();
        assert!(config.targets().is_none());
    }
}
