use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

fn default_database_path() -> String {
    "./github_events.db".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

/// Process-wide configuration, per §6's enumerated options. Loaded once at
/// startup and treated as immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub target_repositories: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub cors_origins: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            github_token: None,
            target_repositories: String::new(),
            poll_interval: default_poll_interval(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            cors_origins: None,
        }
    }
}

impl Config {
    /// Reads the literal, unprefixed variable names spec.md §6 documents:
    /// `DATABASE_PATH`, `GITHUB_TOKEN`, `TARGET_REPOSITORIES`,
    /// `POLL_INTERVAL`, `API_HOST`, `API_PORT`, `CORS_ORIGINS`. No prefix —
    /// a deployer following the spec's documented names must have them
    /// actually take effect.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Env::raw())
    }

    pub fn load() -> figment::Result<Self> {
        let mut config: Self = Self::figment().extract()?;
        if config.poll_interval < 1 {
            config.poll_interval = 1;
        }
        Ok(config)
    }

    pub fn target_repository_list(&self) -> Vec<String> {
        self.target_repositories
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        self.cors_origins.as_ref().map(|origins| {
            origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    pub fn ingest_config(&self) -> events_ingest::IngestConfig {
        events_ingest::IngestConfig {
            github_token: self.github_token.clone(),
            target_repositories: self.target_repository_list(),
            poll_interval_seconds: self.poll_interval,
            worker_count: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_database_path_matches_spec() {
        assert_eq!(Config::default().database_path, "./github_events.db");
    }

    #[test]
    fn empty_target_repositories_is_an_empty_list() {
        let config = Config::default();
        assert!(config.target_repository_list().is_empty());
    }

    #[test]
    fn target_repositories_are_split_and_trimmed() {
        let mut config = Config::default();
        config.target_repositories = "octo/hello, rust-lang/rust ,  ".to_string();
        assert_eq!(
            config.target_repository_list(),
            vec!["octo/hello".to_string(), "rust-lang/rust".to_string()]
        );
    }
}
