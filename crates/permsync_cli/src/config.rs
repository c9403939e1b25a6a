//! Configuration file support for permsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `PERMSYNC_`, sections separated by
//!    a double underscore, e.g. `PERMSYNC_GITLAB__TOKEN`)
//! 3. Config file (./permsync.toml, then ~/.config/permsync/config.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [scheduler]
//! interval_secs = 60
//!
//! [syncer]
//! concurrency = 4
//! requeue_delay_secs = 60
//! skip_hold_secs = 3600
//!
//! [store]
//! oldest_batch_size = 100
//! seed = "/etc/permsync/seed.json"
//!
//! [gitlab]
//! url = "https://gitlab.example.com"
//! token = "glpat-..."  # or use PERMSYNC_GITLAB__TOKEN
//! requests_per_second = 5
//! auth = "sudo"        # or "oauth"
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use permsync::provider::rate_limits;
use permsync::store::DEFAULT_OLDEST_BATCH_SIZE;
use permsync::sync::{
    DEFAULT_CONCURRENCY, DEFAULT_REQUEUE_DELAY, DEFAULT_SCHEDULE_INTERVAL, DEFAULT_SKIP_HOLD,
};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub syncer: SyncerConfig,
    pub store: StoreConfig,
    pub gitlab: GitLabConfig,
}

/// Scheduler configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduling rounds.
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SCHEDULE_INTERVAL.as_secs(),
        }
    }
}

/// Syncer configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    /// Number of sync requests processed at once.
    pub concurrency: usize,
    /// Seconds before a subject that hit a host error is retried, unless the host says otherwise.
    pub requeue_delay_secs: u64,
    /// Seconds a skipped or failed subject is left out of scheduling rounds.
    pub skip_hold_secs: u64,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            requeue_delay_secs: DEFAULT_REQUEUE_DELAY.as_secs(),
            skip_hold_secs: DEFAULT_SKIP_HOLD.as_secs(),
        }
    }
}

/// In-memory store configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum subjects returned by each "oldest permissions" scan.
    pub oldest_batch_size: usize,
    /// JSON file with users, accounts and repositories to load at startup.
    pub seed: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            oldest_batch_size: DEFAULT_OLDEST_BATCH_SIZE,
            seed: None,
        }
    }
}

/// How permsync authenticates against GitLab.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitLabAuth {
    /// Admin token plus the `Sudo` header.
    #[default]
    Sudo,
    /// Each account's own OAuth token.
    OAuth,
}

/// GitLab configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// GitLab instance URL. An empty value disables the GitLab provider.
    pub url: String,
    /// Admin personal access token, required for `auth = "sudo"`.
    pub token: Option<String>,
    /// Proactive request pacing against the instance.
    pub requests_per_second: u32,
    /// Whether to disable proactive rate limiting.
    pub no_rate_limit: bool,
    pub auth: GitLabAuth,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: "https://gitlab.com".to_string(),
            token: None,
            requests_per_second: rate_limits::GITLAB_DEFAULT_RPS,
            no_rate_limit: false,
            auth: GitLabAuth::Sudo,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/permsync/config.toml)
    /// 3. Local config file (./permsync.toml)
    /// 4. Environment variables with PERMSYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("permsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./permsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // PERMSYNC_GITLAB__TOKEN -> gitlab.token
        builder = builder.add_source(Self::environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    fn environment() -> Environment {
        Environment::with_prefix("PERMSYNC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "permsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// GitLab URL, or `None` when the provider is disabled.
    pub fn gitlab_url(&self) -> Option<&str> {
        let url = self.gitlab.url.trim();
        (!url.is_empty()).then_some(url)
    }

    /// GitLab admin token, ignoring blank values.
    pub fn gitlab_token(&self) -> Option<&str> {
        self.gitlab
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.syncer.concurrency, 4);
        assert_eq!(config.syncer.requeue_delay_secs, 60);
        assert_eq!(config.syncer.skip_hold_secs, 3600);
        assert_eq!(config.store.oldest_batch_size, 100);
        assert!(config.store.seed.is_none());
        assert_eq!(config.gitlab.url, "https://gitlab.com");
        assert!(config.gitlab.token.is_none());
        assert_eq!(config.gitlab.requests_per_second, 5);
        assert!(!config.gitlab.no_rate_limit);
        assert_eq!(config.gitlab.auth, GitLabAuth::Sudo);
    }

    #[test]
    fn test_config_builder_with_toml_string() {
        let toml_content = r#"
            [scheduler]
            interval_secs = 300

            [syncer]
            concurrency = 8
            requeue_delay_secs = 120

            [store]
            oldest_batch_size = 25
            seed = "/tmp/seed.json"

            [gitlab]
            url = "https://gitlab.example.com"
            token = "glpat-test"
            auth = "oauth"
        "#;

        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap();

        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.scheduler.interval_secs, 300);
        assert_eq!(config.syncer.concurrency, 8);
        assert_eq!(config.syncer.requeue_delay_secs, 120);
        assert_eq!(config.syncer.skip_hold_secs, 3600);
        assert_eq!(config.store.oldest_batch_size, 25);
        assert_eq!(config.store.seed, Some(PathBuf::from("/tmp/seed.json")));
        assert_eq!(config.gitlab_url(), Some("https://gitlab.example.com"));
        assert_eq!(config.gitlab_token(), Some("glpat-test"));
        assert_eq!(config.gitlab.auth, GitLabAuth::OAuth);
        // Unset keys keep their defaults
        assert_eq!(config.gitlab.requests_per_second, 5);
    }

    #[test]
    fn test_config_builder_with_defaults() {
        let settings = ConfigBuilder::builder().build().unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.syncer.concurrency, 4);
        assert_eq!(config.gitlab.auth, GitLabAuth::Sudo);
    }

    #[test]
    fn test_environment_overrides_file() {
        let toml_content = r#"
            [syncer]
            concurrency = 8

            [gitlab]
            token = "from-file"
        "#;
        let env = HashMap::from([
            ("PERMSYNC_GITLAB__TOKEN".to_string(), "from-env".to_string()),
            ("PERMSYNC_SCHEDULER__INTERVAL_SECS".to_string(), "15".to_string()),
        ]);

        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .add_source(Config::environment().source(Some(env)))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.gitlab_token(), Some("from-env"));
        assert_eq!(config.scheduler.interval_secs, 15);
        assert_eq!(config.syncer.concurrency, 8);
    }

    #[test]
    fn test_invalid_auth_mode_fails_to_deserialize() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[gitlab]\nauth = \"password\"",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();

        assert!(settings.try_deserialize::<Config>().is_err());
    }

    #[test]
    fn test_blank_values_are_treated_as_unset() {
        let mut config = Config::default();
        config.gitlab.url = "  ".to_string();
        config.gitlab.token = Some(String::new());

        assert!(config.gitlab_url().is_none());
        assert!(config.gitlab_token().is_none());
    }
}
