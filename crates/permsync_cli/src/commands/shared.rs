//! Provider construction shared by the subcommands.

use std::error::Error;
#[cfg(feature = "gitlab")]
use std::sync::Arc;

#[cfg(feature = "gitlab")]
use permsync::gitlab::{OAuthProvider, SudoProvider};
use permsync::provider::{ApiRateLimiter, ProviderRegistry};
#[cfg(feature = "gitlab")]
use permsync::PermsProvider;

use crate::config::Config;
#[cfg(feature = "gitlab")]
use crate::config::GitLabAuth;

/// Create a rate limiter unless rate limiting is disabled.
pub(crate) fn maybe_rate_limiter(no_rate_limit: bool, rps: u32) -> Option<ApiRateLimiter> {
    if no_rate_limit {
        None
    } else {
        Some(ApiRateLimiter::new(rps))
    }
}

/// Build the configured GitLab provider.
///
/// Returns `Ok(None)` when no GitLab URL is configured.
#[cfg(feature = "gitlab")]
pub(crate) fn gitlab_provider(
    config: &Config,
    no_rate_limit: bool,
) -> Result<Option<Arc<dyn PermsProvider>>, Box<dyn Error>> {
    let Some(url) = config.gitlab_url() else {
        return Ok(None);
    };

    let no_rate_limit = no_rate_limit || config.gitlab.no_rate_limit;
    if no_rate_limit {
        tracing::warn!("Rate limiting disabled - GitLab may throttle requests");
    }
    let rate_limiter = maybe_rate_limiter(no_rate_limit, config.gitlab.requests_per_second);

    let provider: Arc<dyn PermsProvider> = match config.gitlab.auth {
        GitLabAuth::Sudo => {
            let token = config.gitlab_token().ok_or(
                "GitLab token not configured. Set PERMSYNC_GITLAB__TOKEN or add [gitlab] token to permsync.toml",
            )?;
            Arc::new(SudoProvider::new(url, token, rate_limiter)?)
        }
        GitLabAuth::OAuth => Arc::new(OAuthProvider::new(url, rate_limiter)?),
    };

    tracing::info!(
        service_id = %provider.code_host().service_id,
        auth = ?config.gitlab.auth,
        "Registered GitLab permissions provider"
    );
    Ok(Some(provider))
}

/// Build the registry of every configured provider.
pub(crate) fn build_registry(
    config: &Config,
    no_rate_limit: bool,
) -> Result<ProviderRegistry, Box<dyn Error>> {
    #[cfg_attr(not(feature = "gitlab"), allow(unused_mut))]
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "gitlab")]
    if let Some(provider) = gitlab_provider(config, no_rate_limit)? {
        registry.register(provider);
    }
    #[cfg(not(feature = "gitlab"))]
    let _ = (config, no_rate_limit);

    Ok(registry)
}
