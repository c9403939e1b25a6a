//! One-shot provider calls, useful for checking credentials and visibility.

use std::error::Error;

use permsync::gitlab::SERVICE_TYPE;
use permsync::{ExternalAccount, ExternalRepoSpec, PermsProvider, ProviderError};
use serde_json::json;

use crate::commands::shared::gitlab_provider;
use crate::config::Config;

/// Build the external account the GitLab providers expect for a user ID.
pub(crate) fn user_account(
    service_id: &str,
    gitlab_user_id: i64,
    oauth_token: Option<&str>,
) -> ExternalAccount {
    ExternalAccount {
        service_type: SERVICE_TYPE.to_string(),
        service_id: service_id.to_string(),
        account_id: gitlab_user_id.to_string(),
        account_data: json!({ "id": gitlab_user_id }),
        auth_data: oauth_token.map(|token| json!({ "access_token": token })),
    }
}

fn print_result(result: Result<Vec<String>, ProviderError>) -> Result<(), Box<dyn Error>> {
    match result {
        Ok(ids) => {
            for id in &ids {
                println!("{id}");
            }
            tracing::info!(count = ids.len(), "Fetched permissions");
            Ok(())
        }
        Err(err) => {
            let message = err.to_string();
            let partial = err.into_partial_ids();
            for id in &partial {
                println!("{id}");
            }
            if !partial.is_empty() {
                tracing::warn!(count = partial.len(), "Printed a partial list before the failure");
            }
            Err(message.into())
        }
    }
}

/// Print the IDs of the private projects a GitLab user can read.
pub(crate) async fn handle_fetch_user(
    config: &Config,
    gitlab_user_id: i64,
    oauth_token: Option<String>,
    no_rate_limit: bool,
) -> Result<(), Box<dyn Error>> {
    let provider = gitlab_provider(config, no_rate_limit)?
        .ok_or("GitLab URL not configured. Set [gitlab] url in permsync.toml")?;
    let account = user_account(
        &provider.code_host().service_id,
        gitlab_user_id,
        oauth_token.as_deref(),
    );

    print_result(provider.fetch_user_perms(&account).await)
}

/// Print the IDs of the GitLab users that can read a project.
pub(crate) async fn handle_fetch_repo(
    config: &Config,
    project_id: String,
    no_rate_limit: bool,
) -> Result<(), Box<dyn Error>> {
    let provider = gitlab_provider(config, no_rate_limit)?
        .ok_or("GitLab URL not configured. Set [gitlab] url in permsync.toml")?;
    let repo = ExternalRepoSpec {
        service_type: SERVICE_TYPE.to_string(),
        service_id: provider.code_host().service_id.clone(),
        id: project_id,
    };

    print_result(provider.fetch_repo_perms(&repo).await)
}
