//! permsync CLI - runs the permissions scheduler against a code host.

mod commands;
mod config;
mod progress;
mod seed;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::run::RunOptions;

#[derive(Parser)]
#[command(name = "permsync")]
#[command(version)]
#[command(about = "Keeps repository permissions in sync with a code host")]
#[command(
    long_about = "permsync periodically finds users and repositories whose permissions are \
missing or stale, fetches the authoritative access lists from the code host, and stores them. \
Users and repositories are loaded from a JSON seed file into an in-memory store."
)]
#[command(after_long_help = r#"EXAMPLES
    Run against a GitLab instance with an admin token:
        $ PERMSYNC_GITLAB__URL=https://gitlab.example.com \
          PERMSYNC_GITLAB__TOKEN=glpat-... \
          permsync run --seed seed.json

    Check which private projects a GitLab user can read:
        $ permsync fetch-user --gitlab-user-id 42

    Check who can read a GitLab project:
        $ permsync fetch-repo --project-id 101

CONFIGURATION
    permsync reads configuration from:
      1. ~/.config/permsync/config.toml (or $XDG_CONFIG_HOME/permsync/config.toml)
      2. ./permsync.toml
      3. Environment variables (PERMSYNC_ prefix, sections separated by "__")
      4. .env file in current directory

ENVIRONMENT VARIABLES
    PERMSYNC_GITLAB__URL                GitLab instance URL (default: https://gitlab.com)
    PERMSYNC_GITLAB__TOKEN              GitLab admin personal access token
    PERMSYNC_GITLAB__AUTH               sudo (default) or oauth
    PERMSYNC_SCHEDULER__INTERVAL_SECS   Seconds between scheduling rounds (default: 60)
    PERMSYNC_SYNCER__CONCURRENCY        Concurrent sync requests (default: 4)
    PERMSYNC_STORE__SEED                JSON seed file for the in-memory store
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and syncer until Ctrl+C
    Run {
        /// Seconds between scheduling rounds
        #[arg(short = 'i', long)]
        interval_secs: Option<u64>,
        /// Number of sync requests processed at once
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,
        /// JSON file with users and repositories to load
        #[arg(short = 's', long)]
        seed: Option<PathBuf>,
        /// Disable proactive rate limiting
        #[arg(short = 'R', long)]
        no_rate_limit: bool,
    },
    /// Print the private projects a GitLab user can read
    #[cfg(feature = "gitlab")]
    FetchUser {
        /// GitLab user ID
        #[arg(long)]
        gitlab_user_id: i64,
        /// The user's OAuth access token (required with `auth = "oauth"`)
        #[arg(long, env = "PERMSYNC_OAUTH_TOKEN", hide_env_values = true)]
        oauth_token: Option<String>,
        /// Disable proactive rate limiting
        #[arg(short = 'R', long)]
        no_rate_limit: bool,
    },
    /// Print the GitLab users that can read a project
    #[cfg(feature = "gitlab")]
    FetchRepo {
        /// GitLab project ID
        #[arg(long)]
        project_id: String,
        /// Disable proactive rate limiting
        #[arg(short = 'R', long)]
        no_rate_limit: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("permsync=info,permsync_cli=info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            interval_secs,
            concurrency,
            seed,
            no_rate_limit,
        } => {
            let options = RunOptions {
                interval_secs,
                concurrency,
                seed,
                no_rate_limit,
            };
            commands::run::handle_run(options, &config).await?;
        }
        #[cfg(feature = "gitlab")]
        Commands::FetchUser {
            gitlab_user_id,
            oauth_token,
            no_rate_limit,
        } => {
            commands::fetch::handle_fetch_user(&config, gitlab_user_id, oauth_token, no_rate_limit)
                .await?;
        }
        #[cfg(feature = "gitlab")]
        Commands::FetchRepo {
            project_id,
            no_rate_limit,
        } => {
            commands::fetch::handle_fetch_repo(&config, project_id, no_rate_limit).await?;
        }
    }

    Ok(())
}
