use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use permsync::{MemoryStore, PermsScheduler, PermsSyncer, SyncerOptions};
use tokio_util::sync::CancellationToken;

use crate::commands::shared::build_registry;
use crate::config::Config;
use crate::progress::log_event;
use crate::seed::Seed;
use crate::shutdown;

/// Flags for `permsync run`; each overrides the matching config value.
#[derive(Debug, Default)]
pub(crate) struct RunOptions {
    pub interval_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub seed: Option<PathBuf>,
    pub no_rate_limit: bool,
}

/// Run the scheduler and syncer until Ctrl+C.
pub(crate) async fn handle_run(options: RunOptions, config: &Config) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new(config.store.oldest_batch_size));

    if let Some(path) = options.seed.as_ref().or(config.store.seed.as_ref()) {
        let (users, repos) = Seed::from_path(path)?.apply(&store).await;
        tracing::info!(users, repos, path = %path.display(), "Loaded seed data");
    } else {
        tracing::warn!("No seed file configured - the store starts empty");
    }

    let providers = build_registry(config, options.no_rate_limit)?;
    if providers.is_empty() {
        tracing::warn!("No permissions providers configured - accounts will be skipped");
    }

    let syncer_options = SyncerOptions {
        concurrency: options.concurrency.unwrap_or(config.syncer.concurrency),
        requeue_delay: Duration::from_secs(config.syncer.requeue_delay_secs),
        skip_hold: Duration::from_secs(config.syncer.skip_hold_secs),
        ..SyncerOptions::default()
    };
    let syncer = PermsSyncer::new(store.clone(), Arc::new(providers), syncer_options)
        .with_event_callback(Box::new(log_event));

    let interval = Duration::from_secs(
        options
            .interval_secs
            .unwrap_or(config.scheduler.interval_secs),
    );
    let scheduler = PermsScheduler::new(store.clone(), syncer, interval);

    let cancel = CancellationToken::new();
    shutdown::setup_shutdown_handler(cancel.clone());

    scheduler.run(cancel).await;

    tracing::info!(records = store.record_count().await, "Stopped");
    Ok(())
}
