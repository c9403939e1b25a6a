use permsync::SyncEvent;

/// Log a sync outcome as a structured tracing event.
pub(crate) fn log_event(event: SyncEvent) {
    match event {
        SyncEvent::Synced {
            subject,
            granted,
            partial,
        } => {
            if partial {
                tracing::warn!(subject = %subject, granted, "Synced incomplete permissions");
            } else {
                tracing::info!(subject = %subject, granted, "Synced permissions");
            }
        }

        SyncEvent::Requeued {
            subject,
            granted,
            reason,
            retry_in,
        } => {
            tracing::warn!(
                subject = %subject,
                granted,
                retry_in_secs = retry_in.as_secs(),
                reason = %reason,
                "Sync requeued"
            );
        }

        SyncEvent::Skipped { subject, reason } => {
            tracing::debug!(subject = %subject, reason = %reason, "Sync skipped");
        }

        SyncEvent::Failed { subject, error } => {
            tracing::error!(subject = %subject, error = %error, "Sync failed");
        }

        other => {
            tracing::debug!(subject = %other.subject(), "Sync event");
        }
    }
}
