//! Scheduled store maintenance
//!
//! Runs on a fixed interval: proposed consumers nobody approved within the
//! expiration age move to `expired`, and request tokens and nonces past
//! their lifetime are dropped. Every step is idempotent and runs alongside
//! live handshakes relying only on the store's own locking.

use std::sync::Arc;
use std::time::Duration;

use credential_store::{CredentialStore, Pruned};
use oauth1::now_secs;
use tracing::{debug, info, warn};

/// What one maintenance pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_consumers: usize,
    pub pruned: Pruned,
}

/// Spawn the maintenance loop.
///
/// An `expiration_age` of zero disables consumer expiry; pruning still runs.
pub fn spawn_maintenance_task<S: CredentialStore + 'static>(
    store: Arc<S>,
    interval: Duration,
    expiration_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, the store was just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_maintenance(store.as_ref(), expiration_age).await;
        }
    })
}

/// Run one maintenance pass. Failures are logged and retried next pass.
pub async fn run_maintenance<S: CredentialStore + ?Sized>(
    store: &S,
    expiration_age: Duration,
) -> MaintenanceReport {
    let now = now_secs();
    let mut report = MaintenanceReport::default();

    if !expiration_age.is_zero() {
        let cutoff = now.saturating_sub(expiration_age.as_secs());
        match store.expire_proposed_consumers(cutoff).await {
            Ok(count) => report.expired_consumers = count,
            Err(e) => warn!(error = %e, "expiring proposed consumers failed"),
        }
    }

    match store.prune_expired(now).await {
        Ok(pruned) => report.pruned = pruned,
        Err(e) => warn!(error = %e, "pruning expired tokens failed"),
    }

    if report == MaintenanceReport::default() {
        debug!("maintenance pass found nothing to do");
    } else {
        info!(
            expired_consumers = report.expired_consumers,
            pruned_request_tokens = report.pruned.request_tokens,
            pruned_nonces = report.pruned.nonces,
            "maintenance pass complete"
        );
    }
    report
}
