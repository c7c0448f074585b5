//! Scheduled removal of expired refresh token records.
//!
//! Expired records are already ignored when validating, so this only keeps
//! the table from growing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::db::RefreshTokenStore;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once, returning how many records were removed.
pub async fn run_cleanup(refresh_tokens: &dyn RefreshTokenStore) -> u64 {
    match refresh_tokens.delete_expired().await {
        Ok(count) => {
            if count > 0 {
                info!(count, "Cleaned up expired refresh tokens");
            }
            count
        }
        Err(e) => {
            error!(error = %e, "Failed to clean up expired refresh tokens");
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    refresh_tokens: Arc<dyn RefreshTokenStore>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup already swept.
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(refresh_tokens.as_ref()).await;
        }
    })
}
