//! Scheduled cleanup tasks for expired/stale data.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// Age threshold for staged registrations (in minutes). Covers both
/// abandoned pending rows and promoted rows kept for audit.
const STALE_REGISTRATION_AGE_MINUTES: i64 = 24 * 60;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    // Clean up expired passcodes
    match db.otp_codes().cleanup_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired passcodes", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired passcodes: {}", e),
    }

    // Clean up stale staged registrations
    match db
        .temp_registrations()
        .cleanup_stale(STALE_REGISTRATION_AGE_MINUTES)
        .await
    {
        Ok(count) if count > 0 => info!("Cleaned up {} stale staged registrations", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up staged registrations: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
