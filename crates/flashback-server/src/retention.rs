//! Background task enforcing the session retention horizon.

use flashback_db::DbPool;
use flashback_store::{retention_horizon, sweep_expired};
use std::time::Duration;
use tokio::time::sleep;

/// Sessions deleted per sweep statement; the loop repeats while a full
/// batch was removed.
const SWEEP_BATCH: usize = 1_000;

/// Starts a background task that periodically deletes expired sessions
/// and their events.
///
/// This task runs indefinitely.
///
/// # Arguments
///
/// * `pool` - Database connection pool.
/// * `retention_days` - Age threshold beyond which sessions expire.
/// * `interval_seconds` - Time in seconds to wait between sweeps.
pub async fn start_retention_task(pool: DbPool, retention_days: u32, interval_seconds: u64) {
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(
        retention_days,
        interval_seconds,
        "starting session retention sweep task"
    );

    loop {
        // Sleep first so startup settles before the first sweep.
        sleep(interval).await;

        let pool_clone = pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool_clone.get().map_err(|e| {
                // Surface pool exhaustion as a real failure rather than
                // silently reporting a clean sweep.
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    Some(format!("pool connection error: {}", e)),
                )
            })?;
            let horizon = retention_horizon(retention_days);
            let mut total: usize = 0;
            loop {
                let deleted = sweep_expired(&conn, &horizon, SWEEP_BATCH)?;
                total += deleted;
                if deleted < SWEEP_BATCH {
                    break;
                }
            }
            Ok::<usize, flashback_store::StoreError>(total)
        })
        .await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    tracing::info!(count, "deleted expired sessions");
                } else {
                    tracing::debug!("no expired sessions to delete");
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to sweep expired sessions");
            }
            Err(e) => {
                tracing::error!(error = %e, "retention task panicked or was cancelled");
            }
        }
    }
}
