//! Periodic eviction of idle sessions and stale hash index entries.

use crate::metrics;
use crate::state::AppState;
use std::time::Duration;
use time::OffsetDateTime;

/// Result of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sessions_evicted: usize,
    pub hash_entries_pruned: usize,
    pub locks_pruned: usize,
}

/// Run one sweep over the shared stores.
pub async fn sweep_once(state: &AppState) -> SweepStats {
    let mut stats = SweepStats::default();

    // A TTL too large to subtract means nothing is ever idle long enough.
    if let Some(cutoff) = OffsetDateTime::now_utc().checked_sub(state.config.sessions.ttl()) {
        match state.sessions.evict_idle(cutoff).await {
            Ok(evicted) => stats.sessions_evicted = evicted,
            Err(e) => tracing::warn!(error = %e, "session eviction failed"),
        }
    }

    match state.hash_index.entries().await {
        Ok(entries) => {
            for (digest, path) in entries {
                match state.storage.exists(&path).await {
                    Ok(true) => {}
                    Ok(false) => {
                        if let Ok(true) = state.hash_index.forget(&digest, &path).await {
                            stats.hash_entries_pruned += 1;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "skipping hash entry")
                    }
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to list hash index entries"),
    }

    stats.locks_pruned = state.locks.prune();

    metrics::SESSIONS_EXPIRED.inc_by(stats.sessions_evicted as u64);
    metrics::HASH_ENTRIES_PRUNED.inc_by(stats.hash_entries_pruned as u64);
    if let Ok(active) = state.sessions.len().await {
        metrics::ACTIVE_SESSIONS.set(active as i64);
    }
    stats
}

/// Spawn a background task that sweeps every `interval`.
pub fn spawn_sweep_task(state: AppState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let stats = sweep_once(&state).await;
            if stats.sessions_evicted > 0 || stats.hash_entries_pruned > 0 {
                tracing::info!(
                    sessions_evicted = stats.sessions_evicted,
                    hash_entries_pruned = stats.hash_entries_pruned,
                    "Sweep task evicted stale entries"
                );
            }
        }
    })
}
