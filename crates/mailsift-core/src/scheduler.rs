use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::JobsConfig;
use crate::engine::Engine;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub ingest_enabled: bool,
    pub ingest_interval: Duration,
    pub ingest_limit: usize,
    pub recheck_enabled: bool,
    pub recheck_interval: Duration,
    pub recheck_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ingest_enabled: true,
            ingest_interval: Duration::from_secs(5 * 60),
            ingest_limit: 20,
            recheck_enabled: true,
            recheck_interval: Duration::from_secs(6 * 60 * 60),
            recheck_limit: 200,
        }
    }
}

impl From<&JobsConfig> for SchedulerConfig {
    fn from(jobs: &JobsConfig) -> Self {
        Self {
            ingest_enabled: jobs.auto_classify,
            ingest_interval: Duration::from_secs(jobs.ingest_interval_minutes * 60),
            ingest_limit: jobs.ingest_limit,
            recheck_enabled: jobs.recheck,
            recheck_interval: Duration::from_secs(jobs.recheck_interval_hours * 60 * 60),
            recheck_limit: jobs.recheck_limit,
        }
    }
}

/// Time-driven trigger for the background jobs. Each tick simply asks the
/// engine to run; permit contention inside the engine turns a colliding tick
/// into a `skipped` outcome rather than a queue-up.
pub async fn run_scheduler(engine: Arc<Engine>, config: SchedulerConfig, shutdown: CancellationToken) {
    if !config.ingest_enabled {
        info!("automatic classification is disabled");
    }
    if !config.recheck_enabled {
        info!("recheck job is disabled");
    }

    let mut ingest_tick = interval_at(
        Instant::now() + config.ingest_interval,
        config.ingest_interval,
    );
    ingest_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut recheck_tick = interval_at(
        Instant::now() + config.recheck_interval,
        config.recheck_interval,
    );
    recheck_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ingest_tick.tick(), if config.ingest_enabled => {
                // A panicking job must not take the scheduler down with it;
                // the permit guard is released during unwind either way.
                match AssertUnwindSafe(engine.run_ingest(config.ingest_limit))
                    .catch_unwind()
                    .await
                {
                    Ok(summary) => info!(
                        status = ?summary.status,
                        processed = summary.processed_count,
                        "scheduled ingest finished"
                    ),
                    Err(_) => error!("ingest job panicked"),
                }
            }
            _ = recheck_tick.tick(), if config.recheck_enabled => {
                match AssertUnwindSafe(engine.run_recheck(config.recheck_limit))
                    .catch_unwind()
                    .await
                {
                    Ok(report) => info!(
                        status = ?report.status,
                        checked = report.checked,
                        updated = report.updated,
                        ambiguous = report.ambiguous,
                        "scheduled recheck finished"
                    ),
                    Err(_) => error!("recheck job panicked"),
                }
            }
        }
    }

    info!("scheduler shutdown complete");
}
