/// Periodic expiry sweeper
///
/// Demotes stale and finished sessions to `expired` on a fixed interval. The
/// loop is owned by the process lifecycle: `start` returns a handle whose
/// `shutdown` stops the task deterministically.
pub mod tasks;

use crate::{context::AppContext, error::PortalResult};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

pub use tasks::SweepReport;

pub struct Sweeper {
    context: Arc<AppContext>,
}

/// Handle for stopping a running sweeper.
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!("sweeper task failed to join: {}", e);
        }
    }
}

impl Sweeper {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Spawn the sweep loop. Dropping the returned handle also stops it.
    pub fn start(self) -> SweeperHandle {
        let (stop, mut stopped) = watch::channel(false);
        let period = Duration::from_secs(self.context.config.session.sweep_interval_seconds);

        let task = tokio::spawn(async move {
            info!("starting expiry sweeper (every {:?})", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match Self::run_pass(&self.context).await {
                            Ok(report) if report.total() > 0 => {
                                info!(
                                    stale_awaiting = report.stale_awaiting,
                                    stale_inserting = report.stale_inserting,
                                    finished_active = report.finished_active,
                                    "expired stale sessions"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!("session sweep failed: {}", e),
                        }
                    }
                    _ = stopped.changed() => {
                        info!("expiry sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle { stop, task }
    }

    /// One sweep pass: three independent, idempotent bulk transitions, each
    /// moving only rows that satisfy an objective time predicate. Access is
    /// revoked after the store transitions commit; revoke failures never
    /// undo an expiry.
    pub async fn run_pass(ctx: &AppContext) -> PortalResult<SweepReport> {
        let now = ctx.clock.now_ts();
        let policy = &ctx.config.session;

        let stale_awaiting =
            tasks::expire_stale_awaiting(&ctx.db, now, policy.stale_session_age_seconds).await?;
        let (stale_inserting, lapsed_inserting) =
            tasks::expire_stale_inserting(&ctx.db, now, policy.inserting_lock_timeout_seconds)
                .await?;
        let (finished_active, lapsed_active) =
            tasks::expire_finished_active(&ctx.db, now).await?;

        for address in lapsed_inserting.iter().chain(lapsed_active.iter()) {
            if let Err(e) = ctx.access.revoke(address).await {
                warn!(address = %address, error = %e, "access revoke failed");
            }
        }

        Ok(SweepReport {
            stale_awaiting,
            stale_inserting,
            finished_active,
        })
    }
}
