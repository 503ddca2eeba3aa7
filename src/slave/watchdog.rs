//! Master liveness watchdog
//!
//! Ticks on a fixed period regardless of traffic and asks the worker to
//! check the silence window. The trip itself happens inside the worker
//! (`SlaveAgent::check_watchdog`) so it is ordered with command handling.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::agent::AgentEvent;

/// Start the watchdog ticker task
pub fn start_watchdog(
    events: mpsc::Sender<AgentEvent>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if events.send(AgentEvent::WatchdogTick).await.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Watchdog exiting");
    })
}
