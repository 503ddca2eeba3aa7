//! Slave role: listen, validate, apply, and fall back to standby on silence
//!
//! Three tasks cooperate through a single event queue:
//! - the receiver decodes datagrams and enqueues them,
//! - the watchdog enqueues a tick every period,
//! - the worker owns the [`SlaveAgent`] and handles events strictly in order.

mod agent;
mod session;
mod watchdog;

pub use agent::{AgentEvent, AgentSettings, SlaveAgent};
pub use session::{Rejection, SlavePhase, SlaveSession, Verdict};
pub use watchdog::start_watchdog;

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{self, CommandListener, TransportError};
use crate::config::Config;
use crate::media::MediaPlayer;

const EVENT_QUEUE_DEPTH: usize = 256;

/// Running slave tasks
pub struct SlaveHandle {
    pub phase: watch::Receiver<SlavePhase>,
    pub task: JoinHandle<()>,
}

/// Bind the sync port from configuration and run the slave until `shutdown`.
pub async fn run_slave<P: MediaPlayer>(
    config: &Config,
    player: P,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    let addr = channel::resolve(&config.network.listen_address, config.network.port).await?;
    let listener = CommandListener::bind(addr).await?;
    info!(addr = %addr, master = %config.network.master_id, "Waiting for master commands");

    let handle = start_slave_tasks(config, player, listener, shutdown);
    if let Err(e) = handle.task.await {
        tracing::error!(error = %e, "Slave task panicked");
    }
    Ok(())
}

/// Start the receiver, watchdog and worker tasks.
pub fn start_slave_tasks<P: MediaPlayer>(
    config: &Config,
    player: P,
    listener: CommandListener,
    shutdown: CancellationToken,
) -> SlaveHandle {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let agent = SlaveAgent::new(AgentSettings::from(config), player, tx.clone());
    let phase = agent.subscribe();

    let worker = start_worker(agent, rx, shutdown.clone());
    let receiver = start_receiver(listener, tx.clone(), shutdown.clone());
    let watchdog = start_watchdog(tx, config.timing.watchdog_period(), shutdown);

    let task = tokio::spawn(async move {
        let (worker, receiver, watchdog) = tokio::join!(worker, receiver, watchdog);
        for (name, result) in [("worker", worker), ("receiver", receiver), ("watchdog", watchdog)] {
            if let Err(e) = result {
                tracing::error!(task = name, error = %e, "Slave task ended abnormally");
            }
        }
        info!("Slave stopped");
    });

    SlaveHandle { phase, task }
}

/// The single consumer of the event queue.
fn start_worker<P: MediaPlayer>(
    mut agent: SlaveAgent<P>,
    mut events: mpsc::Receiver<AgentEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => agent.handle_event(event).await,
                    None => break,
                },
            }
        }
        agent.shutdown();
        debug!("Worker exiting");
    })
}

/// Decode datagrams and enqueue them for the worker.
fn start_receiver(
    listener: CommandListener,
    events: mpsc::Sender<AgentEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = listener.recv() => received,
            };

            match received {
                Ok((message, from)) => {
                    if events.send(AgentEvent::Command(message)).await.is_err() {
                        break;
                    }
                    tracing::trace!(from = %from, "Message queued");
                }
                Err(TransportError::Codec(e)) => {
                    debug!(error = %e, "Discarding undecodable datagram");
                }
                Err(e) => {
                    warn!(error = %e, "Receive failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        debug!("Receiver exiting");
    })
}
