//! Master timeline: load, prepare, then loop scheduled start → heartbeats →
//! reset until shutdown.

use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{MasterPhase, MasterSession};
use super::MasterError;
use crate::channel::CommandChannel;
use crate::clock;
use crate::config::Config;
use crate::media::{self, MediaError, MediaPlayer, PlaybackState};
use crate::protocol::CommandMessage;

/// Master-side settings pulled out of [`Config`]
#[derive(Debug, Clone)]
pub struct MasterSettings {
    pub heartbeat_interval: Duration,
    pub initial_prepare: Duration,
    pub lead_time: Duration,
    pub loop_delay: Duration,
    pub origin_id: String,
    pub preroll: Duration,
    pub start_delay_ms: i64,
    pub video_path: String,
}

impl From<&Config> for MasterSettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.timing.heartbeat_interval(),
            initial_prepare: config.timing.initial_prepare(),
            lead_time: config.timing.lead_time(),
            loop_delay: config.timing.loop_delay(),
            origin_id: config.network.master_id.clone(),
            preroll: config.timing.preroll(),
            start_delay_ms: config.timing.start_delay_ms,
            video_path: config.media.video_path.clone(),
        }
    }
}

/// Whether a wait ran to completion or was cut short by shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Elapsed,
    Shutdown,
}

pub struct MasterCoordinator<P> {
    channel: CommandChannel,
    phase_tx: watch::Sender<MasterPhase>,
    player: P,
    session: MasterSession,
    settings: MasterSettings,
    shutdown: CancellationToken,
}

impl<P: MediaPlayer> MasterCoordinator<P> {
    pub fn new(
        settings: MasterSettings,
        player: P,
        channel: CommandChannel,
        shutdown: CancellationToken,
    ) -> Self {
        let session = MasterSession::new(settings.video_path.clone());
        Self::with_session(session, settings, player, channel, shutdown)
    }

    pub fn with_session(
        session: MasterSession,
        settings: MasterSettings,
        player: P,
        channel: CommandChannel,
        shutdown: CancellationToken,
    ) -> Self {
        let (phase_tx, _) = watch::channel(session.phase);
        Self {
            channel,
            phase_tx,
            player,
            session,
            settings,
            shutdown,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.session.epoch
    }

    pub fn subscribe(&self) -> watch::Receiver<MasterPhase> {
        self.phase_tx.subscribe()
    }

    /// Run until shutdown or a local media failure.
    ///
    /// Missing or unreadable media is reported before any slave is engaged.
    /// Once slaves have been told to load, every exit path broadcasts `stop`.
    pub async fn run(mut self) -> Result<(), MasterError> {
        info!(
            epoch = self.session.epoch,
            origin = %self.settings.origin_id,
            media = %self.session.media_path,
            "Master starting"
        );

        if let Err(e) = self.resolve_media() {
            error!(error = %e, "Cannot start without media");
            self.player.stop();
            return Err(e.into());
        }

        let result = match self.startup().await {
            Ok(Wait::Elapsed) => self.playback_loop().await,
            Ok(Wait::Shutdown) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(error = %e, "Master failed");
        }
        self.stop().await;
        result
    }

    /// Check the media exists and bind it locally.
    fn resolve_media(&mut self) -> Result<(), MediaError> {
        let path = self.session.media_path.clone();
        if path.is_empty() || !Path::new(&path).exists() {
            return Err(MediaError::NotFound(path));
        }
        self.player.load_media(&path)?;
        Ok(())
    }

    async fn startup(&mut self) -> Result<Wait, MasterError> {
        self.set_phase(MasterPhase::Preparing);
        let epoch = self.session.epoch;
        let path = self.session.media_path.clone();

        info!("Phase 1: loading media on all nodes");
        self.broadcast(&CommandMessage::load(&self.settings.origin_id, epoch, &path))
            .await;

        media::preroll(&mut self.player, &path, self.settings.preroll).await?;
        debug!("Local media pre-rolled");

        self.broadcast(&CommandMessage::prepare(&self.settings.origin_id, epoch, &path))
            .await;

        info!(
            grace_ms = self.settings.initial_prepare.as_millis() as u64,
            "Phase 2: waiting for slaves to buffer"
        );
        Ok(self.wait_with_heartbeats(self.settings.initial_prepare).await)
    }

    async fn playback_loop(&mut self) -> Result<(), MasterError> {
        loop {
            if self.play_once().await == Wait::Shutdown {
                return Ok(());
            }

            self.set_phase(MasterPhase::Resetting);
            info!("Media ended, resetting for seamless loop");
            let path = self.session.media_path.clone();
            self.player.load_media(&path)?;
            self.player.pause();
            self.player.seek(0.0);
            self.broadcast(&CommandMessage::reset(
                &self.settings.origin_id,
                self.session.epoch,
            ))
            .await;

            debug!(delay_ms = self.settings.loop_delay.as_millis() as u64, "Loop delay");
            if self.wait_with_heartbeats(self.settings.loop_delay).await == Wait::Shutdown {
                return Ok(());
            }
        }
    }

    /// One synchronized start followed by heartbeats until local end-of-media.
    async fn play_once(&mut self) -> Wait {
        self.set_phase(MasterPhase::AwaitingSync);
        let sync_time = clock::unix_now() + self.settings.lead_time.as_secs_f64();
        info!(sync_time, "Scheduling synchronized start");
        self.broadcast(&CommandMessage::prepare_play(
            &self.settings.origin_id,
            self.session.epoch,
            sync_time,
        ))
        .await;

        let until_start = clock::seconds_until(sync_time, self.settings.start_delay_ms);
        if self.wait(clock::clamp_delay(until_start)).await == Wait::Shutdown {
            return Wait::Shutdown;
        }

        self.player.play();
        self.set_phase(MasterPhase::Playing);
        info!(at = %clock::wall_clock_label(), "Master playback started");

        let mut heartbeat = self.heartbeat_ticker();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Wait::Shutdown,
                _ = heartbeat.tick() => {}
            }

            self.send_heartbeat().await;

            match self.player.state() {
                PlaybackState::Ended => return Wait::Elapsed,
                PlaybackState::Error => {
                    warn!("Local player reported an error, treating as end of media");
                    return Wait::Elapsed;
                }
                _ => {}
            }
        }
    }

    async fn stop(&mut self) {
        info!("Stopping playback and sending stop signal");
        self.broadcast(&CommandMessage::stop(
            &self.settings.origin_id,
            self.session.epoch,
        ))
        .await;
        self.player.stop();
        self.set_phase(MasterPhase::Idle);
        info!("Master stopped");
    }

    /// Best-effort broadcast; failures are logged and the timeline carries on.
    async fn broadcast(&self, message: &CommandMessage) {
        if let Err(e) = self.channel.broadcast(message).await {
            warn!(command = %message.command, error = %e, "Broadcast failed");
        }
    }

    async fn send_heartbeat(&self) {
        self.broadcast(&CommandMessage::sync(
            &self.settings.origin_id,
            self.session.epoch,
        ))
        .await;
    }

    /// Ticker on the heartbeat interval, first tick one interval from now.
    fn heartbeat_ticker(&self) -> Interval {
        let period = self.settings.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Plain wait, used before a synchronized start where a broadcast in
    /// flight would delay local playback.
    async fn wait(&self, duration: Duration) -> Wait {
        tokio::select! {
            _ = self.shutdown.cancelled() => Wait::Shutdown,
            _ = tokio::time::sleep(duration) => Wait::Elapsed,
        }
    }

    /// Wait while keeping slave watchdogs fed with `sync` on the heartbeat
    /// interval. Slaves otherwise drop to standby during a grace interval
    /// longer than their watchdog timeout.
    async fn wait_with_heartbeats(&self, duration: Duration) -> Wait {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut heartbeat = self.heartbeat_ticker();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Wait::Shutdown,
                _ = &mut deadline => return Wait::Elapsed,
                _ = heartbeat.tick() => self.send_heartbeat().await,
            }
        }
    }

    fn set_phase(&mut self, phase: MasterPhase) {
        if self.session.phase != phase {
            debug!(from = ?self.session.phase, to = ?phase, "Master phase change");
        }
        self.session.phase = phase;
        self.phase_tx.send_replace(phase);
    }
}
