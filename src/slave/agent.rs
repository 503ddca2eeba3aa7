//! Slave playback state machine
//!
//! A `SlaveAgent` owns the session record, the local player and any pending
//! scheduled start. It is driven by exactly one worker task, one event at a
//! time, so commands, scheduled starts and watchdog checks never interleave.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{SlavePhase, SlaveSession, Verdict};
use crate::clock;
use crate::config::Config;
use crate::media::{self, MediaError, MediaPlayer};
use crate::protocol::{Command, CommandMessage};

/// Everything the worker task reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Command(CommandMessage),
    /// A scheduled start timer fired; carries the id it was armed with
    ScheduledStart(u64),
    WatchdogTick,
}

/// Slave-side settings pulled out of [`Config`]
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub master_id: String,
    pub preroll: Duration,
    pub start_delay_ms: i64,
    pub watchdog_timeout: Duration,
}

impl From<&Config> for AgentSettings {
    fn from(config: &Config) -> Self {
        Self {
            master_id: config.network.master_id.clone(),
            preroll: config.timing.preroll(),
            start_delay_ms: config.timing.start_delay_ms,
            watchdog_timeout: config.timing.watchdog_timeout(),
        }
    }
}

/// An armed one-shot start, revoked through its token
struct PendingStart {
    cancel: CancellationToken,
    id: u64,
    sync_time: f64,
}

pub struct SlaveAgent<P> {
    events: mpsc::Sender<AgentEvent>,
    next_start_id: u64,
    pending_start: Option<PendingStart>,
    phase_tx: watch::Sender<SlavePhase>,
    player: P,
    session: SlaveSession,
    settings: AgentSettings,
}

impl<P: MediaPlayer> SlaveAgent<P> {
    /// Create an agent in standby. `events` is the agent's own queue; timers
    /// post their `ScheduledStart` there.
    pub fn new(settings: AgentSettings, mut player: P, events: mpsc::Sender<AgentEvent>) -> Self {
        player.display_standby();
        let (phase_tx, _) = watch::channel(SlavePhase::Standby);
        Self {
            events,
            next_start_id: 0,
            pending_start: None,
            phase_tx,
            player,
            session: SlaveSession::new(Instant::now()),
            settings,
        }
    }

    pub fn phase(&self) -> SlavePhase {
        self.session.phase
    }

    pub fn session(&self) -> &SlaveSession {
        &self.session
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    /// Follow phase changes from outside the worker task.
    pub fn subscribe(&self) -> watch::Receiver<SlavePhase> {
        self.phase_tx.subscribe()
    }

    pub fn has_pending_start(&self) -> bool {
        self.pending_start.is_some()
    }

    pub async fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Command(message) => {
                self.handle_message(&message).await;
            }
            AgentEvent::ScheduledStart(id) => self.on_scheduled_start(id),
            AgentEvent::WatchdogTick => {
                self.check_watchdog(Instant::now());
            }
        }
    }

    /// Run the acceptance protocol and, if the message passes, apply it.
    pub async fn handle_message(&mut self, message: &CommandMessage) -> Verdict {
        let verdict = self
            .session
            .accept(message, &self.settings.master_id, Instant::now());

        match verdict {
            Verdict::Rejected(reason) => {
                debug!(command = %message.command, ?reason, "Dropping message");
                return verdict;
            }
            Verdict::NewSession {
                previous: Some(previous),
                epoch,
            } => {
                info!(previous, epoch, "Master restart detected, adopting new epoch");
            }
            Verdict::NewSession {
                previous: None,
                epoch,
            } => {
                info!(epoch, "Following master session");
            }
            Verdict::Accepted => {}
        }

        self.apply(message).await;
        verdict
    }

    /// Trip to standby if the master has gone quiet. Returns whether it tripped.
    pub fn check_watchdog(&mut self, now: Instant) -> bool {
        if !self
            .session
            .watchdog_expired(now, self.settings.watchdog_timeout)
        {
            return false;
        }

        warn!(
            silent_ms = now
                .saturating_duration_since(self.session.last_heartbeat_at)
                .as_millis() as u64,
            "Master signal lost, reverting to standby"
        );
        self.cancel_pending_start();
        self.player.display_standby();
        self.session.reset_after_watchdog(now);
        self.publish_phase();
        true
    }

    /// Stop everything on process shutdown.
    pub fn shutdown(&mut self) {
        self.cancel_pending_start();
        self.player.stop();
    }

    async fn apply(&mut self, message: &CommandMessage) {
        let video_path = message.payload.video_path.as_deref();
        match message.command {
            Command::Load => self.on_load(video_path),
            Command::Prepare => self.on_prepare(video_path).await,
            Command::PreparePlay => self.on_prepare_play(message.payload.sync_time),
            Command::Play => self.on_play(),
            Command::Sync => {}
            Command::Reset => self.on_reset(),
            Command::Stop => self.on_stop(),
            Command::Unknown => debug!("Ignoring unknown command"),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn on_load(&mut self, video_path: Option<&str>) {
        let Some(path) = video_path else {
            debug!("load without video_path, ignoring");
            return;
        };

        if self.session.loaded_media.as_deref() == Some(path) {
            self.session.canonical_media = Some(path.to_string());
            return;
        }

        match self.bind(path) {
            Ok(()) => self.set_phase(SlavePhase::Loaded),
            Err(e) => self.fall_back_to_standby(e),
        }
    }

    async fn on_prepare(&mut self, video_path: Option<&str>) {
        let Some(path) = video_path
            .map(str::to_string)
            .or_else(|| self.session.canonical_media.clone())
        else {
            debug!("prepare with no media known, ignoring");
            return;
        };

        if self.session.phase == SlavePhase::Prepared
            && self.session.loaded_media.as_deref() == Some(path.as_str())
        {
            return;
        }

        self.cancel_pending_start();
        if let Err(e) = self.bind(&path) {
            self.fall_back_to_standby(e);
            return;
        }

        match media::preroll(&mut self.player, &path, self.settings.preroll).await {
            Ok(()) => self.set_phase(SlavePhase::Prepared),
            Err(e) => self.fall_back_to_standby(e),
        }
    }

    fn on_prepare_play(&mut self, sync_time: Option<f64>) {
        match self.session.phase {
            SlavePhase::Playing => {
                debug!("prepare_play while playing, already running");
                return;
            }
            SlavePhase::Prepared => {}
            phase => {
                debug!(?phase, "prepare_play before prepare, ignoring");
                return;
            }
        }

        let Some(sync_time) = sync_time else {
            debug!("prepare_play without sync_time, ignoring");
            return;
        };

        // Redundant copies of the same broadcast keep the timer already armed
        if let Some(pending) = &self.pending_start {
            if pending.sync_time == sync_time {
                return;
            }
        }

        let delay = clock::seconds_until(sync_time, self.settings.start_delay_ms);
        if delay <= 0.0 {
            debug!(late_ms = (-delay * 1000.0) as i64, "Sync time already passed, starting now");
            self.cancel_pending_start();
            self.start();
        } else {
            self.schedule_start(sync_time, clock::clamp_delay(delay));
        }
    }

    fn on_play(&mut self) {
        if self.session.phase == SlavePhase::Playing {
            return;
        }
        if self.session.loaded_media.is_none() {
            debug!("play with no media bound, ignoring");
            return;
        }
        self.cancel_pending_start();
        self.start();
    }

    fn on_reset(&mut self) {
        self.cancel_pending_start();

        let Some(path) = self
            .session
            .canonical_media
            .clone()
            .or_else(|| self.session.loaded_media.clone())
        else {
            debug!("reset with no media known, ignoring");
            return;
        };

        if self.session.phase == SlavePhase::Prepared
            && self.session.loaded_media.as_deref() == Some(path.as_str())
        {
            return;
        }

        self.player.stop();
        self.session.loaded_media = None;
        if let Err(e) = self.bind(&path) {
            self.fall_back_to_standby(e);
            return;
        }
        self.player.pause();
        self.player.seek(0.0);
        self.set_phase(SlavePhase::Prepared);
    }

    fn on_stop(&mut self) {
        self.cancel_pending_start();
        self.player.stop();
        self.player.display_standby();
        self.session.loaded_media = None;
        self.set_phase(SlavePhase::Standby);
    }

    fn on_scheduled_start(&mut self, id: u64) {
        match &self.pending_start {
            Some(pending) if pending.id == id => {
                self.pending_start = None;
            }
            _ => {
                debug!(id, "Stale scheduled start, ignoring");
                return;
            }
        }

        if self.session.phase == SlavePhase::Prepared {
            self.start();
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Make `path` the engine's media, skipping the engine if it already is.
    fn bind(&mut self, path: &str) -> Result<(), MediaError> {
        self.session.canonical_media = Some(path.to_string());
        if self.session.loaded_media.as_deref() == Some(path) {
            return Ok(());
        }

        self.cancel_pending_start();
        self.session.loaded_media = None;
        self.player.load_media(path)?;
        self.session.loaded_media = Some(path.to_string());
        debug!(path, "Media bound");
        Ok(())
    }

    fn fall_back_to_standby(&mut self, error: MediaError) {
        warn!(error = %error, "Media unusable, showing standby");
        self.cancel_pending_start();
        self.player.display_standby();
        self.session.loaded_media = None;
        self.set_phase(SlavePhase::Standby);
    }

    fn start(&mut self) {
        self.player.play();
        self.set_phase(SlavePhase::Playing);
        info!(at = %clock::wall_clock_label(), "Playback started");
    }

    fn schedule_start(&mut self, sync_time: f64, delay: Duration) {
        self.cancel_pending_start();

        self.next_start_id += 1;
        let id = self.next_start_id;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(AgentEvent::ScheduledStart(id)).await;
                }
            }
        });

        debug!(id, delay_ms = delay.as_millis() as u64, "Start scheduled");
        self.pending_start = Some(PendingStart {
            cancel,
            id,
            sync_time,
        });
    }

    fn cancel_pending_start(&mut self) {
        if let Some(pending) = self.pending_start.take() {
            pending.cancel.cancel();
            debug!(id = pending.id, "Scheduled start cancelled");
        }
    }

    fn set_phase(&mut self, phase: SlavePhase) {
        let previous = self.session.phase;
        self.session.phase = phase;
        if previous != phase {
            info!(from = ?previous, to = ?phase, "Phase change");
        }
        self.publish_phase();
    }

    fn publish_phase(&self) {
        self.phase_tx.send_replace(self.session.phase);
    }
}
