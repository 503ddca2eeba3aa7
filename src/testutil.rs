//! Shared test helpers for the `#[cfg(test)]` modules in this crate.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{BroadcastConfig, Config, MediaConfig, NetworkConfig, Role, TimingConfig};
use crate::media::{MediaError, MediaHandle, MediaPlayer, PlaybackState};

pub const TEST_MASTER: &str = "192.168.1.10";

/// A minimal slave `Config` suitable for unit tests.
pub fn test_config() -> Config {
    Config {
        broadcast: BroadcastConfig::default(),
        media: MediaConfig {
            video_path: "/media/a.mp4".to_string(),
            ..Default::default()
        },
        network: NetworkConfig {
            master_id: TEST_MASTER.to_string(),
            ..Default::default()
        },
        role: Role::Slave,
        timing: TimingConfig::default(),
    }
}

/// One call made against a [`RecordingPlayer`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Load(String),
    Play,
    Pause,
    Stop,
    Seek(f32),
    Standby,
}

/// Handle onto a player's call log that outlives moving the player.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<PlayerCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &PlayerCall) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: PlayerCall) {
        self.0.lock().unwrap().push(call);
    }
}

/// A `MediaPlayer` that records every call and fakes engine state.
///
/// Loaded media plays for `ends_after` (if set) and then reports `Ended`.
pub struct RecordingPlayer {
    bound: Option<String>,
    corrupt: HashSet<String>,
    ends_after: Option<Duration>,
    log: CallLog,
    missing: HashSet<String>,
    started_at: Option<Instant>,
    state: PlaybackState,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self {
            bound: None,
            corrupt: HashSet::new(),
            ends_after: None,
            log: CallLog::default(),
            missing: HashSet::new(),
            started_at: None,
            state: PlaybackState::Idle,
        }
    }

    pub fn with_corrupt(mut self, path: &str) -> Self {
        self.corrupt.insert(path.to_string());
        self
    }

    pub fn with_missing(mut self, path: &str) -> Self {
        self.missing.insert(path.to_string());
        self
    }

    pub fn ending_after(mut self, duration: Duration) -> Self {
        self.ends_after = Some(duration);
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.log.calls()
    }
}

impl MediaPlayer for RecordingPlayer {
    fn load_media(&mut self, path: &str) -> Result<MediaHandle, MediaError> {
        self.log.push(PlayerCall::Load(path.to_string()));
        if self.missing.contains(path) {
            return Err(MediaError::NotFound(path.to_string()));
        }
        self.bound = Some(path.to_string());
        self.started_at = None;
        self.state = PlaybackState::Idle;
        Ok(MediaHandle {
            path: path.to_string(),
        })
    }

    fn play(&mut self) {
        self.log.push(PlayerCall::Play);
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.state = PlaybackState::Playing;
    }

    fn pause(&mut self) {
        self.log.push(PlayerCall::Pause);
        self.started_at = None;
        self.state = PlaybackState::Paused;
    }

    fn stop(&mut self) {
        self.log.push(PlayerCall::Stop);
        self.started_at = None;
        self.state = PlaybackState::Idle;
    }

    fn seek(&mut self, fraction: f32) {
        self.log.push(PlayerCall::Seek(fraction));
    }

    fn state(&self) -> PlaybackState {
        match (self.state, self.started_at, self.ends_after) {
            (PlaybackState::Playing, Some(started), Some(limit)) if started.elapsed() >= limit => {
                PlaybackState::Ended
            }
            (state, _, _) => state,
        }
    }

    fn duration(&self) -> Option<Duration> {
        match &self.bound {
            Some(path) if !self.corrupt.contains(path) => Some(Duration::from_secs(60)),
            _ => None,
        }
    }

    fn display_standby(&mut self) {
        self.log.push(PlayerCall::Standby);
        self.bound = None;
        self.started_at = None;
        self.state = PlaybackState::Idle;
    }
}
