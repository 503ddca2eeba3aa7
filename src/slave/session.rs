//! Per-slave session record and the message acceptance protocol

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::CommandMessage;

/// Playback phase of a slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlavePhase {
    /// Showing the standby placeholder, no active session
    Standby,
    /// Media bound, not pre-rolled
    Loaded,
    /// Pre-rolled to the first frame and paused
    Prepared,
    Playing,
}

/// Why a message was dropped before reaching the state machine.
///
/// None of these are errors: foreign and stale traffic is expected on a
/// shared network and during master failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ForeignOrigin,
    MissingEpoch,
    StaleEpoch { received: u64, seen: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Same epoch as the current session
    Accepted,
    /// First message of a new master incarnation (or the first after a
    /// watchdog trip cleared tracking)
    NewSession { previous: Option<u64>, epoch: u64 },
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verdict::Rejected(_))
    }
}

/// In-memory session state, owned by the slave's worker task.
#[derive(Debug)]
pub struct SlaveSession {
    /// Last media reference named by the master; survives standby so that a
    /// `reset` can rebind it
    pub canonical_media: Option<String>,
    pub last_epoch_seen: Option<u64>,
    pub last_heartbeat_at: Instant,
    /// What the engine currently has bound; cleared whenever standby replaces it
    pub loaded_media: Option<String>,
    pub phase: SlavePhase,
}

impl SlaveSession {
    pub fn new(now: Instant) -> Self {
        Self {
            canonical_media: None,
            last_epoch_seen: None,
            last_heartbeat_at: now,
            loaded_media: None,
            phase: SlavePhase::Standby,
        }
    }

    /// Validate `message` against the configured master identity and the
    /// epoch fence. Accepted messages count as a heartbeat.
    pub fn accept(&mut self, message: &CommandMessage, master_id: &str, now: Instant) -> Verdict {
        if message.origin_id != master_id {
            return Verdict::Rejected(Rejection::ForeignOrigin);
        }

        let Some(epoch) = message.epoch else {
            return Verdict::Rejected(Rejection::MissingEpoch);
        };

        let verdict = match self.last_epoch_seen {
            None => Verdict::NewSession {
                previous: None,
                epoch,
            },
            Some(seen) if epoch > seen => Verdict::NewSession {
                previous: Some(seen),
                epoch,
            },
            Some(seen) if epoch < seen => {
                return Verdict::Rejected(Rejection::StaleEpoch {
                    received: epoch,
                    seen,
                })
            }
            Some(_) => Verdict::Accepted,
        };

        self.last_epoch_seen = Some(epoch);
        self.last_heartbeat_at = now;
        verdict
    }

    /// True when the master has been silent for longer than `timeout` and
    /// the slave is not already in standby.
    pub fn watchdog_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.phase != SlavePhase::Standby
            && now.saturating_duration_since(self.last_heartbeat_at) > timeout
    }

    /// Enter standby after a watchdog trip: restart the silence window and
    /// forget the epoch so the next matching-origin message starts a session.
    pub fn reset_after_watchdog(&mut self, now: Instant) {
        self.phase = SlavePhase::Standby;
        self.loaded_media = None;
        self.last_heartbeat_at = now;
        self.last_epoch_seen = None;
    }
}
