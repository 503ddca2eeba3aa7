//! Command message types broadcast from the master to every slave

use serde::{Deserialize, Serialize};

// ============================================================================
// Command
// ============================================================================

/// The fixed set of commands a master can issue.
///
/// Anything else on the wire decodes to [`Command::Unknown`] and is ignored
/// by slaves rather than rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Load,
    Prepare,
    PreparePlay,
    Play,
    Sync,
    Reset,
    Stop,
    #[serde(other)]
    Unknown,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Load => "load",
            Command::Prepare => "prepare",
            Command::PreparePlay => "prepare_play",
            Command::Play => "play",
            Command::Sync => "sync",
            Command::Reset => "reset",
            Command::Stop => "stop",
            Command::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Command-specific data. Fields a command does not use are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Payload {
    /// Absolute start instant, seconds since the Unix epoch in the sender's clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
}

// ============================================================================
// Envelope
// ============================================================================

/// One datagram's worth of protocol.
///
/// `epoch` is optional on the wire so that slaves can tell a missing epoch
/// apart from a malformed datagram and drop it through the acceptance path.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommandMessage {
    pub command: Command,
    #[serde(default)]
    pub epoch: Option<u64>,
    #[serde(default)]
    pub origin_id: String,
    #[serde(default)]
    pub payload: Payload,
}

impl CommandMessage {
    fn new(command: Command, origin_id: &str, epoch: u64, payload: Payload) -> Self {
        Self {
            command,
            epoch: Some(epoch),
            origin_id: origin_id.to_string(),
            payload,
        }
    }

    pub fn load(origin_id: &str, epoch: u64, video_path: &str) -> Self {
        Self::new(
            Command::Load,
            origin_id,
            epoch,
            Payload {
                video_path: Some(video_path.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn prepare(origin_id: &str, epoch: u64, video_path: &str) -> Self {
        Self::new(
            Command::Prepare,
            origin_id,
            epoch,
            Payload {
                video_path: Some(video_path.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn prepare_play(origin_id: &str, epoch: u64, sync_time: f64) -> Self {
        Self::new(
            Command::PreparePlay,
            origin_id,
            epoch,
            Payload {
                sync_time: Some(sync_time),
                ..Default::default()
            },
        )
    }

    pub fn play(origin_id: &str, epoch: u64) -> Self {
        Self::new(Command::Play, origin_id, epoch, Payload::default())
    }

    /// Heartbeat with no state payload
    pub fn sync(origin_id: &str, epoch: u64) -> Self {
        Self::new(Command::Sync, origin_id, epoch, Payload::default())
    }

    pub fn reset(origin_id: &str, epoch: u64) -> Self {
        Self::new(Command::Reset, origin_id, epoch, Payload::default())
    }

    pub fn stop(origin_id: &str, epoch: u64) -> Self {
        Self::new(Command::Stop, origin_id, epoch, Payload::default())
    }
}
