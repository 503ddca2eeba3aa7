use chrono::Utc;

/// Playback phase of the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterPhase {
    Idle,
    Preparing,
    AwaitingSync,
    Playing,
    Resetting,
}

/// In-memory state for one run of the master process
#[derive(Debug)]
pub struct MasterSession {
    /// Fixed for the lifetime of the process
    pub epoch: u64,
    pub media_path: String,
    pub phase: MasterPhase,
}

impl MasterSession {
    pub fn new(media_path: impl Into<String>) -> Self {
        Self::with_epoch(new_epoch(), media_path)
    }

    pub fn with_epoch(epoch: u64, media_path: impl Into<String>) -> Self {
        Self {
            epoch,
            media_path: media_path.into(),
            phase: MasterPhase::Idle,
        }
    }
}

/// Epoch for a new master incarnation: milliseconds since the Unix epoch.
///
/// Restarts produce a larger epoch as long as the host clock does not step
/// backwards between runs.
pub fn new_epoch() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
