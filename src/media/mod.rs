//! Media playback engine capability
//!
//! The decoder/renderer is an external collaborator. Master and slave only
//! talk to it through [`MediaPlayer`], which is small enough to back with a
//! real engine, the [`SimulatedPlayer`] used by the binary, or a recording
//! double in tests.

mod simulated;

pub use simulated::SimulatedPlayer;

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media not found: {0}")]
    NotFound(String),
    #[error("Media is corrupt or unreadable: {0}")]
    Corrupt(String),
    #[error("Playback engine error: {0}")]
    Engine(String),
}

/// State reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Ended,
    Error,
}

/// Opaque reference to media bound into the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub path: String,
}

pub trait MediaPlayer: Send + 'static {
    /// Bind `path` as the current media. Replaces whatever was bound before,
    /// including the standby image.
    fn load_media(&mut self, path: &str) -> Result<MediaHandle, MediaError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    /// Seek to `fraction` of the media length, `0.0..=1.0`.
    fn seek(&mut self, fraction: f32);
    fn state(&self) -> PlaybackState;
    /// Length of the bound media. `None` means the engine could not read it.
    fn duration(&self) -> Option<Duration>;
    /// Show the safe placeholder instead of any media.
    fn display_standby(&mut self);
}

/// Force the decoder to buffer the first frame without visibly playing:
/// play briefly, pause, rewind.
///
/// Fails with `MediaError::Corrupt` if the engine cannot report a duration
/// for the bound media afterwards.
pub async fn preroll<P: MediaPlayer + ?Sized>(
    player: &mut P,
    path: &str,
    play_for: Duration,
) -> Result<(), MediaError> {
    player.play();
    tokio::time::sleep(play_for).await;
    player.pause();
    player.seek(0.0);

    match player.duration() {
        Some(d) if !d.is_zero() => Ok(()),
        _ => Err(MediaError::Corrupt(path.to_string())),
    }
}
