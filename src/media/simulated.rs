//! A stand-in engine that keeps time instead of decoding frames.
//!
//! Media must exist on disk; an empty file counts as corrupt. Playback runs
//! for the configured duration and then reports `Ended`.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{MediaError, MediaHandle, MediaPlayer, PlaybackState};

pub struct SimulatedPlayer {
    duration: Duration,
    media: Option<String>,
    position: Duration,
    readable: bool,
    resumed_at: Option<Instant>,
    standby_image: String,
    state: PlaybackState,
}

impl SimulatedPlayer {
    pub fn new(duration: Duration, standby_image: impl Into<String>) -> Self {
        Self {
            duration,
            media: None,
            position: Duration::ZERO,
            readable: false,
            resumed_at: None,
            standby_image: standby_image.into(),
            state: PlaybackState::Idle,
        }
    }

    /// Position including any time spent playing since the last resume.
    fn current_position(&self) -> Duration {
        let running = self.resumed_at.map(|t| t.elapsed()).unwrap_or_default();
        (self.position + running).min(self.duration)
    }

    fn freeze(&mut self) {
        self.position = self.current_position();
        self.resumed_at = None;
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn load_media(&mut self, path: &str) -> Result<MediaHandle, MediaError> {
        let meta = std::fs::metadata(Path::new(path))
            .map_err(|_| MediaError::NotFound(path.to_string()))?;

        debug!(path, "Engine: media bound");
        self.media = Some(path.to_string());
        self.readable = meta.len() > 0;
        self.position = Duration::ZERO;
        self.resumed_at = None;
        self.state = PlaybackState::Idle;
        Ok(MediaHandle {
            path: path.to_string(),
        })
    }

    fn play(&mut self) {
        if self.media.is_none() {
            return;
        }
        if self.state() == PlaybackState::Ended {
            self.position = Duration::ZERO;
            self.resumed_at = None;
        }
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
        self.state = PlaybackState::Playing;
        debug!(position_ms = self.position.as_millis() as u64, "Engine: play");
    }

    fn pause(&mut self) {
        if self.media.is_none() {
            return;
        }
        self.freeze();
        self.state = PlaybackState::Paused;
        debug!(position_ms = self.position.as_millis() as u64, "Engine: pause");
    }

    fn stop(&mut self) {
        self.position = Duration::ZERO;
        self.resumed_at = None;
        self.state = PlaybackState::Idle;
        debug!("Engine: stop");
    }

    fn seek(&mut self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0) as f64;
        self.position = self.duration.mul_f64(fraction);
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn state(&self) -> PlaybackState {
        if self.state == PlaybackState::Playing && self.current_position() >= self.duration {
            return PlaybackState::Ended;
        }
        self.state
    }

    fn duration(&self) -> Option<Duration> {
        match (&self.media, self.readable) {
            (Some(_), true) => Some(self.duration),
            _ => None,
        }
    }

    fn display_standby(&mut self) {
        debug!(image = %self.standby_image, "Engine: standby display");
        self.media = None;
        self.readable = false;
        self.position = Duration::ZERO;
        self.resumed_at = None;
        self.state = PlaybackState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn media_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_missing_media_is_not_found() {
        let mut player = SimulatedPlayer::new(Duration::from_secs(1), "black.png");
        assert!(matches!(
            player.load_media("/definitely/not/here.mp4"),
            Err(MediaError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_media_has_no_duration() {
        let file = media_file(b"");
        let mut player = SimulatedPlayer::new(Duration::from_secs(1), "black.png");
        player.load_media(file.path().to_str().unwrap()).unwrap();
        assert_eq!(player.duration(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_ended_after_duration() {
        let file = media_file(b"frames");
        let mut player = SimulatedPlayer::new(Duration::from_secs(2), "black.png");
        player.load_media(file.path().to_str().unwrap()).unwrap();

        player.play();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(player.state(), PlaybackState::Playing);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(player.state(), PlaybackState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_position() {
        let file = media_file(b"frames");
        let mut player = SimulatedPlayer::new(Duration::from_secs(2), "black.png");
        player.load_media(file.path().to_str().unwrap()).unwrap();

        player.play();
        tokio::time::advance(Duration::from_millis(1500)).await;
        player.pause();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(player.state(), PlaybackState::Paused);

        player.seek(0.0);
        player.play();
        tokio::time::advance(Duration::from_millis(1900)).await;
        assert_eq!(player.state(), PlaybackState::Playing);
    }
}
