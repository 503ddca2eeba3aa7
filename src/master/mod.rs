//! Master role: owns the authoritative timeline and drives every slave

mod coordinator;
mod session;

pub use coordinator::{MasterCoordinator, MasterSettings};
pub use session::{new_epoch, MasterPhase, MasterSession};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::channel::{self, CommandChannel, TransportError};
use crate::config::Config;
use crate::media::{MediaError, MediaPlayer};

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Open the broadcast channel from configuration and run the master until
/// `shutdown` or a fatal media failure.
pub async fn run_master<P: MediaPlayer>(
    config: &Config,
    player: P,
    shutdown: CancellationToken,
) -> Result<(), MasterError> {
    let target = channel::resolve(&config.network.broadcast_address, config.network.port).await?;
    let channel = CommandChannel::open(target, config.broadcast.policy()).await?;

    MasterCoordinator::new(MasterSettings::from(config), player, channel, shutdown)
        .run()
        .await
}
