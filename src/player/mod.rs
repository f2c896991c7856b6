//! Ports for the embeddable video player.
//!
//! The tracker only sees [`VideoPlayer`] queries and typed [`PlayerEvent`]s.
//! Host-specific state codes are translated once, in [`PlayerState::from_host_code`].

pub mod bootstrap;
pub mod bridge;

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::VideoRef;

pub use bootstrap::PlayerApi;
pub use bridge::{BridgeMessage, BridgePlayerHost, PlaybackSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Playing,
    Paused,
    Ended,
}

impl PlayerState {
    /// Translate the embedded player's raw state code.
    ///
    /// Buffering (3) and cued (5) have no meaning for progress tracking and map to `None`.
    pub fn from_host_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(PlayerState::Unstarted),
            0 => Some(PlayerState::Ended),
            1 => Some(PlayerState::Playing),
            2 => Some(PlayerState::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    StateChange(PlayerState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error("player is not ready")]
    NotReady,
    #[error("player has been destroyed")]
    Destroyed,
    #[error("unknown player {0}")]
    UnknownPlayer(Uuid),
}

/// Playback telemetry queries. Times are in seconds.
pub trait VideoPlayer: Send + Sync {
    fn current_time(&self) -> Result<f64, PlayerError>;
    fn duration(&self) -> Result<f64, PlayerError>;
    /// Release the player; later queries fail with [`PlayerError::Destroyed`].
    fn destroy(&self);
}

/// Player construction parameters sent to the embedding page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerVars {
    pub autoplay: u8,
    pub controls: u8,
    pub modestbranding: u8,
    pub rel: u8,
    pub playsinline: u8,
}

impl Default for PlayerVars {
    fn default() -> Self {
        PlayerVars {
            autoplay: 0,
            controls: 1,
            modestbranding: 1,
            rel: 0,
            playsinline: 1,
        }
    }
}

/// A constructed player and the stream of its lifecycle events.
/// Dropping `events` detaches the listener.
pub struct PlayerBinding {
    pub id: Uuid,
    pub player: Arc<dyn VideoPlayer>,
    pub events: mpsc::UnboundedReceiver<PlayerEvent>,
}

#[async_trait::async_trait]
pub trait PlayerHost: Send + Sync {
    async fn create_player(
        &self,
        video: &VideoRef,
        vars: &PlayerVars,
    ) -> Result<PlayerBinding, PlayerError>;
}
