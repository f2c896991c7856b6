//! Player host for a player embedded in a web page.
//!
//! The page forwards the player's ready/state events and playback telemetry over
//! HTTP; [`BridgePlayerHost::dispatch`] records the telemetry first and then
//! forwards the typed event, so a poll triggered by a pause reads the position
//! at the pause instant.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    PlayerBinding, PlayerError, PlayerEvent, PlayerHost, PlayerState, PlayerVars, VideoPlayer,
};
use crate::domain::VideoRef;

/// Raw message from the embedding page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMessage {
    Ready,
    /// Host state code as reported by the page
    State(i32),
    Telemetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackSample {
    pub current_time: Option<f64>,
    pub duration: Option<f64>,
}

#[derive(Debug, Default)]
struct Telemetry {
    ready: bool,
    destroyed: bool,
    current_time: Option<f64>,
    duration: Option<f64>,
}

struct Endpoint {
    telemetry: Arc<Mutex<Telemetry>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

type Endpoints = Arc<Mutex<HashMap<Uuid, Endpoint>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct BridgePlayerHost {
    endpoints: Endpoints,
}

impl BridgePlayerHost {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn player_count(&self) -> usize {
        lock(&self.endpoints).len()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn dispatch(
        &self,
        player_id: Uuid,
        message: BridgeMessage,
        sample: PlaybackSample,
    ) -> Result<(), PlayerError> {
        let endpoints = lock(&self.endpoints);
        let endpoint = endpoints
            .get(&player_id)
            .ok_or(PlayerError::UnknownPlayer(player_id))?;

        {
            let mut t = lock(&endpoint.telemetry);
            if let Some(ct) = sample.current_time.filter(|v| v.is_finite()) {
                t.current_time = Some(ct);
            }
            if let Some(d) = sample.duration.filter(|v| v.is_finite()) {
                t.duration = Some(d);
            }
            if message == BridgeMessage::Ready {
                t.ready = true;
            }
        }

        let event = match message {
            BridgeMessage::Ready => Some(PlayerEvent::Ready),
            BridgeMessage::State(code) => match PlayerState::from_host_code(code) {
                Some(state) => Some(PlayerEvent::StateChange(state)),
                None => {
                    tracing::debug!(%player_id, code, "ignoring player state code");
                    None
                }
            },
            BridgeMessage::Telemetry => None,
        };

        if let Some(event) = event {
            if endpoint.events.send(event).is_err() {
                tracing::debug!(%player_id, ?event, "player listener already detached");
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PlayerHost for BridgePlayerHost {
    async fn create_player(
        &self,
        video: &VideoRef,
        vars: &PlayerVars,
    ) -> Result<PlayerBinding, PlayerError> {
        let id = Uuid::new_v4();
        let telemetry = Arc::new(Mutex::new(Telemetry::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.endpoints).insert(
            id,
            Endpoint {
                telemetry: telemetry.clone(),
                events: tx,
            },
        );
        tracing::debug!(player_id = %id, video_id = %video.id, ?vars, "bridge player created");

        let player = BridgePlayer {
            id,
            telemetry,
            endpoints: self.endpoints.clone(),
        };
        Ok(PlayerBinding {
            id,
            player: Arc::new(player),
            events: rx,
        })
    }
}

struct BridgePlayer {
    id: Uuid,
    telemetry: Arc<Mutex<Telemetry>>,
    endpoints: Endpoints,
}

impl BridgePlayer {
    fn read(&self, field: impl Fn(&Telemetry) -> Option<f64>) -> Result<f64, PlayerError> {
        let t = lock(&self.telemetry);
        if t.destroyed {
            return Err(PlayerError::Destroyed);
        }
        if !t.ready {
            return Err(PlayerError::NotReady);
        }
        field(&t).ok_or(PlayerError::NotReady)
    }
}

impl VideoPlayer for BridgePlayer {
    fn current_time(&self) -> Result<f64, PlayerError> {
        self.read(|t| t.current_time)
    }

    fn duration(&self) -> Result<f64, PlayerError> {
        self.read(|t| t.duration)
    }

    fn destroy(&self) {
        lock(&self.telemetry).destroyed = true;
        if lock(&self.endpoints).remove(&self.id).is_some() {
            tracing::debug!(player_id = %self.id, "bridge player destroyed");
        }
    }
}
