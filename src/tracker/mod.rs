//! Keeps an assignment's server-side progress in step with video playback.
//!
//! One [`PlaybackProgressTracker`] exists per mounted course view. It owns the
//! player, a single polling timer and the event listener task; [`detach`]
//! releases all three. Syncs run on their own tasks, one at a time per session;
//! a percent that becomes eligible while a sync is in flight waits in a
//! single-slot queue where newer values replace older ones.
//!
//! [`detach`]: PlaybackProgressTracker::detach

pub mod policy;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    domain::{Assignment, AssignmentId, CourseId, ProgressUpdate, VideoRef},
    player::{PlayerError, PlayerEvent, PlayerHost, PlayerState, PlayerVars, VideoPlayer},
    storage::AssignmentStore,
};
use policy::{ThrottlePolicy, compute_percent};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub poll_interval: Duration,
    pub policy: ThrottlePolicy,
    pub player_vars: PlayerVars,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        TrackerSettings {
            poll_interval: DEFAULT_POLL_INTERVAL,
            policy: ThrottlePolicy::default(),
            player_vars: PlayerVars::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Below the delta threshold
    Throttled,
    /// Another sync is in flight; this percent waits in the queue
    Queued,
    Synced(u8),
    /// Transport or server error; retried implicitly by a later poll
    Failed,
    Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The player could not answer (not ready yet, or gone)
    PlayerUnavailable,
    /// Duration not known yet
    NoDuration,
    Sampled { percent: u8, sync: SyncOutcome },
    Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub player_id: Uuid,
    pub assignment: Assignment,
    pub last_reported_percent: u8,
    pub current_percent: u8,
    pub player_state: PlayerState,
    pub polling: bool,
    pub sync_in_flight: bool,
}

struct PlaybackSession {
    assignment: Assignment,
    last_reported_percent: u8,
    current_percent: u8,
    player_state: PlayerState,
    sync_in_flight: bool,
    queued_percent: Option<u8>,
}

struct Inner {
    player_id: Uuid,
    assignment_id: AssignmentId,
    course_id: CourseId,
    settings: TrackerSettings,
    store: Arc<dyn AssignmentStore>,
    player: Arc<dyn VideoPlayer>,
    session: Mutex<PlaybackSession>,
    cancel: CancellationToken,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct PlaybackProgressTracker {
    inner: Arc<Inner>,
}

impl PlaybackProgressTracker {
    /// Construct the player bound to `video` and start listening to its events.
    /// Polling begins once the player reports ready.
    #[tracing::instrument(level = "debug", skip(host, store, assignment, settings), fields(assignment_id = assignment.id))]
    pub async fn attach(
        host: &dyn PlayerHost,
        store: Arc<dyn AssignmentStore>,
        video: &VideoRef,
        assignment: Assignment,
        settings: TrackerSettings,
    ) -> Result<Self, PlayerError> {
        let binding = host.create_player(video, &settings.player_vars).await?;
        let seed = assignment.progress_percent.min(policy::COMPLETE);

        let inner = Arc::new(Inner {
            player_id: binding.id,
            assignment_id: assignment.id,
            course_id: assignment.course_id,
            settings,
            store,
            player: binding.player,
            session: Mutex::new(PlaybackSession {
                assignment,
                last_reported_percent: seed,
                current_percent: seed,
                player_state: PlayerState::Unstarted,
                sync_in_flight: false,
                queued_percent: None,
            }),
            cancel: CancellationToken::new(),
            poll_task: Mutex::new(None),
            event_task: Mutex::new(None),
        });

        let listener = tokio::spawn(run_events(
            Arc::downgrade(&inner),
            binding.events,
            inner.cancel.clone(),
        ));
        *lock(&inner.event_task) = Some(listener);

        tracing::info!(
            player_id = %inner.player_id,
            course_id = inner.course_id,
            video_id = %video.id,
            seed,
            "progress tracker attached"
        );
        Ok(PlaybackProgressTracker { inner })
    }

    pub fn player_id(&self) -> Uuid {
        self.inner.player_id
    }

    pub fn course_id(&self) -> CourseId {
        self.inner.course_id
    }

    pub fn is_detached(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poll_task)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let polling = self.is_polling();
        let s = lock(&self.inner.session);
        SessionSnapshot {
            player_id: self.inner.player_id,
            assignment: s.assignment.clone(),
            last_reported_percent: s.last_reported_percent,
            current_percent: s.current_percent,
            player_state: s.player_state,
            polling,
            sync_in_flight: s.sync_in_flight,
        }
    }

    /// Start the polling timer unless one is already running. Returns whether a
    /// timer was started.
    pub fn ensure_polling(&self) -> bool {
        if self.is_detached() {
            return false;
        }
        let mut slot = lock(&self.inner.poll_task);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let period = self.inner.settings.poll_interval;
        *slot = Some(tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            period,
            self.inner.cancel.clone(),
        )));
        tracing::debug!(player_id = %self.inner.player_id, ?period, "polling started");
        true
    }

    /// Sample the player and push the percent if the throttle rule allows it.
    #[tracing::instrument(level = "debug", skip(self), fields(player_id = %self.inner.player_id))]
    pub async fn poll(&self) -> PollOutcome {
        if self.is_detached() {
            return PollOutcome::Detached;
        }
        let player = &self.inner.player;
        let sample = player
            .current_time()
            .and_then(|ct| Ok((ct, player.duration()?)));
        let (current_time, duration) = match sample {
            Ok(sample) => sample,
            Err(e) => {
                tracing::debug!(error = %e, "skipping poll");
                return PollOutcome::PlayerUnavailable;
            }
        };
        let Some(percent) = compute_percent(current_time, duration) else {
            return PollOutcome::NoDuration;
        };

        {
            let mut s = lock(&self.inner.session);
            if self.inner.cancel.is_cancelled() {
                return PollOutcome::Detached;
            }
            s.current_percent = percent;
        }
        let sync = self.try_sync(percent).await;
        PollOutcome::Sampled { percent, sync }
    }

    /// Push `percent` to the server if it passes the throttle rule.
    pub async fn try_sync(&self, percent: u8) -> SyncOutcome {
        let percent = percent.min(policy::COMPLETE);
        {
            let mut s = lock(&self.inner.session);
            if self.is_detached() {
                return SyncOutcome::Detached;
            }
            // The queued value is checked against the acknowledged one when it is dequeued.
            if s.sync_in_flight {
                s.queued_percent = Some(percent);
                return SyncOutcome::Queued;
            }
            if !self
                .inner
                .settings
                .policy
                .should_sync(s.last_reported_percent, percent)
            {
                return SyncOutcome::Throttled;
            }
            s.sync_in_flight = true;
        }

        // The sync outlives a dropped caller; only detach abandons it.
        match tokio::spawn(self.clone().drive_sync(percent)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "sync task failed");
                lock(&self.inner.session).sync_in_flight = false;
                SyncOutcome::Failed
            }
        }
    }

    async fn drive_sync(self, first: u8) -> SyncOutcome {
        let inner = &self.inner;
        let mut percent = first;
        loop {
            let update = ProgressUpdate::for_percent(percent);
            let result = tokio::select! {
                _ = inner.cancel.cancelled() => return SyncOutcome::Detached,
                r = inner.store.update_progress(inner.assignment_id, update) => r,
            };

            let (outcome, next) = {
                let mut s = lock(&inner.session);
                if inner.cancel.is_cancelled() {
                    return SyncOutcome::Detached;
                }
                let outcome = match result {
                    Ok(assignment) => {
                        tracing::info!(
                            assignment_id = inner.assignment_id,
                            percent,
                            status = %assignment.status,
                            "progress synced"
                        );
                        s.last_reported_percent = percent;
                        s.assignment = assignment;
                        SyncOutcome::Synced(percent)
                    }
                    Err(e) => {
                        let error = format!("{e:#}");
                        tracing::warn!(
                            assignment_id = inner.assignment_id,
                            percent,
                            %error,
                            "progress sync failed"
                        );
                        SyncOutcome::Failed
                    }
                };
                let next = s
                    .queued_percent
                    .take()
                    .filter(|&q| inner.settings.policy.should_sync(s.last_reported_percent, q));
                if next.is_none() {
                    s.sync_in_flight = false;
                }
                (outcome, next)
            };

            match next {
                Some(q) => percent = q,
                None => return outcome,
            }
        }
    }

    /// Apply a player lifecycle event. Returns whether an immediate poll is due.
    pub fn apply_event(&self, event: PlayerEvent) -> bool {
        if self.is_detached() {
            return false;
        }
        match event {
            PlayerEvent::Ready => {
                self.ensure_polling();
                false
            }
            PlayerEvent::StateChange(next) => {
                let prev = std::mem::replace(&mut lock(&self.inner.session).player_state, next);
                tracing::debug!(player_id = %self.inner.player_id, ?prev, ?next, "player state changed");
                match next {
                    PlayerState::Playing => {
                        self.ensure_polling();
                        false
                    }
                    PlayerState::Paused | PlayerState::Ended => prev != next,
                    PlayerState::Unstarted => false,
                }
            }
        }
    }

    /// Apply an event and run the poll it calls for, if any.
    #[cfg(test)]
    pub async fn on_player_event(&self, event: PlayerEvent) -> Option<PollOutcome> {
        if self.apply_event(event) {
            Some(self.poll().await)
        } else {
            None
        }
    }

    /// Stop the timer, drop the event listener and release the player.
    /// In-flight syncs are abandoned; nothing is mutated afterwards.
    pub fn detach(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        if let Some(h) = lock(&self.inner.poll_task).take() {
            h.abort();
        }
        if let Some(h) = lock(&self.inner.event_task).take() {
            h.abort();
        }
        self.inner.player.destroy();
        tracing::info!(
            player_id = %self.inner.player_id,
            course_id = self.inner.course_id,
            "progress tracker detached"
        );
    }
}

async fn run_timer(inner: Weak<Inner>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let tracker = PlaybackProgressTracker { inner };
                // A slow sync must not hold up the next tick.
                tokio::spawn(async move {
                    tracker.poll().await;
                });
            }
        }
    }
}

async fn run_events(
    inner: Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<PlayerEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else { break };
        let tracker = PlaybackProgressTracker { inner };
        if tracker.apply_event(event) {
            tokio::spawn(async move {
                tracker.poll().await;
            });
        }
    }
}

#[cfg(test)]
mod tests;
