//! Mounted course views and their trackers.
//!
//! Mounting is reentrant: any mount for a course detaches the view that was
//! previously mounted for it, so a course never has two live timers. Views
//! the page stops talking to are reaped after the idle timeout.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    domain::{Assignment, CourseId, VideoRef},
    player::{BridgeMessage, BridgePlayerHost, PlaybackSample, PlayerApi, PlayerError},
    storage::AssignmentStore,
    tracker::{PlaybackProgressTracker, TrackerSettings},
};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub enum MountOutcome {
    Tracking {
        tracker: PlaybackProgressTracker,
        video: VideoRef,
    },
    /// The learner has no assignment for this course yet
    StartCourse,
    /// The video cannot be tracked; show it as a plain embed
    PassiveEmbed {
        embed_url: Option<String>,
        assignment: Assignment,
    },
}

struct View {
    tracker: PlaybackProgressTracker,
    last_seen: Instant,
}

#[derive(Default)]
struct Views {
    by_id: HashMap<Uuid, View>,
    by_course: HashMap<CourseId, Uuid>,
}

impl Views {
    fn remove(&mut self, view_id: Uuid) -> Option<PlaybackProgressTracker> {
        let view = self.by_id.remove(&view_id)?;
        let course_id = view.tracker.course_id();
        if self.by_course.get(&course_id) == Some(&view_id) {
            self.by_course.remove(&course_id);
        }
        Some(view.tracker)
    }

    fn remove_course(&mut self, course_id: CourseId) -> Option<PlaybackProgressTracker> {
        let view_id = self.by_course.get(&course_id).copied()?;
        self.remove(view_id)
    }
}

pub struct CourseViewRegistry {
    store: Arc<dyn AssignmentStore>,
    player_api: PlayerApi<BridgePlayerHost>,
    settings: TrackerSettings,
    idle_timeout: Duration,
    views: Mutex<Views>,
}

impl CourseViewRegistry {
    pub fn new(
        store: Arc<dyn AssignmentStore>,
        player_api: PlayerApi<BridgePlayerHost>,
        settings: TrackerSettings,
    ) -> Self {
        CourseViewRegistry {
            store,
            player_api,
            settings,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            views: Mutex::new(Views::default()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn AssignmentStore> {
        &self.store
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    async fn release_course(&self, course_id: CourseId) {
        let previous = self.views.lock().await.remove_course(course_id);
        if let Some(old) = previous {
            tracing::debug!(course_id, view_id = %old.player_id(), "replacing mounted view");
            old.detach();
        }
    }

    /// Mount the course view for `course_id`. `video_url` falls back to the
    /// course's own video when the assignment carries it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn mount(
        &self,
        course_id: CourseId,
        video_url: Option<&str>,
    ) -> anyhow::Result<MountOutcome> {
        self.release_course(course_id).await;

        let Some(assignment) = self.store.assignment_for_course(course_id).await? else {
            tracing::info!(course_id, "no assignment for course; offering start");
            return Ok(MountOutcome::StartCourse);
        };

        let video_url = video_url
            .filter(|u| !u.trim().is_empty())
            .map(str::to_string)
            .or_else(|| assignment.video_url.clone());
        let Some(video) = video_url.as_deref().and_then(VideoRef::resolve) else {
            tracing::info!(course_id, video_url = ?video_url, "video not trackable; passive embed");
            return Ok(MountOutcome::PassiveEmbed {
                embed_url: video_url,
                assignment,
            });
        };

        let host = self.player_api.ready().await?;
        let tracker = match PlaybackProgressTracker::attach(
            host.as_ref(),
            self.store.clone(),
            &video,
            assignment.clone(),
            self.settings,
        )
        .await
        {
            Ok(tracker) => tracker,
            Err(e) => {
                tracing::warn!(course_id, error = %e, "player construction failed; passive embed");
                return Ok(MountOutcome::PassiveEmbed {
                    embed_url: Some(video.embed_url()),
                    assignment,
                });
            }
        };

        let view_id = tracker.player_id();
        let mut views = self.views.lock().await;
        // A concurrent mount of the same course may have finished first.
        if let Some(old) = views.remove_course(course_id) {
            old.detach();
        }
        views.by_id.insert(
            view_id,
            View {
                tracker: tracker.clone(),
                last_seen: Instant::now(),
            },
        );
        views.by_course.insert(course_id, view_id);
        Ok(MountOutcome::Tracking { tracker, video })
    }

    pub async fn get(&self, view_id: Uuid) -> Option<PlaybackProgressTracker> {
        self.views
            .lock()
            .await
            .by_id
            .get(&view_id)
            .map(|v| v.tracker.clone())
    }

    /// Detach and forget a view. Returns `false` for unknown views.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn unmount(&self, view_id: Uuid) -> bool {
        let removed = self.views.lock().await.remove(view_id);
        match removed {
            Some(tracker) => {
                tracker.detach();
                true
            }
            None => false,
        }
    }

    /// Forward a raw player message from the page to the view's player.
    pub async fn dispatch(
        &self,
        view_id: Uuid,
        message: BridgeMessage,
        sample: PlaybackSample,
    ) -> Result<(), PlayerError> {
        let tracker = {
            let mut views = self.views.lock().await;
            let view = views
                .by_id
                .get_mut(&view_id)
                .ok_or(PlayerError::UnknownPlayer(view_id))?;
            view.last_seen = Instant::now();
            view.tracker.clone()
        };
        let host = self
            .player_api
            .get()
            .ok_or(PlayerError::UnknownPlayer(view_id))?;
        host.dispatch(tracker.player_id(), message, sample)
    }

    /// Unmount every view that has not heard from its page within the idle
    /// timeout. Returns how many were removed.
    pub async fn reap_idle(&self) -> usize {
        let stale: Vec<PlaybackProgressTracker> = {
            let mut views = self.views.lock().await;
            let ids: Vec<Uuid> = views
                .by_id
                .iter()
                .filter(|(_, v)| v.last_seen.elapsed() >= self.idle_timeout)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| views.remove(id)).collect()
        };
        for tracker in &stale {
            tracing::info!(
                view_id = %tracker.player_id(),
                course_id = tracker.course_id(),
                "reaping idle course view"
            );
            tracker.detach();
        }
        stale.len()
    }

    /// Periodically reap idle views until `cancel` fires.
    pub async fn run_reaper(self: Arc<Self>, cancel: CancellationToken) {
        let period = (self.idle_timeout / 2).max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.reap_idle().await;
                }
            }
        }
    }

    /// Self-assign the course. Returns the existing assignment if there is one,
    /// with `false` as the second element.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn start_course(&self, course_id: CourseId) -> anyhow::Result<(Assignment, bool)> {
        if let Some(existing) = self.store.assignment_for_course(course_id).await? {
            return Ok((existing, false));
        }
        let created = self.store.create_assignment(course_id, None).await?;
        tracing::info!(course_id, assignment_id = created.id, "course started");
        Ok((created, true))
    }

    pub async fn active_count(&self) -> usize {
        self.views.lock().await.by_id.len()
    }

    /// Detach every mounted view.
    pub async fn shutdown(&self) {
        let mut views = self.views.lock().await;
        views.by_course.clear();
        for (_, view) in views.by_id.drain() {
            view.tracker.detach();
        }
    }
}
