use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::Semaphore;

use super::*;
use crate::domain::AssignmentStatus;

fn assignment(percent: u8) -> Assignment {
    Assignment {
        id: 11,
        course_id: 4,
        user_id: 2,
        status: AssignmentStatus::from_percent(percent),
        progress_percent: percent,
        last_activity_at: None,
        course_title: Some("Fire Safety".into()),
        video_url: Some("https://youtu.be/dQw4w9WgXcQ".into()),
        user_name: None,
        assigned_by: None,
        assigned_by_name: None,
        assigned_at: None,
        completed_at: None,
    }
}

/// Server fake: records patches, optionally fails or holds each request until
/// a permit is added to `gate`.
#[derive(Default)]
struct FakeStore {
    calls: Mutex<Vec<u8>>,
    fail: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    seen: Option<mpsc::UnboundedSender<u8>>,
}

impl FakeStore {
    fn calls(&self) -> Vec<u8> {
        lock(&self.calls).clone()
    }
}

#[async_trait::async_trait]
impl AssignmentStore for FakeStore {
    async fn my_assignments(&self) -> anyhow::Result<Vec<Assignment>> {
        Ok(vec![])
    }

    async fn create_assignment(
        &self,
        course_id: CourseId,
        _user_id: Option<crate::domain::UserId>,
    ) -> anyhow::Result<Assignment> {
        Ok(Assignment {
            course_id,
            ..assignment(0)
        })
    }

    async fn update_progress(
        &self,
        assignment_id: AssignmentId,
        update: ProgressUpdate,
    ) -> anyhow::Result<Assignment> {
        lock(&self.calls).push(update.progress_percent);
        if let Some(seen) = &self.seen {
            let _ = seen.send(update.progress_percent);
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("502 Bad Gateway");
        }
        let mut updated = assignment(update.progress_percent);
        updated.id = assignment_id;
        updated.last_activity_at = Some(Utc::now());
        if update.progress_percent == 100 {
            updated.completed_at = Some(Utc::now());
        }
        Ok(updated)
    }
}

type Hook = Box<dyn FnOnce() + Send>;

struct ScriptedPlayer {
    sample: Mutex<Result<(f64, f64), PlayerError>>,
    destroyed: AtomicBool,
    /// Runs once, after the duration has been read and before it is returned.
    after_duration: Mutex<Option<Hook>>,
}

impl ScriptedPlayer {
    fn set(&self, current_time: f64, duration: f64) {
        *lock(&self.sample) = Ok((current_time, duration));
    }
}

impl VideoPlayer for ScriptedPlayer {
    fn current_time(&self) -> Result<f64, PlayerError> {
        lock(&self.sample).clone().map(|(ct, _)| ct)
    }

    fn duration(&self) -> Result<f64, PlayerError> {
        let duration = lock(&self.sample).clone().map(|(_, d)| d);
        let hook = lock(&self.after_duration).take();
        if let Some(hook) = hook {
            hook();
        }
        duration
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        *lock(&self.sample) = Err(PlayerError::Destroyed);
    }
}

#[derive(Default)]
struct ScriptedHost {
    created: AtomicUsize,
    players: Mutex<Vec<Arc<ScriptedPlayer>>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<PlayerEvent>>>,
}

impl ScriptedHost {
    fn last_player(&self) -> Arc<ScriptedPlayer> {
        lock(&self.players).last().cloned().unwrap()
    }

    fn last_sender(&self) -> mpsc::UnboundedSender<PlayerEvent> {
        lock(&self.senders).last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl PlayerHost for ScriptedHost {
    async fn create_player(
        &self,
        _video: &VideoRef,
        _vars: &PlayerVars,
    ) -> Result<crate::player::PlayerBinding, PlayerError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let player = Arc::new(ScriptedPlayer {
            sample: Mutex::new(Err(PlayerError::NotReady)),
            destroyed: AtomicBool::new(false),
            after_duration: Mutex::new(None),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.players).push(player.clone());
        lock(&self.senders).push(tx);
        Ok(crate::player::PlayerBinding {
            id: Uuid::new_v4(),
            player,
            events: rx,
        })
    }
}

fn video() -> VideoRef {
    VideoRef::resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
}

async fn attach_with(
    host: &ScriptedHost,
    store: Arc<FakeStore>,
    seed: u8,
    settings: TrackerSettings,
) -> PlaybackProgressTracker {
    PlaybackProgressTracker::attach(host, store, &video(), assignment(seed), settings)
        .await
        .unwrap()
}

async fn attach(host: &ScriptedHost, store: Arc<FakeStore>, seed: u8) -> PlaybackProgressTracker {
    attach_with(host, store, seed, TrackerSettings::default()).await
}

fn sampled(percent: u8, sync: SyncOutcome) -> PollOutcome {
    PollOutcome::Sampled { percent, sync }
}

#[tokio::test]
async fn delta_rule_gates_syncs() {
    let host = ScriptedHost::default();
    let store = Arc::new(FakeStore::default());
    let tracker = attach(&host, store.clone(), 0).await;
    let player = host.last_player();

    player.set(60.0, 600.0);
    assert_eq!(tracker.poll().await, sampled(10, SyncOutcome::Synced(10)));
    assert_eq!(tracker.snapshot().last_reported_percent, 10);

    player.set(78.0, 600.0);
    assert_eq!(tracker.poll().await, sampled(13, SyncOutcome::Throttled));
    let snap = tracker.snapshot();
    assert_eq!(snap.current_percent, 13);
    assert_eq!(snap.last_reported_percent, 10);

    player.set(96.0, 600.0);
    assert_eq!(tracker.poll().await, sampled(16, SyncOutcome::Synced(16)));
    assert_eq!(store.calls(), vec![10, 16]);
}

#[tokio::test]
async fn completion_bypasses_the_delta_rule() {
    for seed in [92, 97] {
        let host = ScriptedHost::default();
        let store = Arc::new(FakeStore::default());
        let tracker = attach(&host, store.clone(), seed).await;
        host.last_player().set(600.0, 600.0);

        assert_eq!(tracker.poll().await, sampled(100, SyncOutcome::Synced(100)));
        let snap = tracker.snapshot();
        assert_eq!(snap.assignment.status, AssignmentStatus::Completed);
        assert!(snap.assignment.completed_at.is_some());

        // Already acknowledged; later polls at the end do not repeat it.
        assert_eq!(tracker.poll().await, sampled(100, SyncOutcome::Throttled));
        assert_eq!(store.calls(), vec![100]);
    }
}

#[tokio::test]
async fn pause_polls_immediately() {
    for (seed, expected) in [(40, SyncOutcome::Throttled), (35, SyncOutcome::Synced(42))] {
        let host = ScriptedHost::default();
        let store = Arc::new(FakeStore::default());
        let tracker = attach(&host, store.clone(), seed).await;
        host.last_player().set(42.0, 100.0);

        let playing = PlayerEvent::StateChange(PlayerState::Playing);
        assert_eq!(tracker.on_player_event(playing).await, None);
        let paused = PlayerEvent::StateChange(PlayerState::Paused);
        assert_eq!(
            tracker.on_player_event(paused).await,
            Some(sampled(42, expected))
        );
        // Pausing does not stop the timer.
        assert!(tracker.is_polling());
        tracker.detach();
    }
}

#[tokio::test]
async fn end_of_video_reports_completion() {
    let host = ScriptedHost::default();
    let store = Arc::new(FakeStore::default());
    let tracker = attach(&host, store.clone(), 80).await;

    tracker
        .on_player_event(PlayerEvent::StateChange(PlayerState::Playing))
        .await;
    host.last_player().set(312.4, 312.4);
    assert_eq!(
        tracker
            .on_player_event(PlayerEvent::StateChange(PlayerState::Ended))
            .await,
        Some(sampled(100, SyncOutcome::Synced(100)))
    );
    assert_eq!(tracker.snapshot().player_state, PlayerState::Ended);
    tracker.detach();
}

#[tokio::test]
async fn failed_sync_is_retried_by_later_polls() {
    let host = ScriptedHost::default();
    let store = Arc::new(FakeStore::default());
    store.fail.store(true, Ordering::SeqCst);
    let tracker = attach(&host, store.clone(), 0).await;
    let player = host.last_player();

    player.set(10.0, 100.0);
    assert_eq!(tracker.poll().await, sampled(10, SyncOutcome::Failed));
    let snap = tracker.snapshot();
    assert_eq!(snap.last_reported_percent, 0);
    assert_eq!(snap.assignment.progress_percent, 0);
    assert!(!snap.sync_in_flight);

    store.fail.store(false, Ordering::SeqCst);
    player.set(12.0, 100.0);
    assert_eq!(tracker.poll().await, sampled(12, SyncOutcome::Synced(12)));
    assert_eq!(store.calls(), vec![10, 12]);
}

#[tokio::test]
async fn unusable_samples_skip_the_poll() {
    let host = ScriptedHost::default();
    let store = Arc::new(FakeStore::default());
    let tracker = attach(&host, store.clone(), 0).await;
    let player = host.last_player();

    assert_eq!(tracker.poll().await, PollOutcome::PlayerUnavailable);
    player.set(5.0, 0.0);
    assert_eq!(tracker.poll().await, PollOutcome::NoDuration);
    assert!(store.calls().is_empty());
    assert_eq!(tracker.snapshot().current_percent, 0);
}

#[tokio::test]
async fn backward_seek_follows_policy() {
    let host = ScriptedHost::default();
    let store = Arc::new(FakeStore::default());
    let tracker = attach(&host, store.clone(), 60).await;
    host.last_player().set(20.0, 100.0);
    assert_eq!(tracker.poll().await, sampled(20, SyncOutcome::Synced(20)));

    let settings = TrackerSettings {
        policy: ThrottlePolicy {
            monotonic: true,
            ..ThrottlePolicy::default()
        },
        ..TrackerSettings::default()
    };
    let monotonic = attach_with(&host, store.clone(), 60, settings).await;
    host.last_player().set(20.0, 100.0);
    assert_eq!(monotonic.poll().await, sampled(20, SyncOutcome::Throttled));
    assert_eq!(store.calls(), vec![20]);
}

#[tokio::test]
async fn at_most_one_timer_per_session() {
    let host = ScriptedHost::default();
    let store = Arc::new(FakeStore::default());
    let first = attach(&host, store.clone(), 0).await;

    assert!(!first.is_polling());
    assert!(!first.apply_event(PlayerEvent::Ready));
    assert!(first.is_polling());
    assert!(!first.ensure_polling());
    first.apply_event(PlayerEvent::StateChange(PlayerState::Playing));
    first.apply_event(PlayerEvent::StateChange(PlayerState::Paused));
    first.apply_event(PlayerEvent::StateChange(PlayerState::Playing));
    assert!(!first.ensure_polling());

    first.detach();
    assert!(!first.is_polling());
    assert!(!first.ensure_polling());
    assert!(host.last_player().destroyed.load(Ordering::SeqCst));

    let second = attach(&host, store, 0).await;
    second.apply_event(PlayerEvent::Ready);
    second.apply_event(PlayerEvent::StateChange(PlayerState::Playing));
    assert_eq!(host.created.load(Ordering::SeqCst), 2);
    assert!(second.is_polling());
    assert!(!first.is_polling());
    second.detach();
}

#[tokio::test]
async fn detach_is_idempotent() {
    let host = ScriptedHost::default();
    let tracker = attach(&host, Arc::new(FakeStore::default()), 0).await;
    tracker.detach();
    tracker.detach();
    assert!(tracker.is_detached());
    assert_eq!(tracker.poll().await, PollOutcome::Detached);
    assert_eq!(tracker.try_sync(100).await, SyncOutcome::Detached);
    assert!(!tracker.apply_event(PlayerEvent::StateChange(PlayerState::Paused)));
}

#[tokio::test]
async fn detach_abandons_in_flight_sync() {
    let gate = Arc::new(Semaphore::new(0));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let store = Arc::new(FakeStore {
        gate: Some(gate.clone()),
        seen: Some(seen_tx),
        ..FakeStore::default()
    });
    let host = ScriptedHost::default();
    let tracker = attach(&host, store.clone(), 20).await;
    host.last_player().set(50.0, 100.0);

    let polling = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.poll().await }
    });
    assert_eq!(seen_rx.recv().await, Some(50));
    assert!(tracker.snapshot().sync_in_flight);

    tracker.detach();
    gate.add_permits(1);
    assert_eq!(polling.await.unwrap(), sampled(50, SyncOutcome::Detached));
    tokio::task::yield_now().await;

    let snap = tracker.snapshot();
    assert!(tracker.is_detached());
    assert_eq!(snap.last_reported_percent, 20);
    assert_eq!(snap.assignment.progress_percent, 20);
    assert_eq!(snap.assignment.last_activity_at, None);
}

#[tokio::test]
async fn syncs_are_serialized_newest_wins() {
    let gate = Arc::new(Semaphore::new(0));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let store = Arc::new(FakeStore {
        gate: Some(gate.clone()),
        seen: Some(seen_tx),
        ..FakeStore::default()
    });
    let host = ScriptedHost::default();
    let tracker = attach(&host, store.clone(), 0).await;

    let driver = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.try_sync(10).await }
    });
    assert_eq!(seen_rx.recv().await, Some(10));

    assert_eq!(tracker.try_sync(20).await, SyncOutcome::Queued);
    assert_eq!(tracker.try_sync(30).await, SyncOutcome::Queued);
    // The player went back; the newest reading replaces the queued 30.
    assert_eq!(tracker.try_sync(2).await, SyncOutcome::Queued);

    gate.add_permits(1);
    assert_eq!(seen_rx.recv().await, Some(2));
    gate.add_permits(1);
    assert_eq!(driver.await.unwrap(), SyncOutcome::Synced(2));

    assert_eq!(store.calls(), vec![10, 2]);
    let snap = tracker.snapshot();
    assert_eq!(snap.last_reported_percent, 2);
    assert!(!snap.sync_in_flight);
}

#[tokio::test]
async fn queued_percent_is_throttled_against_the_acknowledged_value() {
    let gate = Arc::new(Semaphore::new(0));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let store = Arc::new(FakeStore {
        gate: Some(gate.clone()),
        seen: Some(seen_tx),
        ..FakeStore::default()
    });
    let host = ScriptedHost::default();
    let tracker = attach(&host, store.clone(), 0).await;

    let driver = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.try_sync(10).await }
    });
    assert_eq!(seen_rx.recv().await, Some(10));

    assert_eq!(tracker.try_sync(30).await, SyncOutcome::Queued);
    assert_eq!(tracker.try_sync(12).await, SyncOutcome::Queued);

    gate.add_permits(1);
    assert_eq!(driver.await.unwrap(), SyncOutcome::Synced(10));

    // 12 is within the delta of the acknowledged 10 and 30 was superseded.
    assert_eq!(store.calls(), vec![10]);
    let snap = tracker.snapshot();
    assert_eq!(snap.last_reported_percent, 10);
    assert!(!snap.sync_in_flight);
}

#[tokio::test]
async fn detach_during_sampling_leaves_session_untouched() {
    let store = Arc::new(FakeStore::default());
    let host = ScriptedHost::default();
    let tracker = attach(&host, store.clone(), 20).await;
    let player = host.last_player();
    player.set(70.0, 100.0);
    *lock(&player.after_duration) = Some(Box::new({
        let tracker = tracker.clone();
        move || tracker.detach()
    }));

    assert_eq!(tracker.poll().await, PollOutcome::Detached);
    let snap = tracker.snapshot();
    assert_eq!(snap.current_percent, 20);
    assert_eq!(snap.last_reported_percent, 20);
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timer_polls_on_the_configured_interval() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let store = Arc::new(FakeStore {
        seen: Some(seen_tx),
        ..FakeStore::default()
    });
    let host = ScriptedHost::default();
    let tracker = attach(&host, store.clone(), 0).await;
    let player = host.last_player();
    player.set(30.0, 100.0);

    host.last_sender().send(PlayerEvent::Ready).unwrap();
    tokio::time::timeout(Duration::from_secs(9), seen_rx.recv())
        .await
        .expect_err("no poll before the first interval elapses");
    assert!(tracker.is_polling());

    assert_eq!(seen_rx.recv().await, Some(30));
    player.set(70.0, 100.0);
    assert_eq!(seen_rx.recv().await, Some(70));
    assert_eq!(tracker.snapshot().last_reported_percent, 70);

    tracker.detach();
    player.set(90.0, 100.0);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.calls(), vec![30, 70]);
}

#[tokio::test]
async fn detach_closes_the_event_listener() {
    let host = ScriptedHost::default();
    let tracker = attach(&host, Arc::new(FakeStore::default()), 0).await;
    let sender = host.last_sender();
    tracker.detach();

    for _ in 0..50 {
        if sender.is_closed() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(sender.is_closed());
    assert!(sender.send(PlayerEvent::Ready).is_err());
    assert!(!tracker.is_polling());
}
