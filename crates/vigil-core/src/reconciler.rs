//! Reconciliation loop: the poller that resolves subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::Subscription;
use crate::ports::{Notifier, SubscriptionStore, TaskSource};
use crate::render;

/// Fixed poll period of the reference deployment.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// How many consecutive not-found polls retire a subscription.
pub const DEFAULT_STALE_AFTER_MISSES: u32 = 10;

/// Level-triggered poller over the subscription store.
///
/// Design:
/// - Each tick re-derives all actions from current truth (store + remote
///   source); nothing tracks transitions between ticks except the stale
///   counters, and those are advisory.
/// - Entries are processed independently: one entry's failure never aborts
///   the rest of the tick.
/// - A completion is delivered before its subscription is removed. If the
///   remove then fails, the next tick may repeat the notification; the
///   reverse order could lose it, which is the worse failure.
pub struct Reconciler {
    store: Arc<dyn SubscriptionStore>,
    source: Arc<dyn TaskSource>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,

    /// 0 disables stale expiry (not-found entries are skipped forever).
    stale_after_misses: u32,

    /// Consecutive not-found counts per subscription. Kept in memory on
    /// purpose: a restart resets the window, never the subscription.
    misses: HashMap<Subscription, u32>,

    /// Set once spawned; checked between entries so a shutdown request lets
    /// the current entry finish instead of aborting it mid-flight.
    shutdown: Option<watch::Receiver<bool>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        source: Arc<dyn TaskSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            interval: DEFAULT_TICK_INTERVAL,
            stale_after_misses: DEFAULT_STALE_AFTER_MISSES,
            misses: HashMap::new(),
            shutdown: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stale_after_misses(mut self, misses: u32) -> Self {
        self.stale_after_misses = misses;
        self
    }

    /// Start the loop.
    ///
    /// Ticks run one after another on a single task, so a slow remote call
    /// stretches the schedule instead of overlapping ticks.
    pub fn spawn(mut self) -> ReconcilerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown = Some(shutdown_rx.clone());
        let mut shutdown_rx = shutdown_rx;

        let join = tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "reconciler started");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // sender gone counts as shutdown
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.interval) => self.tick().await,
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            info!("reconciler stopped");
        });

        ReconcilerHandle { shutdown_tx, join }
    }

    /// One full pass over the store. Public mainly for tests; the spawned
    /// loop calls it on the fixed interval.
    pub async fn tick(&mut self) {
        let subscriptions = match self.store.list_all().await {
            Ok(subs) => subs,
            Err(err) => {
                warn!(%err, "tick skipped: could not list subscriptions");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        debug!(pending = subscriptions.len(), "tick started");
        for sub in &subscriptions {
            if self.shutdown_requested() {
                info!("shutdown requested mid-tick; remaining entries wait for the next start");
                break;
            }
            self.process(sub).await;
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Handle one subscription. Errors are logged and contained here so the
    /// tick can keep iterating.
    async fn process(&mut self, sub: &Subscription) {
        let task = match self.source.get_task(&sub.task).await {
            Ok(task) => task,
            Err(err) => {
                warn!(
                    subscriber = %sub.subscriber, task = %sub.task, %err,
                    "skipping entry this tick",
                );
                return;
            }
        };

        let Some(task) = task else {
            self.observe_missing(sub).await;
            return;
        };
        self.misses.remove(sub);

        if !task.state.is_terminal() {
            return;
        }

        let notice = render::completion_notice(&task);
        if let Err(err) = self.notifier.send(sub.subscriber, &notice).await {
            warn!(
                subscriber = %sub.subscriber, task = %sub.task, %err,
                "delivery failed; will retry next tick",
            );
            return;
        }
        info!(
            subscriber = %sub.subscriber, task = %sub.task, state = ?task.state,
            "completion delivered",
        );

        // Remove only after a delivered send. A failed remove here means at
        // most one duplicate next tick, never a lost notification.
        if let Err(err) = self.store.remove(sub.subscriber, &sub.task).await {
            warn!(
                subscriber = %sub.subscriber, task = %sub.task, %err,
                "notified but could not remove; duplicate possible next tick",
            );
        }
    }

    /// A subscribed task the server no longer reports. Counted per entry;
    /// at `stale_after_misses` consecutive misses the subscriber gets an
    /// unknown-outcome notice and the record is retired.
    async fn observe_missing(&mut self, sub: &Subscription) {
        if self.stale_after_misses == 0 {
            debug!(
                subscriber = %sub.subscriber, task = %sub.task,
                "task not found; keeping subscription",
            );
            return;
        }

        let count = self.misses.entry(sub.clone()).or_insert(0);
        *count += 1;
        if *count < self.stale_after_misses {
            debug!(
                subscriber = %sub.subscriber, task = %sub.task, misses = *count,
                "task not found",
            );
            return;
        }

        let notice = render::unknown_outcome_notice(&sub.task);
        if let Err(err) = self.notifier.send(sub.subscriber, &notice).await {
            warn!(
                subscriber = %sub.subscriber, task = %sub.task, %err,
                "delivery failed; keeping stale subscription for another tick",
            );
            return;
        }
        if let Err(err) = self.store.remove(sub.subscriber, &sub.task).await {
            warn!(
                subscriber = %sub.subscriber, task = %sub.task, %err,
                "notified but could not remove stale subscription",
            );
            return;
        }
        self.misses.remove(sub);
        info!(subscriber = %sub.subscriber, task = %sub.task, "stale subscription retired");
    }
}

/// Handle to a running reconciler.
/// - `request_shutdown()` stops new ticks; an in-flight tick finishes its
///   current entry first.
/// - `shutdown_and_join()` waits for the loop task to exit.
pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Mutex;

    use super::*;
    use crate::domain::{
        AlarmSnapshot, SubscriberId, TaskKey, TaskSnapshot, TaskState, VigilError,
    };
    use crate::store::InMemoryStore;

    /// One scripted observation of a task.
    #[derive(Clone)]
    enum Step {
        Unavailable,
        Missing,
        Task(TaskSnapshot),
    }

    /// Task source that replays a per-key script, repeating the last step
    /// once the script is exhausted.
    #[derive(Default)]
    struct ScriptedSource {
        steps: Mutex<HashMap<TaskKey, VecDeque<Step>>>,
    }

    impl ScriptedSource {
        async fn script(&self, key: &TaskKey, steps: Vec<Step>) {
            self.steps
                .lock()
                .await
                .insert(key.clone(), steps.into_iter().collect());
        }
    }

    #[async_trait]
    impl TaskSource for ScriptedSource {
        async fn list_running_tasks(&self) -> Result<Vec<TaskSnapshot>, VigilError> {
            Ok(Vec::new())
        }

        async fn get_task(&self, task: &TaskKey) -> Result<Option<TaskSnapshot>, VigilError> {
            let mut steps = self.steps.lock().await;
            let step = match steps.get_mut(task) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap_or(Step::Missing),
                None => Step::Missing,
            };
            match step {
                Step::Unavailable => {
                    Err(VigilError::RemoteUnavailable("scripted outage".into()))
                }
                Step::Missing => Ok(None),
                Step::Task(task) => Ok(Some(task)),
            }
        }

        async fn list_active_alarms(&self) -> Result<Vec<AlarmSnapshot>, VigilError> {
            Ok(Vec::new())
        }
    }

    /// Records every send attempt; the first `fail_next` attempts fail.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(SubscriberId, String)>>,
        fail_next: AtomicU32,
    }

    impl RecordingNotifier {
        async fn delivered(&self) -> Vec<(SubscriberId, String)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: SubscriberId, text: &str) -> Result<(), VigilError> {
            let failures = self.fail_next.load(Ordering::SeqCst);
            if failures > 0 {
                self.fail_next.store(failures - 1, Ordering::SeqCst);
                return Err(VigilError::DeliveryFailed("scripted outage".into()));
            }
            self.sent.lock().await.push((to, text.to_string()));
            Ok(())
        }
    }

    fn snapshot(key: &TaskKey, state: TaskState, progress: Option<u8>) -> TaskSnapshot {
        let terminal = state.is_terminal();
        TaskSnapshot {
            key: key.clone(),
            description: "Reconfigure virtual machine".to_string(),
            entity: "vm-17".to_string(),
            user: "ops".to_string(),
            state,
            progress,
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            completed_at: terminal
                .then(|| Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            error: (state == TaskState::Error)
                .then(|| "A general system error occurred".to_string()),
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
        reconciler: Reconciler,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = Reconciler::new(
            Arc::clone(&store) as Arc<dyn SubscriptionStore>,
            Arc::clone(&source) as Arc<dyn TaskSource>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        Harness {
            store,
            source,
            notifier,
            reconciler,
        }
    }

    #[tokio::test]
    async fn running_task_is_left_alone() {
        let mut h = harness();
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("task-9");

        h.store.add(sub, &key).await.unwrap();
        h.source
            .script(&key, vec![Step::Task(snapshot(&key, TaskState::Running, Some(40)))])
            .await;

        h.reconciler.tick().await;
        h.reconciler.tick().await;

        assert!(h.notifier.delivered().await.is_empty());
        assert!(h.store.exists(sub, &key).await.unwrap());
    }

    // The reference scenario: two running polls, then success on the third.
    #[tokio::test]
    async fn success_notifies_once_and_removes() {
        let mut h = harness();
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("task-9");

        h.store.add(sub, &key).await.unwrap();
        h.source
            .script(
                &key,
                vec![
                    Step::Task(snapshot(&key, TaskState::Running, Some(40))),
                    Step::Task(snapshot(&key, TaskState::Running, Some(40))),
                    Step::Task(snapshot(&key, TaskState::Success, Some(100))),
                ],
            )
            .await;

        h.reconciler.tick().await;
        h.reconciler.tick().await;
        assert!(h.notifier.delivered().await.is_empty());

        h.reconciler.tick().await;
        let sent = h.notifier.delivered().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, sub);
        assert!(sent[0].1.starts_with("Task completed successfully"));
        assert!(sent[0].1.contains("task-9"));
        assert!(h.store.list_for(sub).await.unwrap().is_empty());

        // Nothing left to do; further ticks stay quiet.
        h.reconciler.tick().await;
        assert_eq!(h.notifier.delivered().await.len(), 1);
    }

    #[tokio::test]
    async fn error_notice_reaches_subscriber() {
        let mut h = harness();
        let sub = SubscriberId::new(7);
        let key = TaskKey::new("task-3");

        h.store.add(sub, &key).await.unwrap();
        h.source
            .script(&key, vec![Step::Task(snapshot(&key, TaskState::Error, None))])
            .await;

        h.reconciler.tick().await;

        let sent = h.notifier.delivered().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("Task finished with an error"));
        assert!(sent[0].1.contains("A general system error occurred"));
        assert!(!h.store.exists(sub, &key).await.unwrap());
    }

    #[tokio::test]
    async fn delivery_failure_retries_with_identical_content() {
        let mut h = harness();
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("task-9");

        h.store.add(sub, &key).await.unwrap();
        h.source
            .script(&key, vec![Step::Task(snapshot(&key, TaskState::Success, Some(100)))])
            .await;
        h.notifier.fail_next.store(1, Ordering::SeqCst);

        h.reconciler.tick().await;
        assert!(h.notifier.delivered().await.is_empty());
        assert!(h.store.exists(sub, &key).await.unwrap(), "kept for retry");

        h.reconciler.tick().await;
        let sent = h.notifier.delivered().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1,
            render::completion_notice(&snapshot(&key, TaskState::Success, Some(100))),
            "retry resends identical content",
        );
        assert!(!h.store.exists(sub, &key).await.unwrap());
    }

    #[tokio::test]
    async fn remote_outage_isolates_entries() {
        let mut h = harness();
        let a = SubscriberId::new(1);
        let b = SubscriberId::new(2);
        let flaky = TaskKey::new("flaky");
        let done = TaskKey::new("done");

        h.store.add(a, &flaky).await.unwrap();
        h.store.add(b, &done).await.unwrap();
        h.source.script(&flaky, vec![Step::Unavailable]).await;
        h.source
            .script(&done, vec![Step::Task(snapshot(&done, TaskState::Success, Some(100)))])
            .await;

        h.reconciler.tick().await;

        // B resolved despite A's outage; A untouched and retried later.
        let sent = h.notifier.delivered().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, b);
        assert!(h.store.exists(a, &flaky).await.unwrap());
        assert!(!h.store.exists(b, &done).await.unwrap());
    }

    #[tokio::test]
    async fn stale_task_expires_after_misses() {
        let mut h = harness();
        h.reconciler = h.reconciler.with_stale_after_misses(3);
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("gone");

        h.store.add(sub, &key).await.unwrap();
        h.source.script(&key, vec![Step::Missing]).await;

        h.reconciler.tick().await;
        h.reconciler.tick().await;
        assert!(h.notifier.delivered().await.is_empty());
        assert!(h.store.exists(sub, &key).await.unwrap());

        h.reconciler.tick().await;
        let sent = h.notifier.delivered().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("outcome could not be determined"));
        assert!(!h.store.exists(sub, &key).await.unwrap());
    }

    #[tokio::test]
    async fn reappearing_task_resets_the_miss_count() {
        let mut h = harness();
        h.reconciler = h.reconciler.with_stale_after_misses(2);
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("task-9");

        h.store.add(sub, &key).await.unwrap();
        h.source
            .script(
                &key,
                vec![
                    Step::Missing,
                    Step::Task(snapshot(&key, TaskState::Running, Some(10))),
                    Step::Missing,
                    Step::Missing,
                ],
            )
            .await;

        h.reconciler.tick().await; // miss 1
        h.reconciler.tick().await; // seen again: counter resets
        h.reconciler.tick().await; // miss 1
        assert!(h.store.exists(sub, &key).await.unwrap());

        h.reconciler.tick().await; // miss 2: retired
        assert!(!h.store.exists(sub, &key).await.unwrap());
    }

    #[tokio::test]
    async fn stale_policy_disabled_keeps_subscription() {
        let mut h = harness();
        h.reconciler = h.reconciler.with_stale_after_misses(0);
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("gone");

        h.store.add(sub, &key).await.unwrap();
        h.source.script(&key, vec![Step::Missing]).await;

        for _ in 0..5 {
            h.reconciler.tick().await;
        }

        assert!(h.notifier.delivered().await.is_empty());
        assert!(h.store.exists(sub, &key).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_ticks_and_shuts_down() {
        let h = harness();
        let sub = SubscriberId::new(42);
        let key = TaskKey::new("task-9");

        h.store.add(sub, &key).await.unwrap();
        h.source
            .script(&key, vec![Step::Task(snapshot(&key, TaskState::Success, Some(100)))])
            .await;

        let handle = h
            .reconciler
            .with_interval(Duration::from_secs(60))
            .spawn();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.notifier.delivered().await.len(), 1);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown_and_join())
            .await
            .expect("loop exits promptly after shutdown");
    }
}
