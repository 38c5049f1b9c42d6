//! Scheduler that starts tasks under a sliding-window throttle and a
//! concurrency cap.
//!
//! # Responsibilities
//! - Keep pending tasks in insertion order
//! - Start as many tasks as both quotas allow, oldest first
//! - Remove or reorder pending tasks by their metadata
//! - Re-drain when a task completes or when the throttle window releases
//!
//! # Ordering
//! Tasks are added to the front of the pending list and started from the
//! back. Prioritized tasks are moved to the back, so several prioritized
//! tasks run last-prioritized-first.
//!
//! Started tasks are handed, in start order, to a single dispatcher task
//! that polls them. Start order therefore holds on any Tokio runtime flavor,
//! and started tasks interleave on one task rather than running in parallel.

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::queue::clock::{Clock, TokioClock};
use crate::queue::types::{QueueError, QueueResult, SchedulerConfig};
use crate::queue::window::ExecutionWindow;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Task<M> {
    job: Job,
    metadata: Option<M>,
}

struct State<M> {
    /// Front = most recently submitted, back = next to start.
    pending: VecDeque<Task<M>>,
    window: ExecutionWindow,
    in_flight: usize,
    timer: Option<JoinHandle<()>>,
    /// Feed of the dispatcher task, spawned on first start.
    dispatcher: Option<mpsc::UnboundedSender<BoxFuture<'static, ()>>>,
}

struct Shared<M> {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State<M>>,
}

/// Queue that executes futures with a maximum throughput and, optionally,
/// a maximum concurrency.
///
/// `M` is per-task metadata used to find a pending task again for
/// [`cancel`](Self::cancel) and [`prioritize`](Self::prioritize).
///
/// Must be used from within a Tokio runtime.
pub struct RateLimitedScheduler<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for RateLimitedScheduler<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Send + 'static> RateLimitedScheduler<M> {
    /// Create a scheduler driven by the Tokio clock.
    pub fn new(config: SchedulerConfig) -> QueueResult<Self> {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Create a scheduler with an explicit time source.
    ///
    /// # Errors
    /// `QueueError::InvalidConfig` if any limit is zero.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> QueueResult<Self> {
        config.validate()?;

        let window = ExecutionWindow::new(config.max_invocations_per_interval, config.interval);
        let shared = Shared {
            config,
            clock,
            state: Mutex::new(State {
                pending: VecDeque::new(),
                window,
                in_flight: 0,
                timer: None,
                dispatcher: None,
            }),
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Add a task to be started at some point in the future.
    ///
    /// The returned handle resolves with the task's output once it has run,
    /// or with `QueueError::Cancelled` if the task is removed first.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn submit<F, Fut, T>(&self, start: F, metadata: Option<M>) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { start().await })
                    .catch_unwind()
                    .await
                    .map_err(|_| QueueError::Panicked);
                // Receiver may have been dropped by a caller that lost interest
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        let pending = {
            let mut state = self.shared.lock();
            state.pending.push_front(Task { job, metadata });
            state.pending.len()
        };
        tracing::trace!(pending, "Task queued");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.drain() });

        TaskHandle { rx }
    }

    /// Remove the first pending task whose metadata matches.
    ///
    /// The removed task never starts and its handle resolves with
    /// `QueueError::Cancelled`. Returns the task's metadata.
    pub fn cancel<P>(&self, predicate: P) -> QueueResult<M>
    where
        P: FnMut(&M) -> bool,
    {
        let task = {
            let mut state = self.shared.lock();
            let index = find_pending(&state.pending, predicate).ok_or(QueueError::TaskNotFound)?;
            state
                .pending
                .remove(index)
                .ok_or(QueueError::TaskNotFound)?
        };

        // Dropping the job drops its completion sender
        let Task { job, metadata } = task;
        drop(job);
        metadata.ok_or(QueueError::TaskNotFound)
    }

    /// Move the first pending task whose metadata matches so it starts next,
    /// ahead of every other pending task.
    pub fn prioritize<P>(&self, predicate: P) -> QueueResult<()>
    where
        P: FnMut(&M) -> bool,
    {
        let mut state = self.shared.lock();
        let index = find_pending(&state.pending, predicate).ok_or(QueueError::TaskNotFound)?;
        let task = state
            .pending
            .remove(index)
            .ok_or(QueueError::TaskNotFound)?;
        state.pending.push_back(task);
        Ok(())
    }

    /// Number of tasks not yet started.
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

fn find_pending<M, P>(pending: &VecDeque<Task<M>>, mut predicate: P) -> Option<usize>
where
    P: FnMut(&M) -> bool,
{
    pending
        .iter()
        .position(|task| task.metadata.as_ref().is_some_and(&mut predicate))
}

impl<M: Send + 'static> Shared<M> {
    /// Caller predicates run under this lock. A panicking predicate leaves
    /// the state intact, so a poisoned lock is recovered.
    fn lock(&self) -> MutexGuard<'_, State<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tasks until either quota is exhausted. If tasks remain and the
    /// throttle is the binding limit, arm a timer for the next release.
    ///
    /// Safe to call at any time and any number of times.
    fn drain(self: &Arc<Self>) {
        let now = self.clock.now();

        let mut state = self.lock();
        state.window.evict_expired(now);

        let quota = state
            .window
            .remaining()
            .min(self.concurrency_quota(state.in_flight))
            .min(state.pending.len());

        let mut started = 0;
        for _ in 0..quota {
            let Some(task) = state.pending.pop_back() else {
                break;
            };
            state.window.record(now);
            state.in_flight += 1;
            started += 1;

            // Sent under the lock so concurrent drains keep start order
            let shared = Arc::clone(self);
            let run = (task.job)();
            self.dispatch(
                &mut state,
                async move {
                    run.await;
                    shared.finish();
                }
                .boxed(),
            );
        }

        if !state.pending.is_empty() {
            if let Some(at) = self.next_possible_execution(&state) {
                self.arm_timer(&mut state, at);
            }
        }
        drop(state);

        if started > 0 {
            tracing::debug!(started, "Starting queued tasks");
        }
    }

    /// Hand a started task to the dispatcher, spawning it if needed.
    fn dispatch(&self, state: &mut State<M>, run: BoxFuture<'static, ()>) {
        let run = match state.dispatcher.as_ref() {
            Some(sender) => match sender.send(run) {
                Ok(()) => return,
                Err(mpsc::error::SendError(run)) => run,
            },
            None => run,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatcher(receiver));
        // The receiver was just created, so this cannot fail
        let _ = sender.send(run);
        state.dispatcher = Some(sender);
    }

    fn finish(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.drain();
    }

    fn concurrency_quota(&self, in_flight: usize) -> usize {
        match self.config.max_concurrency {
            Some(max) => max.saturating_sub(in_flight),
            None => usize::MAX,
        }
    }

    /// Soonest instant another task could start without exceeding the
    /// throttle. `None` when concurrency is saturated, since only a
    /// completion can free capacity then.
    fn next_possible_execution(&self, state: &State<M>) -> Option<Instant> {
        if self.concurrency_quota(state.in_flight) == 0 {
            return None;
        }
        state.window.next_release()
    }

    fn arm_timer(self: &Arc<Self>, state: &mut State<M>, at: Instant) {
        if let Some(previous) = state.timer.take() {
            previous.abort();
        }

        let sleep = self.clock.sleep_until(at);
        let shared = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            sleep.await;
            shared.drain();
        }));
    }
}

/// Poll started tasks in the order they arrive until the scheduler is gone
/// and every task has finished.
async fn run_dispatcher(mut receiver: mpsc::UnboundedReceiver<BoxFuture<'static, ()>>) {
    let mut running = FuturesUnordered::new();
    loop {
        tokio::select! {
            biased;
            next = receiver.recv() => match next {
                Some(run) => running.push(run),
                None => break,
            },
            Some(()) = running.next(), if !running.is_empty() => {}
        }
    }
    while running.next().await.is_some() {}
}

/// Completion handle returned by [`RateLimitedScheduler::submit`].
#[must_use = "dropping the handle discards the task's output"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<QueueResult<T>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = QueueResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Cancelled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn unthrottled() -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(1),
            max_invocations_per_interval: 1_000,
            max_concurrency: None,
        }
    }

    type Starts = Arc<Mutex<Vec<(u32, Instant)>>>;

    fn recording_task(
        scheduler: &RateLimitedScheduler<u32>,
        starts: &Starts,
        id: u32,
    ) -> TaskHandle<u32> {
        let starts = Arc::clone(starts);
        scheduler.submit(
            move || async move {
                starts.lock().unwrap().push((id, Instant::now()));
                id
            },
            Some(id),
        )
    }

    fn order(starts: &Starts) -> Vec<u32> {
        starts.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    #[tokio::test]
    async fn test_fifo_without_prioritization() {
        let scheduler = RateLimitedScheduler::new(unthrottled()).unwrap();
        let starts = Starts::default();

        let handles: Vec<_> = (1..=3)
            .map(|id| recording_task(&scheduler, &starts, id))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(order(&starts), vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_on_multi_thread_runtime() {
        for _ in 0..50 {
            let scheduler = RateLimitedScheduler::new(unthrottled()).unwrap();
            let starts = Starts::default();

            let handles: Vec<_> = (1..=20)
                .map(|id| recording_task(&scheduler, &starts, id))
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }

            assert_eq!(order(&starts), (1..=20).collect::<Vec<_>>());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_defers_excess_starts() {
        let scheduler = RateLimitedScheduler::new(SchedulerConfig::default()).unwrap();
        let starts = Starts::default();
        let origin = Instant::now();

        let handles: Vec<_> = (1..=5)
            .map(|id| recording_task(&scheduler, &starts, id))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 5);
        for (id, at) in starts.iter() {
            let elapsed = *at - origin;
            if *id <= 3 {
                assert!(elapsed < Duration::from_millis(200), "task {id} started late");
            } else {
                assert!(elapsed >= Duration::from_millis(200), "task {id} started early");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_never_exceeds_limit() {
        let config = SchedulerConfig {
            interval: Duration::from_millis(200),
            max_invocations_per_interval: 3,
            max_concurrency: None,
        };
        let scheduler = RateLimitedScheduler::new(config).unwrap();
        let starts = Starts::default();

        let handles: Vec<_> = (1..=10)
            .map(|id| recording_task(&scheduler, &starts, id))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let times: Vec<Instant> = starts.lock().unwrap().iter().map(|(_, at)| *at).collect();
        assert_eq!(times.len(), 10);
        for pair in times.windows(4) {
            assert!(pair[3] - pair[0] >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let config = SchedulerConfig {
            max_concurrency: Some(2),
            ..unthrottled()
        };
        let scheduler = RateLimitedScheduler::new(config).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6u32)
            .map(|id| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                scheduler.submit(
                    move || async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    },
                    Some(id),
                )
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_prioritized_tasks_run_last_prioritized_first() {
        let scheduler = RateLimitedScheduler::new(unthrottled()).unwrap();
        let starts = Starts::default();

        let handles: Vec<_> = (1..=5)
            .map(|id| recording_task(&scheduler, &starts, id))
            .collect();
        scheduler.prioritize(|id| *id == 2).unwrap();
        scheduler.prioritize(|id| *id == 3).unwrap();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(order(&starts), vec![3, 2, 1, 4, 5]);
    }

    #[tokio::test]
    async fn test_cancelled_task_never_starts() {
        let scheduler = RateLimitedScheduler::new(unthrottled()).unwrap();
        let started = Arc::new(AtomicBool::new(false));

        let first = scheduler.submit(|| async { 1 }, Some(1u32));
        let flag = Arc::clone(&started);
        let second = scheduler.submit(
            move || async move {
                flag.store(true, Ordering::SeqCst);
                2
            },
            Some(2u32),
        );

        assert_eq!(scheduler.cancel(|id| *id == 2), Ok(2));
        assert_eq!(scheduler.pending_count(), 1);

        assert_eq!(first.await, Ok(1));
        assert_eq!(second.await, Err(QueueError::Cancelled));
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unmatched_predicate_is_not_found() {
        let scheduler = RateLimitedScheduler::new(unthrottled()).unwrap();
        let handle = scheduler.submit(|| async {}, Some(7u32));

        assert_eq!(scheduler.cancel(|id| *id == 8), Err(QueueError::TaskNotFound));
        assert_eq!(scheduler.prioritize(|id| *id == 8), Err(QueueError::TaskNotFound));

        // Tasks without metadata are invisible to predicates
        let anonymous = scheduler.submit(|| async {}, None);
        assert_eq!(scheduler.cancel(|_| true), Ok(7));

        assert_eq!(anonymous.await, Ok(()));
        assert_eq!(handle.await, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_panicking_predicate_leaves_queue_usable() {
        let scheduler = RateLimitedScheduler::new(unthrottled()).unwrap();
        let first = scheduler.submit(|| async { 1 }, Some(1u32));

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = scheduler.cancel(|_| panic!("predicate failed"));
        }));
        assert!(outcome.is_err());
        assert_eq!(scheduler.pending_count(), 1);

        let second = scheduler.submit(|| async { 2 }, Some(2u32));
        assert_eq!(first.await, Ok(1));
        assert_eq!(second.await, Ok(2));
        assert_eq!(scheduler.prioritize(|id| *id == 2), Err(QueueError::TaskNotFound));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_stall_queue() {
        let scheduler = RateLimitedScheduler::new(SchedulerConfig {
            max_concurrency: Some(1),
            ..unthrottled()
        })
        .unwrap();

        let failing = scheduler.submit(|| async { panic!("boom") }, Some(1u32));
        let next = scheduler.submit(|| async { "ok" }, Some(2u32));

        assert_eq!(failing.await, Err::<(), _>(QueueError::Panicked));
        assert_eq!(next.await, Ok("ok"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SchedulerConfig {
            max_invocations_per_interval: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            RateLimitedScheduler::<u32>::new(config),
            Err(QueueError::InvalidConfig(_))
        ));
    }
}
