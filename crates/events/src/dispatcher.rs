//! Best-effort notification dispatcher.
//!
//! [`NotificationDispatcher`] owns a fixed pool of worker tasks draining one
//! FIFO queue. After each delivery a worker waits `send_delay` before taking
//! the next task, which caps outbound throughput at roughly
//! `concurrency / send_delay` messages per second.
//!
//! Callers hold a cloneable [`DispatcherHandle`]. Enqueuing never blocks and
//! never fails: a task that cannot be delivered is logged and marked
//! [`DeliveryStatus::FailedPermanently`] without touching its siblings.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::delivery::{DeliveryError, MessageSender};
use crate::task::{DeliveryStatus, NotificationTask, TaskId};

/// Default number of concurrent delivery workers.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default pause between two deliveries on the same worker.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(600);

/// Default number of finished task statuses kept for lookups.
pub const DEFAULT_STATUS_RETENTION: usize = 10_000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-task retry schedule.
///
/// Each entry is one extra attempt, made after sleeping for that long. The
/// default schedule is empty: one attempt, no retry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Exponential schedule: `base`, `2 * base`, `4 * base`, ...
    pub fn exponential(base: Duration, retries: usize) -> Self {
        let backoff = (0..retries)
            .map(|i| base.saturating_mul(1u32 << i.min(16)))
            .collect();
        Self { backoff }
    }

    /// Parse a comma-separated list of milliseconds, e.g. `"1000,2000,4000"`.
    ///
    /// Returns `None` if any entry is not a number.
    pub fn parse_millis(spec: &str) -> Option<Self> {
        let backoff = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u64>().ok().map(Duration::from_millis))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { backoff })
    }

    /// Total number of attempts a task gets.
    pub fn max_attempts(&self) -> usize {
        self.backoff.len() + 1
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks (at least one).
    pub concurrency: usize,
    /// Minimum pause between two deliveries on one worker.
    pub send_delay: Duration,
    pub retry: RetryPolicy,
    /// How many finished statuses to remember before evicting the oldest.
    pub status_retention: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            send_delay: DEFAULT_SEND_DELAY,
            retry: RetryPolicy::none(),
            status_retention: DEFAULT_STATUS_RETENTION,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `NOTIFY_CONCURRENCY`      | `2`     |
    /// | `NOTIFY_SEND_DELAY_MS`    | `600`   |
    /// | `NOTIFY_RETRY_BACKOFF_MS` | empty   |
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let concurrency = var("NOTIFY_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.concurrency);

        let send_delay = var("NOTIFY_SEND_DELAY_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.send_delay);

        let retry = var("NOTIFY_RETRY_BACKOFF_MS")
            .and_then(|v| RetryPolicy::parse_millis(&v))
            .unwrap_or(defaults.retry);

        Self {
            concurrency,
            send_delay,
            retry,
            status_retention: defaults.status_retention,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch tracking
// ---------------------------------------------------------------------------

/// Delivery outcome counts for one enqueued batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.delivered + self.failed)
    }

    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }
}

/// Shared by every queued task of one batch. Dropping the last clone closes
/// the report channel, which wakes any waiter.
struct BatchTracker {
    report: watch::Sender<BatchReport>,
}

impl BatchTracker {
    fn record(&self, delivered: bool) {
        self.report.send_modify(|report| {
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        });
    }
}

/// Returned by [`DispatcherHandle::enqueue`] for optional diagnostics.
///
/// Dropping it has no effect on delivery.
pub struct BatchHandle {
    task_ids: Vec<TaskId>,
    report: watch::Receiver<BatchReport>,
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("task_ids", &self.task_ids)
            .field("report", &self.report())
            .finish()
    }
}

impl BatchHandle {
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    /// Snapshot of the counts so far.
    pub fn report(&self) -> BatchReport {
        *self.report.borrow()
    }

    /// Wait until every task of the batch reached a terminal status.
    ///
    /// Resolves early, with whatever was recorded, if the dispatcher drops
    /// the remaining tasks.
    pub async fn wait(mut self) -> BatchReport {
        let finished = match self.report.wait_for(BatchReport::is_complete).await {
            Ok(report) => Some(*report),
            Err(_) => None,
        };
        finished.unwrap_or_else(|| *self.report.borrow())
    }
}

// ---------------------------------------------------------------------------
// Status board
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StatusEntries {
    statuses: HashMap<TaskId, DeliveryStatus>,
    finished: VecDeque<TaskId>,
}

/// Process-local delivery status per task, with bounded retention of
/// finished entries.
struct StatusBoard {
    entries: Mutex<StatusEntries>,
    retention: usize,
}

impl StatusBoard {
    fn new(retention: usize) -> Self {
        Self {
            entries: Mutex::new(StatusEntries::default()),
            retention,
        }
    }

    fn set(&self, id: TaskId, status: DeliveryStatus) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.statuses.insert(id, status);

        if status.is_terminal() {
            entries.finished.push_back(id);
            while entries.finished.len() > self.retention {
                if let Some(evicted) = entries.finished.pop_front() {
                    entries.statuses.remove(&evicted);
                }
            }
        }
    }

    fn get(&self, id: TaskId) -> Option<DeliveryStatus> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .statuses
            .get(&id)
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Queue item
// ---------------------------------------------------------------------------

struct Job {
    task: NotificationTask,
    batch: Arc<BatchTracker>,
}

impl Job {
    /// Give up on this task without attempting (another) delivery.
    fn fail(self, statuses: &StatusBoard, reason: &str) {
        tracing::error!(
            task_id = %self.task.id,
            group_id = %self.task.group_id,
            to = %self.task.message.to,
            reason,
            "Notification dropped"
        );
        statuses.set(self.task.id, DeliveryStatus::FailedPermanently);
        self.batch.record(false);
    }
}

// ---------------------------------------------------------------------------
// DispatcherHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable entry point to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    queue: mpsc::UnboundedSender<Job>,
    statuses: Arc<StatusBoard>,
    closed: CancellationToken,
}

impl DispatcherHandle {
    /// Queue a batch of tasks and return immediately.
    ///
    /// If the dispatcher is shutting down, the tasks are marked failed and
    /// logged; the caller is never affected.
    pub fn enqueue(&self, tasks: Vec<NotificationTask>) -> BatchHandle {
        let (report_tx, report_rx) = watch::channel(BatchReport {
            total: tasks.len(),
            delivered: 0,
            failed: 0,
        });
        let batch = Arc::new(BatchTracker { report: report_tx });
        let task_ids = tasks.iter().map(|t| t.id).collect();

        for task in tasks {
            self.statuses.set(task.id, DeliveryStatus::Queued);
            let job = Job {
                task,
                batch: Arc::clone(&batch),
            };

            if self.closed.is_cancelled() {
                job.fail(&self.statuses, "dispatcher is shut down");
                continue;
            }
            if let Err(mpsc::error::SendError(job)) = self.queue.send(job) {
                job.fail(&self.statuses, "dispatcher is shut down");
            }
        }

        BatchHandle {
            task_ids,
            report: report_rx,
        }
    }

    /// Current status of a task, if it is still remembered.
    pub fn status(&self, task_id: TaskId) -> Option<DeliveryStatus> {
        self.statuses.get(task_id)
    }
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

/// How [`NotificationDispatcher::shutdown`] treats work still queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop accepting tasks and deliver everything already queued.
    Drain,
    /// Stop immediately; queued and in-flight tasks are marked failed.
    Abandon,
}

/// The worker pool. Create one per process and hand out
/// [`handle`](Self::handle)s.
pub struct NotificationDispatcher {
    handle: DispatcherHandle,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    workers: TaskTracker,
    abandon: CancellationToken,
}

impl NotificationDispatcher {
    /// Spawn the worker pool on the current Tokio runtime.
    pub fn start(config: DispatcherConfig, sender: Arc<dyn MessageSender>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let statuses = Arc::new(StatusBoard::new(config.status_retention));
        let closed = CancellationToken::new();
        let abandon = CancellationToken::new();
        let retry = Arc::new(config.retry);
        let concurrency = config.concurrency.max(1);

        let workers = TaskTracker::new();
        for worker_id in 0..concurrency {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&queue),
                sender: Arc::clone(&sender),
                statuses: Arc::clone(&statuses),
                retry: Arc::clone(&retry),
                send_delay: config.send_delay,
                draining: closed.clone(),
                abandon: abandon.clone(),
            };
            workers.spawn(worker.run());
        }
        workers.close();

        tracing::info!(
            concurrency,
            send_delay = ?config.send_delay,
            max_attempts = retry.max_attempts(),
            "Notification dispatcher started"
        );

        Self {
            handle: DispatcherHandle {
                queue: queue_tx,
                statuses,
                closed,
            },
            queue,
            workers,
            abandon,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Stop the worker pool.
    ///
    /// New tasks are rejected from this point on. Whatever is left in the
    /// queue once the workers have exited is marked failed.
    pub async fn shutdown(self, mode: ShutdownMode) {
        tracing::info!(?mode, "Notification dispatcher shutting down");

        self.handle.closed.cancel();
        if mode == ShutdownMode::Abandon {
            self.abandon.cancel();
        }
        self.workers.wait().await;

        let mut queue = self.queue.lock().await;
        queue.close();
        let mut dropped = 0usize;
        while let Ok(job) = queue.try_recv() {
            job.fail(&self.handle.statuses, "abandoned at shutdown");
            dropped += 1;
        }

        tracing::info!(dropped, "Notification dispatcher stopped");
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    sender: Arc<dyn MessageSender>,
    statuses: Arc<StatusBoard>,
    retry: Arc<RetryPolicy>,
    send_delay: Duration,
    draining: CancellationToken,
    abandon: CancellationToken,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker_id = self.id, "Notification worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.abandon.cancelled() => break,
                job = self.next_job() => job,
            };
            let Some(job) = job else { break };

            self.process(job).await;

            tokio::select! {
                biased;
                _ = self.abandon.cancelled() => break,
                _ = tokio::time::sleep(self.send_delay) => {}
            }
        }

        tracing::debug!(worker_id = self.id, "Notification worker stopped");
    }

    /// Take the next job. Returns `None` once the queue is closed, or once
    /// it is empty while draining.
    async fn next_job(&self) -> Option<Job> {
        let mut queue = self.queue.lock().await;
        tokio::select! {
            biased;
            job = queue.recv() => job,
            _ = self.draining.cancelled() => queue.try_recv().ok(),
        }
    }

    async fn process(&self, job: Job) {
        let task_id = job.task.id;
        self.statuses.set(task_id, DeliveryStatus::InFlight);

        // The send runs in its own task so a panicking sender only fails this
        // notification.
        let sender = Arc::clone(&self.sender);
        let retry = Arc::clone(&self.retry);
        let task = job.task.clone();
        let send_delay = self.send_delay;
        let mut delivery = tokio::spawn(async move {
            send_one(sender.as_ref(), &task, &retry, send_delay).await
        });

        let result = tokio::select! {
            joined = &mut delivery => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(DeliveryError::Panicked),
                Err(_) => Err(DeliveryError::Abandoned),
            },
            _ = self.abandon.cancelled() => {
                delivery.abort();
                Err(DeliveryError::Abandoned)
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    worker_id = self.id,
                    task_id = %task_id,
                    group_id = %job.task.group_id,
                    to = %job.task.message.to,
                    "Notification delivered"
                );
                self.statuses.set(task_id, DeliveryStatus::Delivered);
                job.batch.record(true);
            }
            Err(e) => {
                tracing::error!(
                    worker_id = self.id,
                    task_id = %task_id,
                    group_id = %job.task.group_id,
                    to = %job.task.message.to,
                    error = %e,
                    "Notification delivery failed permanently"
                );
                self.statuses.set(task_id, DeliveryStatus::FailedPermanently);
                job.batch.record(false);
            }
        }
    }
}

/// Deliver one task, retrying according to `retry`.
///
/// Consecutive attempts are at least `min_spacing` apart, so retries obey
/// the same per-worker rate limit as fresh tasks. Returns the last error
/// once the schedule is exhausted.
pub async fn send_one(
    sender: &dyn MessageSender,
    task: &NotificationTask,
    retry: &RetryPolicy,
    min_spacing: Duration,
) -> Result<(), DeliveryError> {
    let mut backoff = retry.backoff.iter();
    let mut attempt = 1usize;

    loop {
        match sender.send(&task.message).await {
            Ok(()) => return Ok(()),
            Err(e) => match backoff.next() {
                Some(backoff) => {
                    let delay = (*backoff).max(min_spacing);
                    tracing::warn!(
                        task_id = %task.id,
                        attempt,
                        retry_in = ?delay,
                        error = %e,
                        "Notification delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
