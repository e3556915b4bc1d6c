//! Integration tests for `NotificationDispatcher`.
//!
//! Each test runs the real worker pool against an in-memory
//! `MessageSender` and observes delivery through batch reports and task
//! statuses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;
use xbuddy_events::dispatcher::send_one;
use xbuddy_events::{
    DeliveryError, DeliveryStatus, DispatcherConfig, MessageSender, NotificationDispatcher,
    NotificationTask, OutboundMessage, RetryPolicy, ShutdownMode,
};

/// Upper bound for any single test wait.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Test senders
// ---------------------------------------------------------------------------

/// Succeeds after holding each send for `hold`, recording when it started.
#[derive(Default)]
struct Recorder {
    hold: Duration,
    started: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    fn start_times(&self) -> Vec<Instant> {
        self.started.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl MessageSender for Recorder {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.started
            .lock()
            .unwrap()
            .push((message.to.clone(), Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails the first `failures` calls, then succeeds.
struct Flaky {
    failures: usize,
    attempts: AtomicUsize,
    called_at: Mutex<Vec<Instant>>,
}

impl Flaky {
    fn failing(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            called_at: Mutex::new(Vec::new()),
        }
    }

    fn always() -> Self {
        Self::failing(usize::MAX)
    }
}

#[async_trait]
impl MessageSender for Flaky {
    async fn send(&self, _message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.called_at.lock().unwrap().push(Instant::now());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(DeliveryError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Panics for one recipient, succeeds for everyone else.
struct PanicsFor(&'static str);

#[async_trait]
impl MessageSender for PanicsFor {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if message.to == self.0 {
            panic!("sender blew up for {}", message.to);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn task(to: &str) -> NotificationTask {
    NotificationTask::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        OutboundMessage {
            to: to.to_string(),
            subject: "Draw result".to_string(),
            html_body: "<p>hi</p>".to_string(),
            text_body: "hi".to_string(),
        },
    )
}

fn tasks(n: usize) -> Vec<NotificationTask> {
    (0..n).map(|i| task(&format!("p{i}@example.com"))).collect()
}

fn config(concurrency: usize, send_delay: Duration) -> DispatcherConfig {
    DispatcherConfig {
        concurrency,
        send_delay,
        ..DispatcherConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Test: every task of a batch is delivered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivers_every_task() {
    let sender = Arc::new(Recorder::default());
    let dispatcher =
        NotificationDispatcher::start(config(2, Duration::from_millis(5)), sender.clone());
    let handle = dispatcher.handle();

    let batch = handle.enqueue(tasks(5));
    let ids = batch.task_ids().to_vec();
    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");

    assert_eq!(report.total, 5);
    assert_eq!(report.delivered, 5);
    assert_eq!(report.failed, 0);
    for id in ids {
        assert_eq!(handle.status(id), Some(DeliveryStatus::Delivered));
    }
    assert_eq!(sender.start_times().len(), 5);

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

// ---------------------------------------------------------------------------
// Test: failures are isolated and never reach the caller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_failures_marked_failed_permanently() {
    let sender = Arc::new(Flaky::always());
    let dispatcher = NotificationDispatcher::start(config(2, Duration::ZERO), sender.clone());
    let handle = dispatcher.handle();

    let batch = handle.enqueue(tasks(20));
    let ids = batch.task_ids().to_vec();
    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");

    assert_eq!(report.failed, 20);
    assert_eq!(report.delivered, 0);
    for id in ids {
        assert_eq!(handle.status(id), Some(DeliveryStatus::FailedPermanently));
    }
    // No retry by default: exactly one attempt per task.
    assert_eq!(sender.attempts.load(Ordering::SeqCst), 20);

    // The dispatcher keeps accepting and processing work afterwards.
    let again = handle.enqueue(tasks(3));
    let report = tokio::time::timeout(TEST_TIMEOUT, again.wait())
        .await
        .expect("second batch should finish");
    assert_eq!(report.failed, 3);

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

#[tokio::test]
async fn panicking_sender_fails_only_that_task() {
    let sender = Arc::new(PanicsFor("boom@example.com"));
    let dispatcher = NotificationDispatcher::start(config(1, Duration::ZERO), sender);
    let handle = dispatcher.handle();

    let boom = task("boom@example.com");
    let boom_id = boom.id;
    let batch = handle.enqueue(vec![
        task("a@example.com"),
        boom,
        task("b@example.com"),
    ]);

    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(handle.status(boom_id), Some(DeliveryStatus::FailedPermanently));

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

// ---------------------------------------------------------------------------
// Test: rate limit and concurrency bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_worker_respects_send_delay() {
    let delay = Duration::from_millis(40);
    let sender = Arc::new(Recorder::default());
    let dispatcher = NotificationDispatcher::start(config(1, delay), sender.clone());

    let batch = dispatcher.handle().enqueue(tasks(4));
    tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");

    let starts = sender.start_times();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        let spacing = pair[1].duration_since(pair[0]);
        assert!(spacing >= delay, "sends only {spacing:?} apart");
    }

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let sender = Arc::new(Recorder::holding(Duration::from_millis(30)));
    let dispatcher = NotificationDispatcher::start(config(2, Duration::ZERO), sender.clone());

    let batch = dispatcher.handle().enqueue(tasks(8));
    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");

    assert_eq!(report.delivered, 8);
    let peak = sender.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

// ---------------------------------------------------------------------------
// Test: retry policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_recovers_transient_failure() {
    let sender = Arc::new(Flaky::failing(2));
    let dispatcher = NotificationDispatcher::start(
        DispatcherConfig {
            concurrency: 1,
            send_delay: Duration::ZERO,
            retry: RetryPolicy {
                backoff: vec![Duration::from_millis(1), Duration::from_millis(1)],
            },
            ..DispatcherConfig::default()
        },
        sender.clone(),
    );

    let batch = dispatcher.handle().enqueue(tasks(1));
    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");

    assert_eq!(report.delivered, 1);
    assert_eq!(sender.attempts.load(Ordering::SeqCst), 3);

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

#[tokio::test]
async fn send_one_gives_up_after_schedule() {
    let sender = Flaky::always();
    let retry = RetryPolicy::exponential(Duration::from_millis(1), 2);

    let result = send_one(&sender, &task("a@example.com"), &retry, Duration::ZERO).await;

    assert!(matches!(result, Err(DeliveryError::Transport(_))));
    assert_eq!(sender.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_respect_send_delay() {
    let delay = Duration::from_millis(60);
    let sender = Arc::new(Flaky::always());
    let dispatcher = NotificationDispatcher::start(
        DispatcherConfig {
            concurrency: 1,
            send_delay: delay,
            retry: RetryPolicy {
                backoff: vec![Duration::from_millis(1), Duration::from_millis(1)],
            },
            ..DispatcherConfig::default()
        },
        sender.clone(),
    );

    let batch = dispatcher.handle().enqueue(tasks(2));
    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("batch should finish");
    assert_eq!(report.failed, 2);

    let calls = sender.called_at.lock().unwrap().clone();
    assert_eq!(calls.len(), 6);
    for pair in calls.windows(2) {
        let spacing = pair[1].duration_since(pair[0]);
        assert!(spacing >= delay, "attempts only {spacing:?} apart");
    }

    dispatcher.shutdown(ShutdownMode::Drain).await;
}

// ---------------------------------------------------------------------------
// Test: batch progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_tracks_progress_before_completion() {
    let sender = Arc::new(Recorder::default());
    let dispatcher =
        NotificationDispatcher::start(config(1, Duration::from_secs(30)), sender.clone());
    let handle = dispatcher.handle();

    let batch = handle.enqueue(tasks(3));
    let first = batch.task_ids()[0];
    tokio::time::timeout(TEST_TIMEOUT, async {
        while handle.status(first) != Some(DeliveryStatus::Delivered) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first task should be delivered");

    // The worker now sits in its 30 s delay with two tasks still queued.
    let report = batch.report();
    assert_eq!(report.total, 3);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.pending(), 2);
    assert!(!report.is_complete());
    assert!(format!("{batch:?}").contains("delivered: 1"));

    dispatcher.shutdown(ShutdownMode::Abandon).await;
    assert_eq!(batch.wait().await.failed, 2);
}

// ---------------------------------------------------------------------------
// Test: shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drain_delivers_everything_queued() {
    let sender = Arc::new(Recorder::default());
    let dispatcher =
        NotificationDispatcher::start(config(1, Duration::from_millis(10)), sender.clone());

    let batch = dispatcher.handle().enqueue(tasks(5));
    tokio::time::timeout(TEST_TIMEOUT, dispatcher.shutdown(ShutdownMode::Drain))
        .await
        .expect("drain should finish");

    let report = batch.wait().await;
    assert_eq!(report.delivered, 5);
    assert_eq!(sender.start_times().len(), 5);
}

#[tokio::test]
async fn abandon_fails_queued_tasks() {
    let sender = Arc::new(Recorder::default());
    let dispatcher =
        NotificationDispatcher::start(config(1, Duration::from_secs(30)), sender.clone());
    let handle = dispatcher.handle();

    let batch = handle.enqueue(tasks(3));
    let ids = batch.task_ids().to_vec();

    // Wait until the first task went out; the worker is then in its delay.
    tokio::time::timeout(TEST_TIMEOUT, async {
        while handle.status(ids[0]) != Some(DeliveryStatus::Delivered) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first task should be delivered");

    tokio::time::timeout(TEST_TIMEOUT, dispatcher.shutdown(ShutdownMode::Abandon))
        .await
        .expect("abandon should not wait for the send delay");

    let report = batch.wait().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(handle.status(ids[2]), Some(DeliveryStatus::FailedPermanently));
}

#[tokio::test]
async fn enqueue_after_shutdown_fails_without_error() {
    let dispatcher =
        NotificationDispatcher::start(config(1, Duration::ZERO), Arc::new(Recorder::default()));
    let handle = dispatcher.handle();
    dispatcher.shutdown(ShutdownMode::Drain).await;

    let batch = handle.enqueue(tasks(2));
    let ids = batch.task_ids().to_vec();
    let report = tokio::time::timeout(TEST_TIMEOUT, batch.wait())
        .await
        .expect("rejected batch resolves immediately");

    assert_eq!(report.failed, 2);
    for id in ids {
        assert_eq!(handle.status(id), Some(DeliveryStatus::FailedPermanently));
    }
}

#[tokio::test]
async fn empty_batch_resolves_immediately() {
    let dispatcher =
        NotificationDispatcher::start(config(1, Duration::ZERO), Arc::new(Recorder::default()));

    let report = dispatcher.handle().enqueue(Vec::new()).wait().await;
    assert_eq!(report.total, 0);
    assert!(report.is_complete());

    dispatcher.shutdown(ShutdownMode::Drain).await;
}
