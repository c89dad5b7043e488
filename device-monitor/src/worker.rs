//! Poll worker
//!
//! A worker owns exactly one adapter and runs a fixed loop on its own tokio
//! task: fetch, normalize, hand to the sink, wait. The stop flag is the only
//! control state shared with the supervisor; everything else in
//! [`WorkerShared`] is written by the loop and read for statistics.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::adapter::DeviceAdapter;
use crate::error::{Fault, MonitorError, Result};
use crate::payload::DevicePayload;
use crate::sink::PayloadSink;
use crate::types::{DeviceId, PollInterval};

/// Lifecycle of a worker. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Result of a successful `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Monotonic stop flag with a wake-up for the inter-poll wait.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub(crate) fn trigger(&self) {
        self.requested.store(true, Ordering::Release);
        // The loop is the only waiter; notify_one stores a permit if it is
        // not parked yet.
        self.notify.notify_one();
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless stopped first. Returns true if a stop was
    /// requested.
    pub(crate) async fn wait(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
        self.is_triggered()
    }
}

#[derive(Debug)]
pub(crate) struct WorkerShared {
    state: Mutex<WorkerState>,
    stop: StopSignal,
    exited: Notify,
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_poll: Mutex<Option<DateTime<Utc>>>,
    poll_count: AtomicU64,
    error_count: AtomicU64,
    consecutive_errors: AtomicU32,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Idle),
            stop: StopSignal::default(),
            exited: Notify::new(),
            started_at: Mutex::new(None),
            last_poll: Mutex::new(None),
            poll_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
        }
    }

    fn mark_stopped(&self) {
        *self.state.lock() = WorkerState::Stopped;
        self.exited.notify_waiters();
    }

    /// Resolve once no loop is running for this worker.
    pub(crate) async fn wait_stopped(&self) {
        loop {
            let notified = self.exited.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if *self.state.lock() != WorkerState::Running {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, payload: &DevicePayload) {
        self.poll_count.fetch_add(1, Ordering::Relaxed);
        *self.last_poll.lock() = Some(payload.timestamp());
        if payload.is_error() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.consecutive_errors.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of a worker's counters
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub device_id: DeviceId,
    pub address: String,
    pub device_class: String,
    pub state: WorkerState,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub last_poll: Option<DateTime<Utc>>,
    pub poll_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// One device's independent poll loop.
pub struct PollWorker {
    device_id: DeviceId,
    address: String,
    device_class: String,
    interval: PollInterval,
    sink: Arc<dyn PayloadSink>,
    shared: Arc<WorkerShared>,
    adapter: Mutex<Option<Box<dyn DeviceAdapter>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollWorker {
    /// Create an idle worker. Nothing is polled until [`PollWorker::start`].
    pub fn new(
        device_id: DeviceId,
        adapter: Box<dyn DeviceAdapter>,
        interval: PollInterval,
        sink: Arc<dyn PayloadSink>,
    ) -> Self {
        Self {
            address: adapter.address().to_string(),
            device_class: adapter.device_class().to_string(),
            device_id,
            interval,
            sink,
            shared: Arc::new(WorkerShared::new()),
            adapter: Mutex::new(Some(adapter)),
            handle: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn interval(&self) -> PollInterval {
        self.interval
    }

    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock()
    }

    /// True once `stop` has been called, even if the loop has not exited yet.
    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop.is_triggered()
    }

    /// Spawn the poll loop on the current tokio runtime.
    ///
    /// Idempotent while running. A stopped worker cannot be restarted.
    pub fn start(&self) -> Result<StartOutcome> {
        let mut state = self.shared.state.lock();
        match *state {
            WorkerState::Running => return Ok(StartOutcome::AlreadyRunning),
            WorkerState::Stopped => return Err(MonitorError::WorkerStopped(self.device_id.clone())),
            WorkerState::Idle => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MonitorError::NoRuntime(e.to_string()))?;
        let adapter = self
            .adapter
            .lock()
            .take()
            .ok_or_else(|| MonitorError::WorkerStopped(self.device_id.clone()))?;

        *state = WorkerState::Running;
        *self.shared.started_at.lock() = Some(Utc::now());

        let context = LoopContext {
            device_id: self.device_id.clone(),
            address: self.address.clone(),
            interval: self.interval,
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
        };
        *self.handle.lock() = Some(runtime.spawn(poll_loop(context, adapter)));

        Ok(StartOutcome::Started)
    }

    /// Request the loop to stop at its next checkpoint.
    ///
    /// Never interrupts a fetch already in flight. An idle worker becomes
    /// stopped immediately and releases its adapter.
    pub fn stop(&self) {
        self.shared.stop.trigger();

        let mut state = self.shared.state.lock();
        if *state == WorkerState::Idle {
            *state = WorkerState::Stopped;
            self.adapter.lock().take();
        }
    }

    /// Detach the loop's task handle so it can be awaited without holding
    /// a reference to the worker.
    pub fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().take()
    }

    /// Wait for the loop task to exit. Returns immediately if it never started
    /// or has already exited.
    pub async fn join(&self) {
        if let Some(handle) = self.take_handle() {
            if let Err(e) = handle.await {
                tracing::error!(device_id = %self.device_id, error = %e, "poll worker task failed");
            }
        }
        self.shared.wait_stopped().await;
    }

    pub(crate) fn shared(&self) -> Arc<WorkerShared> {
        Arc::clone(&self.shared)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            device_id: self.device_id.clone(),
            address: self.address.clone(),
            device_class: self.device_class.clone(),
            state: self.state(),
            interval: self.interval.as_duration(),
            started_at: *self.shared.started_at.lock(),
            last_poll: *self.shared.last_poll.lock(),
            poll_count: self.shared.poll_count.load(Ordering::Relaxed),
            error_count: self.shared.error_count.load(Ordering::Relaxed),
            consecutive_errors: self.shared.consecutive_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        // Detached loops still exit at their next checkpoint
        self.shared.stop.trigger();
    }
}

impl fmt::Debug for PollWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollWorker")
            .field("device_id", &self.device_id)
            .field("address", &self.address)
            .field("device_class", &self.device_class)
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish()
    }
}

/// Marks the worker stopped however the loop exits, unwinding included.
struct ExitGuard {
    device_id: DeviceId,
    shared: Arc<WorkerShared>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(device_id = %self.device_id, "poll worker panicked");
        }
        self.shared.stop.trigger();
        self.shared.mark_stopped();
    }
}

struct LoopContext {
    device_id: DeviceId,
    address: String,
    interval: PollInterval,
    sink: Arc<dyn PayloadSink>,
    shared: Arc<WorkerShared>,
}

async fn poll_loop(context: LoopContext, mut adapter: Box<dyn DeviceAdapter>) {
    let LoopContext {
        device_id,
        address,
        interval,
        sink,
        shared,
    } = context;
    let _exit = ExitGuard {
        device_id: device_id.clone(),
        shared: Arc::clone(&shared),
    };

    tracing::info!(
        device_id = %device_id,
        address = %address,
        interval = %interval,
        "poll worker started"
    );

    while !shared.stop.is_triggered() {
        let (payload, fault) = poll_once(&device_id, &address, adapter.as_mut()).await;
        shared.record(&payload);

        let device_reported = fault.is_none() && payload.is_error();
        sink.accept(payload);

        if let Some(fault) = fault {
            tracing::warn!(
                device_id = %device_id,
                address = %address,
                fault = %fault.kind(),
                error = %fault,
                "device poll failed"
            );
        } else if device_reported {
            tracing::warn!(
                device_id = %device_id,
                address = %address,
                fault = "device_reported",
                "device reports a fault condition"
            );
        }

        if shared.stop.wait(interval.as_duration()).await {
            break;
        }
    }

    tracing::info!(device_id = %device_id, address = %address, "poll worker stopped");
}

/// One fetch/normalize cycle. Never fails: faults become error payloads.
pub(crate) async fn poll_once(
    device_id: &DeviceId,
    address: &str,
    adapter: &mut dyn DeviceAdapter,
) -> (DevicePayload, Option<Fault>) {
    match adapter.fetch().await {
        Ok(state) => {
            let parameters = adapter.canonical_parameters(&state);
            let payload =
                DevicePayload::from_state(device_id.clone(), address, &state, parameters, Utc::now());
            (payload, None)
        }
        Err(fault) => {
            let payload = DevicePayload::from_fault(device_id.clone(), address, &fault, Utc::now());
            (payload, Some(fault))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeviceState;
    use crate::sink::{ChannelSink, FnSink};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct Scripted {
        outcomes: VecDeque<std::result::Result<DeviceState, Fault>>,
    }

    #[async_trait]
    impl DeviceAdapter for Scripted {
        fn device_class(&self) -> &str {
            "scripted"
        }

        fn address(&self) -> &str {
            "10.0.0.9"
        }

        async fn fetch(&mut self) -> std::result::Result<DeviceState, Fault> {
            self.outcomes
                .pop_front()
                .unwrap_or_else(|| Ok(DeviceState::new(true)))
        }
    }

    fn worker_with(
        outcomes: Vec<std::result::Result<DeviceState, Fault>>,
    ) -> (PollWorker, tokio::sync::mpsc::UnboundedReceiver<DevicePayload>) {
        let (sink, rx) = ChannelSink::new();
        let worker = PollWorker::new(
            DeviceId::new("dev-1"),
            Box::new(Scripted {
                outcomes: outcomes.into(),
            }),
            PollInterval::from_minutes(1).unwrap(),
            Arc::new(sink),
        );
        (worker, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_interrupts_wait() {
        let signal = Arc::new(StopSignal::default());
        let waiter = Arc::clone(&signal);
        let task = tokio::spawn(async move { waiter.wait(Duration::from_secs(3600)).await });

        tokio::task::yield_now().await;
        signal.trigger();

        let stopped = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("wait should end promptly")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_times_out() {
        let signal = StopSignal::default();
        assert!(!signal.wait(Duration::from_secs(5)).await);

        signal.trigger();
        assert!(signal.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (worker, mut rx) = worker_with(vec![]);
        assert_eq!(worker.state(), WorkerState::Idle);

        assert_eq!(worker.start().unwrap(), StartOutcome::Started);
        assert_eq!(worker.start().unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(worker.state(), WorkerState::Running);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_ok());
        // A second loop would have produced a second payload by now
        assert!(rx.try_recv().is_err());

        worker.stop();
        worker.join().await;
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_worker_cannot_restart() {
        let (worker, _rx) = worker_with(vec![]);
        worker.start().unwrap();
        worker.stop();
        worker.join().await;

        assert!(matches!(
            worker.start(),
            Err(MonitorError::WorkerStopped(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_idle_worker() {
        let (worker, mut rx) = worker_with(vec![]);
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.is_stop_requested());
        assert!(worker.start().is_err());
        worker.join().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_start_outside_runtime() {
        let (worker, _rx) = worker_with(vec![]);
        assert!(matches!(worker.start(), Err(MonitorError::NoRuntime(_))));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_track_errors() {
        let (worker, mut rx) = worker_with(vec![
            Err(Fault::Transport("refused".to_string())),
            Err(Fault::Timeout("read".to_string())),
            Ok(DeviceState::new(true)),
        ]);
        worker.start().unwrap();

        // Polls at t=0, 60s and 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        worker.stop();
        worker.join().await;

        let stats = worker.stats();
        assert_eq!(stats.poll_count, 3);
        assert_eq!(stats.error_count, 2);
        assert_eq!(stats.consecutive_errors, 0);
        assert_eq!(stats.device_class, "scripted");
        assert!(stats.last_poll.is_some());

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sink_marks_worker_stopped() {
        let worker = PollWorker::new(
            DeviceId::new("dev-1"),
            Box::new(Scripted {
                outcomes: VecDeque::new(),
            }),
            PollInterval::from_minutes(1).unwrap(),
            Arc::new(FnSink::new(|_: DevicePayload| panic!("sink rejected payload"))),
        );
        worker.start().unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.is_stop_requested());
        assert_eq!(worker.stats().poll_count, 1);

        // The panic is reported through the join handle, not propagated
        worker.join().await;
        assert!(matches!(
            worker.start(),
            Err(MonitorError::WorkerStopped(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_without_handle_waits_for_exit() {
        let (worker, _rx) = worker_with(vec![]);
        worker.start().unwrap();
        let handle = worker.take_handle().unwrap();

        worker.stop();
        // Handle already detached; join still waits for the loop to exit
        worker.join().await;
        assert_eq!(worker.state(), WorkerState::Stopped);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_once_maps_fault() {
        let mut adapter = Scripted {
            outcomes: vec![Err(Fault::MalformedResponse("eof".to_string()))].into(),
        };
        let (payload, fault) = poll_once(&DeviceId::new("x"), "10.0.0.9", &mut adapter).await;
        assert!(payload.is_error());
        assert!(payload.parameters().is_empty());
        assert_eq!(fault, Some(Fault::MalformedResponse("eof".to_string())));
    }
}
