//! Payload sinks
//!
//! A sink receives every payload from every worker. `accept` is called
//! concurrently from many worker tasks and must return promptly: a slow sink
//! directly slows the polling cadence of whichever worker is calling it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::payload::DevicePayload;

/// Consumer of normalized payloads.
pub trait PayloadSink: Send + Sync {
    fn accept(&self, payload: DevicePayload);
}

/// Forwards payloads to an unbounded tokio channel.
///
/// Payloads are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<DevicePayload>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DevicePayload>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: mpsc::UnboundedSender<DevicePayload>) -> Self {
        Self { sender }
    }
}

impl PayloadSink for ChannelSink {
    fn accept(&self, payload: DevicePayload) {
        if let Err(e) = self.sender.send(payload) {
            tracing::debug!(device_id = %e.0.device_id(), "payload receiver dropped");
        }
    }
}

/// What a [`BoundedSink`] does when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the incoming payload
    DropNewest,
    /// Evict the oldest queued payload to make room
    DropOldest,
}

struct BoundedShared {
    queue: Mutex<VecDeque<DevicePayload>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
    senders: AtomicUsize,
}

/// Fixed-capacity queue in front of a slow consumer.
///
/// `accept` never blocks; overflow is resolved by [`OverflowPolicy`] and
/// counted.
pub struct BoundedSink {
    shared: Arc<BoundedShared>,
}

/// Receiving half of a [`BoundedSink`].
pub struct BoundedReceiver {
    shared: Arc<BoundedShared>,
}

impl BoundedSink {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> (Self, BoundedReceiver) {
        let capacity = capacity.max(1);
        let shared = Arc::new(BoundedShared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
            senders: AtomicUsize::new(1),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            BoundedReceiver { shared },
        )
    }

    /// Payloads discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for BoundedSink {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for BoundedSink {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.notify.notify_waiters();
        }
    }
}

impl PayloadSink for BoundedSink {
    fn accept(&self, payload: DevicePayload) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                match self.shared.policy {
                    OverflowPolicy::DropNewest => {
                        tracing::debug!(device_id = %payload.device_id(), "sink full, dropping payload");
                        return;
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(evicted) = queue.pop_front() {
                            tracing::debug!(device_id = %evicted.device_id(), "sink full, evicting oldest payload");
                        }
                    }
                }
            }
            queue.push_back(payload);
        }
        self.shared.notify.notify_one();
    }
}

impl BoundedReceiver {
    /// Wait for the next payload. Returns `None` once every sink handle is
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<DevicePayload> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.shared.queue.lock().pop_front() {
                return Some(payload);
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                return None;
            }

            notified.await;
        }
    }

    pub fn try_recv(&mut self) -> Option<DevicePayload> {
        self.shared.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Emits each payload as an info-level tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl PayloadSink for LogSink {
    fn accept(&self, payload: DevicePayload) {
        let parameters = serde_json::to_string(payload.parameters()).unwrap_or_default();
        tracing::info!(
            device_id = %payload.device_id(),
            address = payload.device_address(),
            is_error = payload.is_error(),
            is_on = payload.is_on(),
            %parameters,
            "device payload"
        );
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(DevicePayload) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> PayloadSink for FnSink<F>
where
    F: Fn(DevicePayload) + Send + Sync,
{
    fn accept(&self, payload: DevicePayload) {
        (self.0)(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::types::DeviceId;
    use chrono::Utc;

    fn payload(id: &str) -> DevicePayload {
        DevicePayload::from_fault(
            DeviceId::new(id),
            "10.0.0.1",
            &Fault::Timeout("read".to_string()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.accept(payload("a"));
        assert_eq!(rx.recv().await.unwrap().device_id().as_str(), "a");

        drop(rx);
        // Receiver gone: accept must not panic
        sink.accept(payload("b"));
    }

    #[tokio::test]
    async fn test_bounded_sink_drop_newest() {
        let (sink, mut rx) = BoundedSink::new(2, OverflowPolicy::DropNewest);
        sink.accept(payload("1"));
        sink.accept(payload("2"));
        sink.accept(payload("3"));

        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().await.unwrap().device_id().as_str(), "1");
        assert_eq!(rx.recv().await.unwrap().device_id().as_str(), "2");
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_bounded_sink_drop_oldest() {
        let (sink, mut rx) = BoundedSink::new(2, OverflowPolicy::DropOldest);
        sink.accept(payload("1"));
        sink.accept(payload("2"));
        sink.accept(payload("3"));

        assert_eq!(rx.dropped(), 1);
        assert_eq!(rx.recv().await.unwrap().device_id().as_str(), "2");
        assert_eq!(rx.recv().await.unwrap().device_id().as_str(), "3");
    }

    #[tokio::test]
    async fn test_bounded_receiver_ends_when_senders_dropped() {
        let (sink, mut rx) = BoundedSink::new(4, OverflowPolicy::DropNewest);
        let clone = sink.clone();
        clone.accept(payload("x"));
        drop(sink);
        drop(clone);

        assert_eq!(rx.recv().await.unwrap().device_id().as_str(), "x");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_bounded_receiver_wakes_on_accept() {
        let (sink, mut rx) = BoundedSink::new(4, OverflowPolicy::DropNewest);
        let handle = tokio::spawn(async move { rx.recv().await });

        tokio::task::yield_now().await;
        sink.accept(payload("late"));

        let received = handle.await.unwrap().unwrap();
        assert_eq!(received.device_id().as_str(), "late");
    }

    #[test]
    fn test_fn_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let sink = FnSink::new(move |p: DevicePayload| recorder.lock().push(p));

        sink.accept(payload("ap-1"));
        assert_eq!(seen.lock().len(), 1);
    }
}
