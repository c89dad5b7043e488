//! Monitor supervisor
//!
//! Owns one [`PollWorker`] per registered device and is the single point of
//! lifecycle control. The supervisor never talks to devices itself.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use device_inventory::DeviceDescriptor;
use device_rpc::RpcClient;

use crate::adapter::{build_adapter, DeviceAdapter};
use crate::error::{MonitorError, Result};
use crate::sink::PayloadSink;
use crate::types::{DeviceId, PollInterval};
use crate::worker::{PollWorker, StartOutcome, WorkerState, WorkerStats};

/// Per-device outcome of [`MonitorSupervisor::start_all`].
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<DeviceId>,
    pub already_running: Vec<DeviceId>,
    pub failed: Vec<(DeviceId, MonitorError)>,
}

impl StartReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fleet of poll workers sharing one sink.
pub struct MonitorSupervisor {
    workers: DashMap<DeviceId, PollWorker>,
    sink: Arc<dyn PayloadSink>,
}

impl MonitorSupervisor {
    pub fn new<S>(sink: S) -> Self
    where
        S: PayloadSink + 'static,
    {
        Self::with_shared_sink(Arc::new(sink))
    }

    /// Use a sink that is also held elsewhere
    pub fn with_shared_sink(sink: Arc<dyn PayloadSink>) -> Self {
        Self {
            workers: DashMap::new(),
            sink,
        }
    }

    /// Create an idle worker for `device_id`.
    pub fn register<A>(&self, device_id: DeviceId, adapter: A, interval: PollInterval) -> Result<()>
    where
        A: DeviceAdapter + 'static,
    {
        self.register_boxed(device_id, Box::new(adapter), interval)
    }

    pub fn register_boxed(
        &self,
        device_id: DeviceId,
        adapter: Box<dyn DeviceAdapter>,
        interval: PollInterval,
    ) -> Result<()> {
        if device_id.as_str().trim().is_empty() {
            return Err(MonitorError::Configuration(
                "device id must not be empty".to_string(),
            ));
        }

        match self.workers.entry(device_id) {
            Entry::Occupied(entry) => Err(MonitorError::DuplicateDevice(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(
                    device_id = %entry.key(),
                    address = adapter.address(),
                    class = adapter.device_class(),
                    interval = %interval,
                    "registered device"
                );
                let worker = PollWorker::new(
                    entry.key().clone(),
                    adapter,
                    interval,
                    Arc::clone(&self.sink),
                );
                entry.insert(worker);
                Ok(())
            }
        }
    }

    /// Register an inventory entry with the adapter for its device class.
    pub fn register_descriptor(
        &self,
        descriptor: &DeviceDescriptor,
        client: &RpcClient,
    ) -> Result<()> {
        descriptor.validate()?;
        let interval = PollInterval::from_minutes(descriptor.poll_interval_minutes)?;
        self.register_boxed(
            DeviceId::new(descriptor.id.clone()),
            build_adapter(descriptor, client),
            interval,
        )
    }

    pub fn start(&self, device_id: &DeviceId) -> Result<StartOutcome> {
        let worker = self
            .workers
            .get(device_id)
            .ok_or_else(|| MonitorError::UnknownDevice(device_id.clone()))?;
        worker.start()
    }

    /// Start every registered worker. One failure never prevents the others
    /// from starting.
    pub fn start_all(&self) -> StartReport {
        let mut report = StartReport::default();
        for device_id in self.device_ids() {
            match self.start(&device_id) {
                Ok(StartOutcome::Started) => report.started.push(device_id),
                Ok(StartOutcome::AlreadyRunning) => report.already_running.push(device_id),
                Err(e) => {
                    tracing::warn!(device_id = %device_id, error = %e, "failed to start worker");
                    report.failed.push((device_id, e));
                }
            }
        }

        tracing::info!(
            started = report.started.len(),
            already_running = report.already_running.len(),
            failed = report.failed.len(),
            "started poll workers"
        );
        report
    }

    /// Signal one worker to stop. Does not wait for its loop to exit.
    pub fn stop(&self, device_id: &DeviceId) -> Result<()> {
        let worker = self
            .workers
            .get(device_id)
            .ok_or_else(|| MonitorError::UnknownDevice(device_id.clone()))?;
        worker.stop();
        Ok(())
    }

    /// Signal every worker to stop. Returns the number signalled.
    pub fn stop_all(&self) -> usize {
        let mut count = 0;
        for worker in self.workers.iter() {
            worker.stop();
            count += 1;
        }
        count
    }

    /// Stop a worker, wait for its loop to exit, then remove it so the id can
    /// be registered again.
    ///
    /// The id stays registered while a fetch is still in flight, so the
    /// device never has two running loops.
    pub async fn deregister(&self, device_id: &DeviceId) -> Result<PollWorker> {
        let (handle, shared) = {
            let worker = self
                .workers
                .get(device_id)
                .ok_or_else(|| MonitorError::UnknownDevice(device_id.clone()))?;
            worker.stop();
            (worker.take_handle(), worker.shared())
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(device_id = %device_id, error = %e, "poll worker task failed");
            }
        }
        shared.wait_stopped().await;

        // Only remove the worker that was stopped above
        let (_, worker) = self
            .workers
            .remove_if(device_id, |_, w| Arc::ptr_eq(&w.shared(), &shared))
            .ok_or_else(|| MonitorError::UnknownDevice(device_id.clone()))?;
        tracing::debug!(device_id = %device_id, "deregistered device");
        Ok(worker)
    }

    /// Registered ids, sorted.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.workers.iter().map(|w| w.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.workers.contains_key(device_id)
    }

    pub fn state(&self, device_id: &DeviceId) -> Option<WorkerState> {
        self.workers.get(device_id).map(|w| w.state())
    }

    pub fn worker_stats(&self, device_id: &DeviceId) -> Option<WorkerStats> {
        self.workers.get(device_id).map(|w| w.stats())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn stats(&self) -> SupervisorStats {
        let mut workers: Vec<WorkerStats> = self.workers.iter().map(|w| w.stats()).collect();
        workers.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let count = |state: WorkerState| workers.iter().filter(|w| w.state == state).count();
        SupervisorStats {
            total_workers: workers.len(),
            idle: count(WorkerState::Idle),
            running: count(WorkerState::Running),
            stopped: count(WorkerState::Stopped),
            workers,
        }
    }

    /// Stop every worker and wait for all loops to exit.
    pub async fn shutdown(&self) {
        let signalled = self.stop_all();
        tracing::info!(workers = signalled, "shutting down monitor");

        // Handles are taken first so no map guard is held across an await
        let handles: Vec<_> = self
            .workers
            .iter()
            .filter_map(|w| w.take_handle().map(|h| (w.key().clone(), h)))
            .collect();

        for (device_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(device_id = %device_id, error = %e, "poll worker task failed");
            }
        }

        let shared: Vec<_> = self.workers.iter().map(|w| w.shared()).collect();
        for worker in shared {
            worker.wait_stopped().await;
        }
        tracing::info!("monitor shutdown complete");
    }
}

impl fmt::Debug for MonitorSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSupervisor")
            .field("devices", &self.device_ids())
            .finish()
    }
}

/// Fleet-wide snapshot
#[derive(Debug, Clone)]
pub struct SupervisorStats {
    pub total_workers: usize,
    pub idle: usize,
    pub running: usize,
    pub stopped: usize,
    pub workers: Vec<WorkerStats>,
}

impl fmt::Display for SupervisorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Monitor Stats:")?;
        writeln!(
            f,
            "  Workers: {} ({} running, {} idle, {} stopped)",
            self.total_workers, self.running, self.idle, self.stopped
        )?;

        if !self.workers.is_empty() {
            writeln!(f, "  Devices:")?;
            for stat in &self.workers {
                writeln!(
                    f,
                    "    {}: {} {} {} (interval: {:?}, polls: {}, errors: {})",
                    stat.device_id,
                    stat.device_class,
                    stat.address,
                    stat.state,
                    stat.interval,
                    stat.poll_count,
                    stat.error_count
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::DeviceState;
    use crate::error::Fault;
    use crate::sink::ChannelSink;
    use async_trait::async_trait;
    use device_inventory::{Credential, DeviceClass};

    struct AlwaysOn;

    #[async_trait]
    impl DeviceAdapter for AlwaysOn {
        fn device_class(&self) -> &str {
            "test"
        }

        fn address(&self) -> &str {
            "127.0.0.1"
        }

        async fn fetch(&mut self) -> std::result::Result<DeviceState, Fault> {
            Ok(DeviceState::new(true))
        }
    }

    fn supervisor() -> MonitorSupervisor {
        let (sink, _rx) = ChannelSink::new();
        MonitorSupervisor::new(sink)
    }

    fn minutes(m: u32) -> PollInterval {
        PollInterval::from_minutes(m).unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty_ids() {
        let supervisor = supervisor();
        supervisor
            .register(DeviceId::new("ap-1"), AlwaysOn, minutes(1))
            .unwrap();

        let err = supervisor
            .register(DeviceId::new("ap-1"), AlwaysOn, minutes(5))
            .unwrap_err();
        assert!(matches!(err, MonitorError::DuplicateDevice(id) if id.as_str() == "ap-1"));

        let stats = supervisor.worker_stats(&DeviceId::new("ap-1")).unwrap();
        assert_eq!(stats.interval, minutes(1).as_duration());

        assert!(matches!(
            supervisor.register(DeviceId::new("  "), AlwaysOn, minutes(1)),
            Err(MonitorError::Configuration(_))
        ));
        assert_eq!(supervisor.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_device_operations() {
        let supervisor = supervisor();
        let missing = DeviceId::new("nope");
        assert!(matches!(
            supervisor.stop(&missing),
            Err(MonitorError::UnknownDevice(_))
        ));
        assert!(matches!(
            supervisor.start(&missing),
            Err(MonitorError::UnknownDevice(_))
        ));
        assert!(matches!(
            supervisor.deregister(&missing).await,
            Err(MonitorError::UnknownDevice(_))
        ));
        assert_eq!(supervisor.state(&missing), None);
    }

    #[test]
    fn test_start_all_outside_runtime_reports_failures() {
        let supervisor = supervisor();
        supervisor
            .register(DeviceId::new("a"), AlwaysOn, minutes(1))
            .unwrap();
        supervisor
            .register(DeviceId::new("b"), AlwaysOn, minutes(1))
            .unwrap();

        let report = supervisor.start_all();
        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(supervisor.state(&DeviceId::new("a")), Some(WorkerState::Idle));
    }

    #[test]
    fn test_register_descriptor() {
        let supervisor = supervisor();
        let client = RpcClient::new();
        let descriptor = DeviceDescriptor::new(
            "hum-1",
            "192.168.1.63",
            Credential::new("token"),
            DeviceClass::Humidifier,
            5,
        )
        .unwrap();

        supervisor.register_descriptor(&descriptor, &client).unwrap();
        let stats = supervisor.worker_stats(&DeviceId::new("hum-1")).unwrap();
        assert_eq!(stats.device_class, "humidifier");
        assert_eq!(stats.address, "192.168.1.63");
        assert_eq!(stats.interval, minutes(5).as_duration());

        assert!(supervisor.register_descriptor(&descriptor, &client).is_err());
    }

    #[test]
    fn test_stats_display() {
        let supervisor = supervisor();
        supervisor
            .register(DeviceId::new("ap-1"), AlwaysOn, minutes(1))
            .unwrap();
        supervisor
            .register(DeviceId::new("hum-1"), AlwaysOn, minutes(2))
            .unwrap();
        supervisor.stop(&DeviceId::new("hum-1")).unwrap();

        let stats = supervisor.stats();
        assert_eq!(stats.total_workers, 2);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.stopped, 1);

        let text = stats.to_string();
        assert!(text.contains("Workers: 2 (0 running, 1 idle, 1 stopped)"));
        assert!(text.contains("ap-1: test 127.0.0.1 idle"));
        assert!(text.contains("hum-1: test 127.0.0.1 stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_joins_all_workers() {
        let supervisor = supervisor();
        for id in ["a", "b", "c"] {
            supervisor
                .register(DeviceId::new(id), AlwaysOn, minutes(1))
                .unwrap();
        }

        let report = supervisor.start_all();
        assert_eq!(report.started.len(), 3);
        assert_eq!(supervisor.start_all().already_running.len(), 3);

        supervisor.shutdown().await;
        for id in supervisor.device_ids() {
            assert_eq!(supervisor.state(&id), Some(WorkerState::Stopped));
        }
    }
}
