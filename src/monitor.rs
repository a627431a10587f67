use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::client::{ControlPlaneClient, HttpControlPlane};
use crate::api::models::{DeviceStatusReport, heartbeat_timestamp};
use crate::enforcement::{EnforcementState, LockController, Transition};
use crate::platform::{self, PlatformLock};
use crate::schedule;
use crate::scheduler::PollingScheduler;

/// Read-only view of the last completed cycle, published for display
/// surfaces. Eventually consistent; never the live enforcement state.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub is_locked: bool,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Cloneable read handle for the published snapshot
#[derive(Clone)]
pub struct StatusHandle(Arc<RwLock<StatusSnapshot>>);

impl StatusHandle {
    pub async fn get(&self) -> StatusSnapshot {
        self.0.read().await.clone()
    }
}

/// The enforcement orchestrator: one sequential cycle at a time, the
/// only owner of `EnforcementState`.
pub struct Monitor<C, L> {
    device_id: Option<String>,
    client: C,
    lock: L,
    state: EnforcementState,
    status: Arc<RwLock<StatusSnapshot>>,
}

impl<C, L> Monitor<C, L>
where
    C: ControlPlaneClient,
    L: LockController,
{
    pub fn new(device_id: Option<String>, client: C, lock: L) -> Self {
        Self {
            device_id,
            client,
            lock,
            state: EnforcementState::new(),
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
        }
    }

    /// Handle for reading the published snapshot
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle(self.status.clone())
    }

    /// Run one enforcement cycle at the current wall-clock time
    pub async fn run_cycle(&mut self) {
        self.run_cycle_at(Local::now()).await;
    }

    /// Run one enforcement cycle, evaluating schedules at `now`.
    ///
    /// No failure in here may escape: configuration gaps skip the cycle,
    /// transport and lock errors are logged and isolated, and the
    /// heartbeat fires whenever the cycle ran at all.
    pub async fn run_cycle_at(&mut self, now: DateTime<Local>) {
        let Some(device_id) = self.device_id.clone() else {
            debug!("No device identifier configured; skipping cycle");
            return;
        };

        if !self.lock.has_enforcement_capability() {
            warn!("Enforcement capability not granted; skipping cycle");
            return;
        }

        match self.client.fetch_schedules(&device_id).await {
            Ok(schedules) => {
                let active = schedule::any_active(&schedules, now);

                match self.state.transition(active) {
                    Some(Transition::Engage) => match self.lock.lock_now() {
                        Ok(()) => {
                            self.state.mark_locked();
                            info!("Device locked; restriction schedule active");
                            self.report_status(&device_id, true).await;
                        }
                        Err(e) => {
                            // Do not mark locked; next cycle retries
                            error!("Failed to lock device: {:#}", e);
                        }
                    },
                    Some(Transition::DisengageNotify) => {
                        // No unlock capability exists; the report tells the
                        // control plane the window has ended
                        info!("All schedules ended; device can be unlocked");
                        self.report_status(&device_id, false).await;
                        self.state.mark_unlocked();
                    }
                    None => {
                        debug!(
                            "Enforcement state unchanged (locked={})",
                            self.state.is_locked()
                        );
                    }
                }
            }
            Err(e) => {
                warn!("Failed to fetch schedules: {:#}", e);
            }
        }

        if let Err(e) = self
            .client
            .heartbeat(&device_id, heartbeat_timestamp(Utc::now()))
            .await
        {
            warn!("Heartbeat failed: {:#}", e);
        }

        self.publish_snapshot().await;
    }

    async fn report_status(&self, device_id: &str, is_locked: bool) {
        let report = DeviceStatusReport::now(device_id, is_locked, platform::battery_level());

        if let Err(e) = self.client.report_status(device_id, &report).await {
            warn!("Failed to report device status: {:#}", e);
        }
    }

    async fn publish_snapshot(&self) {
        let mut snapshot = self.status.write().await;
        snapshot.is_locked = self.state.is_locked();
        snapshot.last_cycle = Some(Utc::now());
    }

    /// Run cycles until `stop` signals, observed at the sleep boundary
    pub async fn run(mut self, scheduler: PollingScheduler, mut stop: watch::Receiver<bool>) {
        info!("Monitor loop started");

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = scheduler.sleep_until_next_poll() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Monitor loop stopped");
    }
}

/// Monitor backed by the real control plane and platform lock
pub type PlatformMonitor = Monitor<HttpControlPlane, PlatformLock>;

/// A running monitor loop.
///
/// Exactly one per device-agent process; a replacement loop must go
/// through `stop()` (which awaits the task) before being spawned, so two
/// loops never race on enforcement state.
pub struct MonitorTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
    status: StatusHandle,
}

impl MonitorTask {
    /// Spawn the monitor loop on the runtime
    pub fn spawn(monitor: PlatformMonitor, scheduler: PollingScheduler) -> Self {
        let status = monitor.status_handle();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(scheduler, stop_rx));

        Self {
            stop: stop_tx,
            handle,
            status,
        }
    }

    /// Handle for reading the published snapshot
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Stop at the next sleep boundary and wait for the loop to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            error!("Monitor task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{DeviceRegistration, Schedule};
    use anyhow::Result;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeClient(Arc<FakeClientInner>);

    #[derive(Default)]
    struct FakeClientInner {
        /// `None` simulates a transport failure
        schedules: Mutex<Option<Vec<Schedule>>>,
        reports: Mutex<Vec<DeviceStatusReport>>,
        heartbeats: AtomicUsize,
    }

    impl FakeClient {
        fn set_schedules(&self, schedules: Option<Vec<Schedule>>) {
            *self.0.schedules.lock().unwrap() = schedules;
        }

        fn reports(&self) -> Vec<DeviceStatusReport> {
            self.0.reports.lock().unwrap().clone()
        }

        fn heartbeats(&self) -> usize {
            self.0.heartbeats.load(Ordering::SeqCst)
        }
    }

    impl ControlPlaneClient for FakeClient {
        async fn fetch_schedules(&self, _device_id: &str) -> Result<Vec<Schedule>> {
            match self.0.schedules.lock().unwrap().clone() {
                Some(schedules) => Ok(schedules),
                None => anyhow::bail!("simulated transport failure"),
            }
        }

        async fn report_status(
            &self,
            _device_id: &str,
            report: &DeviceStatusReport,
        ) -> Result<()> {
            self.0.reports.lock().unwrap().push(report.clone());
            Ok(())
        }

        async fn heartbeat(&self, _device_id: &str, _timestamp_ms: i64) -> Result<()> {
            self.0.heartbeats.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn register_device(&self, _registration: &DeviceRegistration) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FakeLock(Arc<FakeLockInner>);

    struct FakeLockInner {
        capability: AtomicBool,
        fail: AtomicBool,
        lock_calls: AtomicUsize,
    }

    impl FakeLock {
        fn new() -> Self {
            Self(Arc::new(FakeLockInner {
                capability: AtomicBool::new(true),
                fail: AtomicBool::new(false),
                lock_calls: AtomicUsize::new(0),
            }))
        }

        fn revoke_capability(&self) {
            self.0.capability.store(false, Ordering::SeqCst);
        }

        fn fail_locks(&self, fail: bool) {
            self.0.fail.store(fail, Ordering::SeqCst);
        }

        fn lock_calls(&self) -> usize {
            self.0.lock_calls.load(Ordering::SeqCst)
        }
    }

    impl LockController for FakeLock {
        fn lock_now(&self) -> Result<()> {
            self.0.lock_calls.fetch_add(1, Ordering::SeqCst);
            if self.0.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated lock failure");
            }
            Ok(())
        }

        fn has_enforcement_capability(&self) -> bool {
            self.0.capability.load(Ordering::SeqCst)
        }
    }

    /// A schedule that is active at any instant (all days, full day)
    fn always_active() -> Schedule {
        Schedule {
            id: 1,
            name: "All day".to_string(),
            start_time: "00:00".to_string(),
            end_time: "23:59".to_string(),
            days_of_week: [
                "monday",
                "tuesday",
                "wednesday",
                "thursday",
                "friday",
                "saturday",
                "sunday",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            is_active: true,
        }
    }

    fn make_monitor(
        device_id: Option<&str>,
    ) -> (Monitor<FakeClient, FakeLock>, FakeClient, FakeLock) {
        let client = FakeClient::default();
        let lock = FakeLock::new();
        let monitor = Monitor::new(
            device_id.map(|d| d.to_string()),
            client.clone(),
            lock.clone(),
        );
        (monitor, client, lock)
    }

    #[tokio::test]
    async fn engage_locks_once_and_reports_locked() {
        let (mut monitor, client, lock) = make_monitor(Some("device-1"));
        client.set_schedules(Some(vec![always_active()]));

        monitor.run_cycle().await;

        assert!(monitor.state.is_locked());
        assert_eq!(lock.lock_calls(), 1);

        let reports = client.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_locked);
        assert_eq!(reports[0].device_id, "device-1");
        assert_eq!(client.heartbeats(), 1);
    }

    #[tokio::test]
    async fn disengage_reports_unlocked_without_unlock_call() {
        let (mut monitor, client, lock) = make_monitor(Some("device-1"));
        client.set_schedules(Some(vec![always_active()]));
        monitor.run_cycle().await;
        assert!(monitor.state.is_locked());

        client.set_schedules(Some(vec![]));
        monitor.run_cycle().await;

        assert!(!monitor.state.is_locked());
        let reports = client.reports();
        assert_eq!(reports.len(), 2);
        assert!(!reports[1].is_locked);
        // Still just the one engage call; there is no unlock operation
        assert_eq!(lock.lock_calls(), 1);
    }

    #[tokio::test]
    async fn repeated_cycles_are_idempotent_but_heartbeat_always_fires() {
        let (mut monitor, client, lock) = make_monitor(Some("device-1"));
        client.set_schedules(Some(vec![always_active()]));

        monitor.run_cycle().await;
        monitor.run_cycle().await;
        monitor.run_cycle().await;

        assert_eq!(lock.lock_calls(), 1);
        assert_eq!(client.reports().len(), 1);
        assert_eq!(client.heartbeats(), 3);
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated_and_keeps_state() {
        let (mut monitor, client, lock) = make_monitor(Some("device-1"));
        client.set_schedules(None);

        monitor.run_cycle().await;

        assert!(!monitor.state.is_locked());
        assert_eq!(lock.lock_calls(), 0);
        assert!(client.reports().is_empty());
        // Heartbeat still fires on a failed fetch
        assert_eq!(client.heartbeats(), 1);

        // Next cycle recovers
        client.set_schedules(Some(vec![always_active()]));
        monitor.run_cycle().await;
        assert!(monitor.state.is_locked());
        assert_eq!(client.heartbeats(), 2);
    }

    #[tokio::test]
    async fn missing_device_id_skips_cycle_entirely() {
        let (mut monitor, client, lock) = make_monitor(None);
        client.set_schedules(Some(vec![always_active()]));

        monitor.run_cycle().await;

        assert_eq!(lock.lock_calls(), 0);
        assert_eq!(client.heartbeats(), 0);
        assert!(client.reports().is_empty());
    }

    #[tokio::test]
    async fn revoked_capability_skips_cycle_entirely() {
        let (mut monitor, client, lock) = make_monitor(Some("device-1"));
        client.set_schedules(Some(vec![always_active()]));
        lock.revoke_capability();

        monitor.run_cycle().await;

        assert!(!monitor.state.is_locked());
        assert_eq!(lock.lock_calls(), 0);
        assert_eq!(client.heartbeats(), 0);
    }

    #[tokio::test]
    async fn lock_failure_does_not_mark_locked() {
        let (mut monitor, client, lock) = make_monitor(Some("device-1"));
        client.set_schedules(Some(vec![always_active()]));
        lock.fail_locks(true);

        monitor.run_cycle().await;

        assert!(!monitor.state.is_locked());
        assert!(client.reports().is_empty());
        assert_eq!(client.heartbeats(), 1);

        // Capability recovers; the next cycle retries the lock
        lock.fail_locks(false);
        monitor.run_cycle().await;
        assert!(monitor.state.is_locked());
        assert_eq!(lock.lock_calls(), 2);
    }

    #[tokio::test]
    async fn snapshot_reflects_last_completed_cycle() {
        let (mut monitor, client, _lock) = make_monitor(Some("device-1"));
        let status = monitor.status_handle();

        assert!(status.get().await.last_cycle.is_none());

        client.set_schedules(Some(vec![always_active()]));
        monitor.run_cycle().await;

        let snapshot = status.get().await;
        assert!(snapshot.is_locked);
        assert!(snapshot.last_cycle.is_some());
    }

    #[tokio::test]
    async fn run_stops_at_sleep_boundary() {
        let (monitor, client, _lock) = make_monitor(Some("device-1"));
        client.set_schedules(Some(vec![]));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(PollingScheduler::new(60, 0), stop_rx));

        // Give the first cycle a moment to run, then stop
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop at sleep boundary")
            .unwrap();

        assert_eq!(client.heartbeats(), 1);
    }
}
