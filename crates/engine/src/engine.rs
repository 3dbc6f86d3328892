//! Uplink engine: the single aggregate owning uplink state, the failure
//! governor, thresholds, the last snapshot and the periodic scanner.
//!
//! # Concurrency
//!
//! At most one acquisition cycle runs at a time. The cycle guard is taken with
//! `try_lock`, so a manual [`UplinkEngine::acquire_telemetry`] or
//! [`UplinkEngine::establish_uplink`] that finds a cycle in flight returns at
//! once and is not counted as a failure.
//! Shared state sits behind a std mutex held only for short, non-async
//! sections; it is never held across an `.await`.
//!
//! The scan timer task holds a weak reference to the engine, so dropping the
//! last [`UplinkEngine`] handle stops scanning. Every cycle, manual or
//! scheduled, runs in its own task holding the cycle guard. A panic there is
//! recorded as an `exception` failure and the caller gets `None`/`false`.
//!
//! No public method returns an error. Failures surface as `None`/`false`
//! together with an `error` event on the bus.

use chrono::Utc;
use fuelwatch_core::config::normalize_scan_interval;
use fuelwatch_core::event::{Diagnostic, ScanCompleted, UplinkEstablished, UplinkLost};
use fuelwatch_core::{
    AlertThresholds, EngineConfig, EventBus, EventKind, FailureReason, Subscription,
    TelemetrySnapshot, UplinkEvent, UplinkState,
};
use fuelwatch_telemetry::{build_snapshot, validate_server_response};
use fuelwatch_uplink::{discover, ProcessPlatform, UplinkTransport};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::diagnostics::Diagnostics;
use crate::governor::FailureGovernor;

struct EngineState {
    uplink: UplinkState,
    governor: FailureGovernor,
    thresholds: AlertThresholds,
    last_snapshot: Option<Arc<TelemetrySnapshot>>,
    diagnostics: Diagnostics,
    scan_interval_secs: u64,
}

struct Scheduler {
    handle: JoinHandle<()>,
    interval_secs: u64,
}

struct Inner<P, T> {
    platform: P,
    transport: T,
    bus: EventBus,
    state: Mutex<EngineState>,
    cycle: Arc<tokio::sync::Mutex<()>>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl<P, T> Drop for Inner<P, T> {
    fn drop(&mut self) {
        let scheduler = self
            .scheduler
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(scheduler) = scheduler.take() {
            scheduler.handle.abort();
        }
    }
}

/// Handle to an uplink engine. Clones share the same engine.
pub struct UplinkEngine<P, T> {
    inner: Arc<Inner<P, T>>,
}

impl<P, T> Clone for UplinkEngine<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, T> UplinkEngine<P, T>
where
    P: ProcessPlatform + 'static,
    T: UplinkTransport + 'static,
{
    /// Build a disconnected engine from a validated configuration.
    pub fn new(platform: P, transport: T, config: &EngineConfig) -> Self {
        Self::with_bus(platform, transport, config, EventBus::new())
    }

    /// Build an engine publishing on an existing bus.
    pub fn with_bus(platform: P, transport: T, config: &EngineConfig, bus: EventBus) -> Self {
        let thresholds = match config.thresholds.validate() {
            Ok(()) => config.thresholds,
            Err(error) => {
                warn!(%error, "Rejected configured thresholds; using defaults");
                AlertThresholds::default()
            }
        };

        let state = EngineState {
            uplink: UplinkState::new(),
            governor: FailureGovernor::new(config.failure_threshold),
            thresholds,
            last_snapshot: None,
            diagnostics: Diagnostics::default(),
            scan_interval_secs: config.effective_scan_interval(),
        };

        Self {
            inner: Arc::new(Inner {
                platform,
                transport,
                bus,
                state: Mutex::new(state),
                cycle: Arc::new(tokio::sync::Mutex::new(())),
                scheduler: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn scheduler(&self) -> MutexGuard<'_, Option<Scheduler>> {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, kind: EventKind) {
        self.inner.bus.emit(kind);
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Register an event callback; see [`EventBus::subscribe`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UplinkEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(callback)
    }

    pub fn uplink_state(&self) -> UplinkState {
        self.state().uplink.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().uplink.connected
    }

    pub fn last_snapshot(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.state().last_snapshot.clone()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.state().diagnostics.clone()
    }

    pub fn thresholds(&self) -> AlertThresholds {
        self.state().thresholds
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().governor.consecutive_failures()
    }

    /// Discover the language server and mark the uplink connected.
    ///
    /// Returns `false` without counting a failure when a cycle is already
    /// running. Any other failure is tracked as `uplink-failed`.
    pub async fn establish_uplink(&self) -> bool {
        let Ok(guard) = Arc::clone(&self.inner.cycle).try_lock_owned() else {
            debug!("Acquisition in flight; skipping uplink discovery");
            return false;
        };

        let engine = self.clone();
        let attempt = tokio::spawn(async move {
            let _guard = guard;
            engine.establish_locked().await
        });

        match attempt.await {
            Ok(established) => established,
            Err(join_error) => {
                self.contain(join_error);
                false
            }
        }
    }

    async fn establish_locked(&self) -> bool {
        match discover(&self.inner.platform, &self.inner.transport).await {
            Ok(target) => {
                let pid = target.credential.pid();
                self.state().uplink.establish(
                    target.port,
                    target.credential.token().to_string(),
                    Utc::now(),
                );
                info!(pid, port = target.port, "Uplink established");
                self.emit(EventKind::UplinkEstablished(UplinkEstablished {
                    port: target.port,
                    pid,
                }));
                true
            }
            Err(error) => {
                self.track_failure(FailureReason::UplinkFailed, &error.to_string());
                false
            }
        }
    }

    /// Run one acquisition cycle.
    ///
    /// Returns `None` when the cycle fails or another cycle is already running.
    /// The cycle runs on its own task, so it completes even if this future is
    /// dropped, and a panic inside it is recorded as an `exception` failure.
    pub async fn acquire_telemetry(&self) -> Option<Arc<TelemetrySnapshot>> {
        let Ok(guard) = Arc::clone(&self.inner.cycle).try_lock_owned() else {
            debug!("Acquisition already in flight; skipping");
            return None;
        };

        self.emit(EventKind::ScanStarted);
        let started = Instant::now();

        let engine = self.clone();
        let cycle = tokio::spawn(async move {
            let _guard = guard;
            engine.run_cycle().await
        });

        let snapshot = match cycle.await {
            Ok(snapshot) => snapshot,
            Err(join_error) => {
                self.contain(join_error);
                None
            }
        };

        self.emit(EventKind::ScanCompleted(ScanCompleted {
            success: snapshot.is_some(),
            duration_ms: started.elapsed().as_millis() as u64,
        }));
        snapshot
    }

    fn contain(&self, join_error: JoinError) {
        if join_error.is_panic() {
            error!("Acquisition cycle panicked");
            self.fail_cycle(FailureReason::Exception, "acquisition cycle panicked");
        } else {
            warn!(%join_error, "Acquisition cycle cancelled");
        }
    }

    async fn run_cycle(&self) -> Option<Arc<TelemetrySnapshot>> {
        let endpoint = self.state().uplink.endpoint();
        let (port, token) = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                if !self.establish_locked().await {
                    return None;
                }
                let endpoint = self.state().uplink.endpoint();
                endpoint?
            }
        };

        let response = match self.inner.transport.fetch_status(port, &token).await {
            Ok(response) => response,
            Err(error) => {
                self.fail_cycle(FailureReason::NoResponse, &error.to_string());
                return None;
            }
        };

        let validation = validate_server_response(&response);
        let problems = validation.errors.join("; ");
        for warning in &validation.warnings {
            warn!(port, warning = warning.as_str(), "Status response warning");
        }
        let valid = validation.valid;

        let thresholds = {
            let mut state = self.state();
            state.diagnostics.record_response(&response, validation);
            state.thresholds
        };

        if !valid {
            self.fail_cycle(FailureReason::SchemaInvalid, &problems);
            return None;
        }

        let now = Utc::now();
        let snapshot = Arc::new(build_snapshot(&response, &thresholds, now));
        {
            let mut state = self.state();
            state.uplink.record_contact(now);
            state.governor.record_success();
            state.last_snapshot = Some(Arc::clone(&snapshot));
        }

        info!(
            systems = snapshot.systems.len(),
            overall = ?snapshot.overall_readiness,
            alerts = snapshot.active_alert_count,
            "Telemetry acquired"
        );
        self.emit(EventKind::TelemetryReceived(Arc::clone(&snapshot)));
        Some(snapshot)
    }

    fn fail_cycle(&self, reason: FailureReason, message: &str) {
        self.track_failure(reason, message);
        self.degrade();
    }

    /// Count a failure, emit it, and emit the streak alert when due.
    fn track_failure(&self, reason: FailureReason, message: &str) {
        let alert = {
            let mut state = self.state();
            state.diagnostics.record_failure(reason, message);
            state.governor.record_failure(reason)
        };

        debug!(reason = reason.as_str(), detail = message, "Acquisition failure");
        self.emit(EventKind::Error(Diagnostic::Failure {
            reason,
            message: message.to_string(),
        }));

        if let Some(alert) = alert {
            warn!(
                failures = alert.failure_count,
                reason = alert.reason.as_str(),
                "Consecutive failure threshold reached"
            );
            self.emit(EventKind::Error(Diagnostic::ConsecutiveFailures {
                failure_count: alert.failure_count,
                reason: alert.reason,
            }));
        }
    }

    /// Lose signal after a failure; emits `uplink-lost` when it reaches zero.
    pub fn degrade(&self) {
        let lost = {
            let mut state = self.state();
            state
                .uplink
                .degrade()
                .then_some(state.uplink.last_contact_at)
        };

        if let Some(last_contact_at) = lost {
            warn!("Uplink lost");
            self.emit(EventKind::UplinkLost(UplinkLost { last_contact_at }));
        }
    }

    pub fn reset_failure_counter(&self) {
        self.state().governor.reset();
    }

    /// Swap thresholds for subsequent cycles.
    ///
    /// Invalid thresholds are logged and ignored; returns whether they were applied.
    pub fn update_thresholds(&self, thresholds: AlertThresholds) -> bool {
        if let Err(error) = thresholds.validate() {
            warn!(%error, "Rejected threshold update");
            return false;
        }
        self.state().thresholds = thresholds;
        info!(
            caution = thresholds.caution,
            warning = thresholds.warning,
            critical = thresholds.critical,
            "Thresholds updated"
        );
        true
    }

    /// Scan now and then every `interval_secs` (clamped to `[30, 86400]`).
    ///
    /// Replaces any running scanner. Must be called within a Tokio runtime.
    pub fn start_periodic_scans(&self, interval_secs: u64) {
        let interval_secs = normalize_scan_interval(interval_secs);
        self.state().scan_interval_secs = interval_secs;

        let handle = tokio::spawn(scan_loop(
            Arc::downgrade(&self.inner),
            Duration::from_secs(interval_secs),
        ));

        let previous = self.scheduler().replace(Scheduler {
            handle,
            interval_secs,
        });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        info!(interval_secs, "Periodic scans started");
    }

    /// Stop the scanner. An in-flight cycle finishes on its own.
    pub fn stop_periodic_scans(&self) {
        if let Some(scheduler) = self.scheduler().take() {
            scheduler.handle.abort();
            info!("Periodic scans stopped");
        }
    }

    /// Interval of the running scanner.
    pub fn scanning_interval(&self) -> Option<u64> {
        self.scheduler().as_ref().map(|s| s.interval_secs)
    }

    /// Store a new interval, restarting the scanner if it is running.
    pub fn update_scan_interval(&self, interval_secs: u64) {
        let interval_secs = normalize_scan_interval(interval_secs);
        let running = self.scanning_interval().is_some();
        self.state().scan_interval_secs = interval_secs;
        if running {
            self.start_periodic_scans(interval_secs);
        }
    }

    /// Configured scan interval, whether or not the scanner runs.
    pub fn scan_interval(&self) -> u64 {
        self.state().scan_interval_secs
    }

    pub fn dispose(&self) {
        self.stop_periodic_scans();
        debug!("Uplink engine disposed");
    }
}

/// Timer task body. Exits once the engine is gone.
async fn scan_loop<P, T>(engine: Weak<Inner<P, T>>, period: Duration)
where
    P: ProcessPlatform + 'static,
    T: UplinkTransport + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = engine.upgrade() else {
            break;
        };
        UplinkEngine { inner }.acquire_telemetry().await;
    }
}
