//! Typed lifecycle events and the bus that fans them out.
//!
//! Events are a closed set of variants with typed payloads. Consumers either
//! register a callback (and hold the returned [`Subscription`]) or take a
//! broadcast receiver for async processing.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::FailureReason;
use crate::types::TelemetrySnapshot;

/// Default capacity of the async event stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UplinkEstablished {
    pub port: u16,
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UplinkLost {
    pub last_contact_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCompleted {
    pub success: bool,
    pub duration_ms: u64,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// A single failed operation
    Failure {
        reason: FailureReason,
        message: String,
    },
    /// The consecutive failure threshold was reached
    ConsecutiveFailures {
        #[serde(rename = "failureCount")]
        failure_count: u32,
        reason: FailureReason,
    },
}

/// Event variants with their payloads.
#[derive(Debug, Clone)]
pub enum EventKind {
    UplinkEstablished(UplinkEstablished),
    UplinkLost(UplinkLost),
    TelemetryReceived(Arc<TelemetrySnapshot>),
    ScanStarted,
    ScanCompleted(ScanCompleted),
    Error(Diagnostic),
}

impl EventKind {
    /// Wire name of the variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::UplinkEstablished(_) => "uplink-established",
            EventKind::UplinkLost(_) => "uplink-lost",
            EventKind::TelemetryReceived(_) => "telemetry-received",
            EventKind::ScanStarted => "scan-started",
            EventKind::ScanCompleted(_) => "scan-completed",
            EventKind::Error(_) => "error",
        }
    }
}

/// Timestamped event envelope, serialized as `{type, timestamp, payload?}`.
#[derive(Debug, Clone)]
pub struct UplinkEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl UplinkEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

impl Serialize for UplinkEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.event_type())?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        match &self.kind {
            EventKind::UplinkEstablished(payload) => map.serialize_entry("payload", payload)?,
            EventKind::UplinkLost(payload) => map.serialize_entry("payload", payload)?,
            EventKind::TelemetryReceived(snapshot) => {
                map.serialize_entry("payload", snapshot.as_ref())?
            }
            EventKind::ScanStarted => {}
            EventKind::ScanCompleted(payload) => map.serialize_entry("payload", payload)?,
            EventKind::Error(payload) => map.serialize_entry("payload", payload)?,
        }
        map.end()
    }
}

type Callback = Arc<dyn Fn(&UplinkEvent) + Send + Sync>;

struct BusInner {
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
    stream_tx: broadcast::Sender<UplinkEvent>,
}

impl BusInner {
    fn remove(&self, id: u64) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Fan-out point for [`UplinkEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STREAM_CAPACITY)
    }

    /// Create a bus whose async stream buffers `capacity` events per receiver.
    pub fn with_capacity(capacity: usize) -> Self {
        let (stream_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                stream_tx,
            }),
        }
    }

    /// Register a callback. It stays registered while the returned handle lives.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UplinkEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(callback)));

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Receiver for async consumers. Slow receivers observe `Lagged`.
    pub fn stream(&self) -> broadcast::Receiver<UplinkEvent> {
        self.inner.stream_tx.subscribe()
    }

    /// Timestamp and publish an event.
    pub fn emit(&self, kind: EventKind) {
        self.publish(UplinkEvent::new(kind));
    }

    /// Deliver an event to every callback and stream receiver.
    ///
    /// A panicking callback is logged and skipped.
    pub fn publish(&self, event: UplinkEvent) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!(
                    event_type = event.event_type(),
                    "Event subscriber panicked; continuing with remaining subscribers"
                );
            }
        }

        // No receivers is fine
        let _ = self.inner.stream_tx.send(event);
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsubscribe handle returned by [`EventBus::subscribe`].
#[must_use = "dropping a Subscription unsubscribes the callback"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    /// Keep the callback registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.bus = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
