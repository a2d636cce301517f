//! # Lifecycle events emitted by a node service.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Lifecycle**: start, stop, kill of the service
//! - **Registry**: record creation, disappearance, heartbeats, connectivity
//! - **Dispatch**: bus calls that could not be served
//! - **Subscriber**: problems inside event subscribers themselves
//!
//! The [`Event`] struct carries optional metadata (record id, report count,
//! timer and method names, a reason string) depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically within the process.
//!
//! ## Example
//! ```rust
//! use nodevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HeartbeatReported)
//!     .with_service("compute@node-1")
//!     .with_record(7)
//!     .with_report_count(3);
//!
//! assert_eq!(ev.kind, EventKind::HeartbeatReported);
//! assert_eq!(ev.record_id, Some(7));
//! assert_eq!(ev.report_count, Some(3));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of node service events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Lifecycle ===
    /// `start()` was called; the manager is about to initialise.
    ///
    /// Sets: `service`, `reason` (crate version)
    ServiceStarting,

    /// The consumer group and timers are running.
    ///
    /// Sets: `service`, `record_id`
    ServiceStarted,

    /// The manager reconciled available resources against the registry.
    ///
    /// Sets: `service`
    ResourcesReconciled,

    /// A periodic timer was scheduled.
    ///
    /// Sets: `service`, `timer`, `delay_ms`
    TimerStarted,

    /// A timer loop ended abnormally; reported while joining.
    ///
    /// Sets: `service`, `timer`, `reason`
    TimerFailed,

    /// The consumer group stopped waiting.
    ///
    /// Sets: `service`, `reason` (`cancelled` or `drained`)
    ConsumerStopped,

    /// `stop()` completed.
    ///
    /// Sets: `service`
    ServiceStopped,

    /// `kill()` completed and the record was destroyed.
    ///
    /// Sets: `service`, `record_id`
    ServiceKilled,

    /// `kill()` found no record to destroy.
    ///
    /// Sets: `service`, `record_id` (if one was known)
    KillWithoutRecord,

    // === Registry ===
    /// A new service record was created.
    ///
    /// Sets: `service`, `record_id`
    RecordCreated,

    /// The record vanished from the registry and is being recreated.
    ///
    /// Sets: `service`, `record_id` (the old id)
    RecordVanished,

    /// A heartbeat was persisted.
    ///
    /// Sets: `service`, `record_id`, `report_count`
    HeartbeatReported,

    /// First failed heartbeat after a healthy period.
    ///
    /// Sets: `service`, `reason`
    ModelDisconnected,

    /// First successful heartbeat after failures.
    ///
    /// Sets: `service`
    ModelRecovered,

    /// `Manager::periodic_tasks` returned an error.
    ///
    /// Sets: `service`, `reason`
    PeriodicTasksFailed,

    // === Dispatch ===
    /// A bus call named a method nobody defines.
    ///
    /// Sets: `service`, `method`
    MethodNotFound,

    /// A bus call reached a handler which failed.
    ///
    /// Sets: `service`, `method`, `reason`
    CallFailed,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `reason` (panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `reason`
    SubscriberOverflow,
}

/// Node service event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Service label (`topic@host`).
    pub service: Option<Arc<str>>,
    /// Registry record id.
    pub record_id: Option<u64>,
    /// Report count after a heartbeat.
    pub report_count: Option<u64>,
    /// Timer name.
    pub timer: Option<Arc<str>>,
    /// Timer delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Dispatched method name.
    pub method: Option<Arc<str>>,
    /// Human-readable reason (errors, version, outcome).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            record_id: None,
            report_count: None,
            timer: None,
            delay_ms: None,
            method: None,
            reason: None,
        }
    }

    /// Attaches the service label.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a registry record id.
    #[inline]
    pub fn with_record(mut self, id: u64) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Attaches a registry record id if one is known.
    #[inline]
    pub fn with_record_opt(mut self, id: Option<u64>) -> Self {
        self.record_id = id;
        self
    }

    /// Attaches a heartbeat report count.
    #[inline]
    pub fn with_report_count(mut self, count: u64) -> Self {
        self.report_count = Some(count);
        self
    }

    /// Attaches a timer name.
    #[inline]
    pub fn with_timer(mut self, timer: impl Into<Arc<str>>) -> Self {
        self.timer = Some(timer.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a dispatched method name.
    #[inline]
    pub fn with_method(mut self, method: impl Into<Arc<str>>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }
}
