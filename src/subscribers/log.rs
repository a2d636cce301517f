//! # LogWriter: events rendered through `tracing`
//!
//! Installed by default on every node service. Each [`EventKind`] maps to
//! the level that matches its meaning; the service label travels as a field.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  service="compute@node-1" version="0.1.0" starting node
//! DEBUG service="compute@node-1" record_id=4 service record disappeared, recreating it
//! ERROR service="compute@node-1" reason="registry unavailable: timeout" model server went away
//! ERROR service="compute@node-1" recovered model server connection
//! WARN  service="compute@node-1" service killed that has no registry entry
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ServiceStarting => {
                info!(service, version = reason, "starting node");
            }
            EventKind::ServiceStarted => {
                info!(service, record_id = ?e.record_id, "node running");
            }
            EventKind::ResourcesReconciled => {
                info!(service, "available resources reconciled");
            }
            EventKind::TimerStarted => {
                debug!(service, timer = ?e.timer, delay_ms = ?e.delay_ms, "timer scheduled");
            }
            EventKind::TimerFailed => {
                debug!(service, timer = ?e.timer, reason, "timer ended abnormally");
            }
            EventKind::ConsumerStopped => {
                debug!(service, outcome = reason, "consumer group stopped");
            }
            EventKind::ServiceStopped => {
                info!(service, "node stopped");
            }
            EventKind::ServiceKilled => {
                info!(service, record_id = ?e.record_id, "node killed, record destroyed");
            }
            EventKind::KillWithoutRecord => {
                warn!(service, record_id = ?e.record_id, "service killed that has no registry entry");
            }
            EventKind::RecordCreated => {
                info!(service, record_id = ?e.record_id, "service record created");
            }
            EventKind::RecordVanished => {
                debug!(service, record_id = ?e.record_id, "service record disappeared, recreating it");
            }
            EventKind::HeartbeatReported => {
                trace!(service, record_id = ?e.record_id, report_count = ?e.report_count, "heartbeat");
            }
            EventKind::ModelDisconnected => {
                error!(service, reason, "model server went away");
            }
            EventKind::ModelRecovered => {
                error!(service, "recovered model server connection");
            }
            EventKind::PeriodicTasksFailed => {
                warn!(service, reason, "periodic tasks failed");
            }
            EventKind::MethodNotFound => {
                warn!(service, method = ?e.method, "call to unknown method");
            }
            EventKind::CallFailed => {
                debug!(service, method = ?e.method, reason, "call failed");
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = service, reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                warn!(subscriber = service, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
