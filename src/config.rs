//! # Node service configuration.
//!
//! Provides [`ServiceConfig`], the settings a [`ServiceBuilder`](crate::ServiceBuilder)
//! falls back to for every field the embedder leaves unset.
//!
//! ## Sentinel values
//! - `report_interval = 0s` → no heartbeat timer
//! - `periodic_interval = 0s` → no periodic-tasks timer
//!
//! Any non-zero interval is raised to [`MIN_INTERVAL`] by the accessors.

use std::time::Duration;

/// Lower bound for heartbeat and periodic-task intervals.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Defaults for node service construction.
///
/// ## Field semantics
/// - `host`: identity of this node in the registry and in `topic.host` routing
/// - `report_interval`: seconds between heartbeats (`0s` = disabled)
/// - `periodic_interval`: seconds between manager periodic tasks (`0s` = disabled)
/// - `availability_zone`: stored on registry records this node creates
/// - `binary_prefix`: stripped from the binary name to derive the topic
/// - `event_capacity`: lifecycle event ring buffer size (min 1)
///
/// ## Notes
/// All fields are public. Prefer the accessors so sentinel and lower-bound
/// checks stay in one place.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Host identity; defaults to the `HOSTNAME` environment variable.
    pub host: String,

    /// Interval between heartbeats written to the registry.
    pub report_interval: Duration,

    /// Interval between `Manager::periodic_tasks` invocations.
    pub periodic_interval: Duration,

    /// Availability zone recorded on newly created service records.
    pub availability_zone: String,

    /// Prefix stripped from a binary name to obtain its topic
    /// (`nodevisor-compute` → `compute`).
    pub binary_prefix: String,

    /// Capacity of the per-service lifecycle event channel.
    pub event_capacity: usize,
}

impl ServiceConfig {
    /// Heartbeat interval, or `None` when disabled.
    #[inline]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        bounded_interval(self.report_interval)
    }

    /// Periodic-tasks interval, or `None` when disabled.
    #[inline]
    pub fn periodic_tasks_interval(&self) -> Option<Duration> {
        bounded_interval(self.periodic_interval)
    }

    /// Event channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn event_capacity_clamped(&self) -> usize {
        self.event_capacity.max(1)
    }

    /// Derives a topic from a binary name by dropping everything up to and
    /// including the last occurrence of [`binary_prefix`](Self::binary_prefix).
    ///
    /// ```
    /// use nodevisor::ServiceConfig;
    ///
    /// let cfg = ServiceConfig::default();
    /// assert_eq!(cfg.topic_for("nodevisor-compute"), "compute");
    /// assert_eq!(cfg.topic_for("scheduler"), "scheduler");
    /// ```
    pub fn topic_for(&self, binary: &str) -> String {
        if self.binary_prefix.is_empty() {
            return binary.to_string();
        }
        match binary.rfind(&self.binary_prefix) {
            Some(at) => binary[at + self.binary_prefix.len()..].to_string(),
            None => binary.to_string(),
        }
    }
}

/// `0` disables, anything else is raised to [`MIN_INTERVAL`].
pub(crate) fn bounded_interval(interval: Duration) -> Option<Duration> {
    if interval.is_zero() {
        None
    } else {
        Some(interval.max(MIN_INTERVAL))
    }
}

impl Default for ServiceConfig {
    /// Default configuration:
    ///
    /// - `host = $HOSTNAME` (or `"localhost"`)
    /// - `report_interval = 10s`
    /// - `periodic_interval = 60s`
    /// - `availability_zone = "nodevisor"`
    /// - `binary_prefix = "nodevisor-"`
    /// - `event_capacity = 1024`
    fn default() -> Self {
        Self {
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            report_interval: Duration::from_secs(10),
            periodic_interval: Duration::from_secs(60),
            availability_zone: "nodevisor".to_string(),
            binary_prefix: "nodevisor-".to_string(),
            event_capacity: 1024,
        }
    }
}
