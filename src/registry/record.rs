//! Service record data model.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// One node service as seen by the cluster.
///
/// At most one live record per `(host, binary)` is meaningful; the registry
/// does not enforce it, the node service looks itself up by that pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Registry-assigned id.
    pub id: u64,
    /// Node the service runs on.
    pub host: String,
    /// Program identity (`nodevisor-compute`).
    pub binary: String,
    /// Routing namespace.
    pub topic: String,
    /// Number of successful heartbeats since creation.
    pub report_count: u64,
    /// Zone the node was started in.
    pub availability_zone: String,
    /// Last write (creation or heartbeat).
    pub updated_at: SystemTime,
}

impl ServiceRecord {
    /// True if the record was written within `max_silence` of `now`.
    ///
    /// Observers use this to tell live services from dead ones: a healthy
    /// service refreshes `updated_at` on every heartbeat.
    pub fn is_up_at(&self, now: SystemTime, max_silence: Duration) -> bool {
        match now.duration_since(self.updated_at) {
            Ok(elapsed) => elapsed <= max_silence,
            // written "in the future" (clock skew): trust it
            Err(_) => true,
        }
    }

    /// [`is_up_at`](Self::is_up_at) against the current wall clock.
    pub fn is_up(&self, max_silence: Duration) -> bool {
        self.is_up_at(SystemTime::now(), max_silence)
    }
}

/// Fields of a record about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServiceRecord {
    pub host: String,
    pub binary: String,
    pub topic: String,
    pub report_count: u64,
    pub availability_zone: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub report_count: Option<u64>,
    pub availability_zone: Option<String>,
}

impl RecordUpdate {
    /// Update carrying only a new report count.
    pub fn report_count(count: u64) -> Self {
        Self {
            report_count: Some(count),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(updated_at: SystemTime) -> ServiceRecord {
        ServiceRecord {
            id: 1,
            host: "h".into(),
            binary: "b".into(),
            topic: "t".into(),
            report_count: 0,
            availability_zone: "z".into(),
            updated_at,
        }
    }

    #[test]
    fn liveness_window() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let rec = record(t0);

        assert!(rec.is_up_at(t0 + Duration::from_secs(60), Duration::from_secs(60)));
        assert!(!rec.is_up_at(t0 + Duration::from_secs(61), Duration::from_secs(60)));
        assert!(rec.is_up_at(t0 - Duration::from_secs(5), Duration::from_secs(60)));
    }

    #[test]
    fn fresh_record_is_up_now() {
        let rec = record(SystemTime::now());
        assert!(rec.is_up(Duration::from_secs(10)));

        let stale = record(SystemTime::now() - Duration::from_secs(120));
        assert!(!stale.is_up(Duration::from_secs(10)));
    }
}
