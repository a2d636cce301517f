//! Heartbeat: keep the registry record alive and count reports.

use crate::error::RegistryError;
use crate::events::EventKind;
use crate::registry::{NewServiceRecord, RecordUpdate};
use crate::service::node::lock;
use crate::service::{NodeService, ServiceState};

impl NodeService {
    /// Writes one heartbeat and returns the new `report_count`.
    ///
    /// A record deleted out-of-band is recreated (count restarts from zero)
    /// and then incremented. Failures flip [`Connectivity`](crate::Connectivity)
    /// to `Disconnected`, reported once until the next success.
    ///
    /// Only a starting or running service recreates its record. Once stopping,
    /// a missing record is returned as `NotFound`, and a killed service does
    /// not touch the registry at all.
    pub async fn report_state(&self) -> Result<u64, RegistryError> {
        let _serial = self.inner.heartbeat.lock().await;
        if self.state() == ServiceState::Killed {
            return Err(self.missing_record());
        }

        let result = self.beat().await;
        if matches!(&result, Err(e) if e.is_not_found()) && !self.state().is_live() {
            return result;
        }
        let transition = lock(&self.inner.connectivity).observe(result.is_ok());
        match (transition, &result) {
            (Some(EventKind::ModelDisconnected), Err(e)) => {
                self.emit(self.event(EventKind::ModelDisconnected).with_reason(e.to_string()));
            }
            (Some(kind), _) => self.emit(self.event(kind)),
            (None, _) => {}
        }
        result
    }

    async fn beat(&self) -> Result<u64, RegistryError> {
        let registry = &self.inner.registry;

        let lookup = match self.service_id() {
            Some(id) => registry.get(id).await,
            None => Err(self.missing_record()),
        };
        let record = match lookup {
            Ok(record) => record,
            Err(e) if e.is_not_found() && !self.state().is_live() => return Err(e),
            Err(e) if e.is_not_found() => {
                self.emit(
                    self.event(EventKind::RecordVanished)
                        .with_record_opt(self.service_id()),
                );
                let id = self.create_record().await?;
                registry.get(id).await?
            }
            Err(e) => return Err(e),
        };

        let updated = registry
            .update(record.id, RecordUpdate::report_count(record.report_count + 1))
            .await?;
        self.emit(
            self.event(EventKind::HeartbeatReported)
                .with_record(updated.id)
                .with_report_count(updated.report_count),
        );
        Ok(updated.report_count)
    }

    pub(super) fn missing_record(&self) -> RegistryError {
        RegistryError::NotFound {
            key: format!("{}/{}", self.inner.host, self.inner.binary),
        }
    }

    /// Creates this service's record with `report_count = 0` and remembers its id.
    pub(super) async fn create_record(&self) -> Result<u64, RegistryError> {
        let inner = &self.inner;
        let record = inner
            .registry
            .create(NewServiceRecord {
                host: inner.host.clone(),
                binary: inner.binary.clone(),
                topic: inner.topic.clone(),
                report_count: 0,
                availability_zone: inner.availability_zone.clone(),
            })
            .await?;
        *lock(&inner.record_id) = Some(record.id);
        self.emit(self.event(EventKind::RecordCreated).with_record(record.id));
        Ok(record.id)
    }
}
