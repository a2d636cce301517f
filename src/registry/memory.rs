//! # In-memory service registry.
//!
//! [`MemoryRegistry`] keeps records in a `RwLock<HashMap>` inside the current
//! process. Ids are assigned from a monotonic counter and never reused, so a
//! recreated record always gets a fresh id.
//!
//! Useful for single-process deployments (`serve`), demos and tests. Records
//! do not survive the process; multi-process launch groups need a shared
//! registry implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::registry::{NewServiceRecord, RecordUpdate, Registry, ServiceRecord};

/// Process-local registry.
#[derive(Debug)]
pub struct MemoryRegistry {
    records: RwLock<HashMap<u64, ServiceRecord>>,
    next_id: AtomicU64,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns all records sorted by id.
    pub async fn list(&self) -> Vec<ServiceRecord> {
        let records = self.records.read().await;
        let mut all: Vec<ServiceRecord> = records.values().cloned().collect();
        all.sort_unstable_by_key(|r| r.id);
        all
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True if no records exist.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn find(&self, host: &str, binary: &str) -> Result<ServiceRecord, RegistryError> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|r| r.host == host && r.binary == binary)
            .min_by_key(|r| r.id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                key: format!("{host}/{binary}"),
            })
    }

    async fn get(&self, id: u64) -> Result<ServiceRecord, RegistryError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found_id(id))
    }

    async fn create(&self, new: NewServiceRecord) -> Result<ServiceRecord, RegistryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = ServiceRecord {
            id,
            host: new.host,
            binary: new.binary,
            topic: new.topic,
            report_count: new.report_count,
            availability_zone: new.availability_zone,
            updated_at: SystemTime::now(),
        };
        self.records.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: u64, update: RecordUpdate) -> Result<ServiceRecord, RegistryError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found_id(id))?;
        if let Some(count) = update.report_count {
            record.report_count = count;
        }
        if let Some(zone) = update.availability_zone {
            record.availability_zone = zone;
        }
        record.updated_at = SystemTime::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: u64) -> Result<(), RegistryError> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::not_found_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(host: &str, binary: &str) -> NewServiceRecord {
        NewServiceRecord {
            host: host.into(),
            binary: binary.into(),
            topic: "compute".into(),
            report_count: 0,
            availability_zone: "zone-a".into(),
        }
    }

    #[tokio::test]
    async fn find_matches_host_and_binary() {
        let reg = MemoryRegistry::new();
        let a = reg.create(new_record("h1", "nodevisor-compute")).await.unwrap();
        reg.create(new_record("h2", "nodevisor-compute")).await.unwrap();

        let found = reg.find("h1", "nodevisor-compute").await.unwrap();
        assert_eq!(found.id, a.id);

        let err = reg.find("h3", "nodevisor-compute").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let reg = MemoryRegistry::new();
        let a = reg.create(new_record("h", "b")).await.unwrap();
        reg.delete(a.id).await.unwrap();
        let b = reg.create(new_record("h", "b")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(reg.get(a.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let reg = MemoryRegistry::new();
        let rec = reg.create(new_record("h", "b")).await.unwrap();

        let updated = reg.update(rec.id, RecordUpdate::report_count(5)).await.unwrap();
        assert_eq!(updated.report_count, 5);
        assert_eq!(updated.availability_zone, "zone-a");
        assert!(updated.updated_at >= rec.updated_at);
    }

    #[tokio::test]
    async fn missing_record_operations_report_not_found() {
        let reg = MemoryRegistry::new();
        assert!(reg.update(9, RecordUpdate::report_count(1)).await.unwrap_err().is_not_found());
        assert!(reg.delete(9).await.unwrap_err().is_not_found());
        assert!(reg.is_empty().await);
    }
}
