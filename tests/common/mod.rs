#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodevisor::{
    Event, EventKind, LocalBus, Manager, MemoryRegistry, NewServiceRecord, NodeService,
    RecordUpdate, Registry, RegistryError, ServiceRecord,
};
use tokio::sync::broadcast;

/// Memory registry that can be switched off or slowed down to simulate a
/// struggling store.
#[derive(Default)]
pub struct FlakyRegistry {
    pub inner: MemoryRegistry,
    down: AtomicBool,
    get_delay_ms: AtomicU64,
}

impl FlakyRegistry {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Every `get` sleeps this long before answering.
    pub fn set_get_delay(&self, delay: Duration) {
        self.get_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.down.load(Ordering::SeqCst) {
            Err(RegistryError::unavailable("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Registry for FlakyRegistry {
    async fn find(&self, host: &str, binary: &str) -> Result<ServiceRecord, RegistryError> {
        self.check()?;
        self.inner.find(host, binary).await
    }

    async fn get(&self, id: u64) -> Result<ServiceRecord, RegistryError> {
        let delay = self.get_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check()?;
        self.inner.get(id).await
    }

    async fn create(&self, record: NewServiceRecord) -> Result<ServiceRecord, RegistryError> {
        self.check()?;
        self.inner.create(record).await
    }

    async fn update(&self, id: u64, update: RecordUpdate) -> Result<ServiceRecord, RegistryError> {
        self.check()?;
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: u64) -> Result<(), RegistryError> {
        self.check()?;
        self.inner.delete(id).await
    }
}

/// Builds a `compute` service on `host` without the log writer.
pub fn service(
    registry: Arc<dyn Registry>,
    bus: &LocalBus,
    host: &str,
    manager: Arc<dyn Manager>,
    report: Duration,
    periodic: Duration,
) -> NodeService {
    NodeService::builder(registry, Arc::new(bus.clone()))
        .host(host)
        .binary("nodevisor-compute")
        .manager(manager)
        .report_interval(report)
        .periodic_interval(periodic)
        .without_log_writer()
        .build()
        .expect("service builds")
}

/// Every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}
