//! # Service registry contract.
//!
//! The registry is an external, shared store of [`ServiceRecord`]s. A node
//! service resolves (or creates) its record on start, bumps `report_count`
//! on every heartbeat and deletes the record when killed.
//!
//! Implementations must report a missing record as
//! [`RegistryError::NotFound`] and everything else as
//! [`RegistryError::Unavailable`]; the node service treats the two kinds
//! differently.
//!
//! [`MemoryRegistry`] is the bundled in-process implementation.

mod memory;
mod record;

use async_trait::async_trait;

use crate::error::RegistryError;

pub use memory::MemoryRegistry;
pub use record::{NewServiceRecord, RecordUpdate, ServiceRecord};

/// Storage of service records shared across the cluster.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Looks a record up by `(host, binary)`.
    async fn find(&self, host: &str, binary: &str) -> Result<ServiceRecord, RegistryError>;

    /// Fetches a record by id.
    async fn get(&self, id: u64) -> Result<ServiceRecord, RegistryError>;

    /// Creates a record and returns it with its assigned id.
    async fn create(&self, record: NewServiceRecord) -> Result<ServiceRecord, RegistryError>;

    /// Applies a partial update.
    async fn update(&self, id: u64, update: RecordUpdate) -> Result<ServiceRecord, RegistryError>;

    /// Destroys a record.
    async fn delete(&self, id: u64) -> Result<(), RegistryError>;
}
