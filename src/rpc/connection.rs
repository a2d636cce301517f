use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::rpc::{Binding, Subscription};

/// Factory of bus connections.
///
/// Every node service opens its own connection; connections are never
/// shared between services.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Opens a fresh connection.
    async fn connect(&self) -> Result<Arc<dyn Connection>, BusError>;
}

/// One open connection to the bus.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Starts consuming `binding`.
    async fn subscribe(&self, binding: Binding) -> Result<Subscription, BusError>;

    /// Ends every subscription of this connection. Idempotent.
    fn close(&self);
}
