//! # Manager contract.
//!
//! A [`Manager`] is the domain half of a node service: the node service owns
//! lifecycle, registration and routing, the manager owns the work.
//!
//! ```text
//! bus call "resize" ──► NodeService::invoke
//!                         ├─ own method? (report_state, periodic_tasks, service_info)
//!                         └─ else ──► Manager::handle("resize", ctx, args)
//!                                       └─ unknown ──► DispatchError::MethodNotFound
//! ```
//!
//! Managers are shared by the heartbeat timer, the periodic timer and every
//! concurrently arriving bus call; state mutated by handlers needs its own
//! synchronisation.
//!
//! [`Handlers`] builds a manager from closures; [`ManagerFactories`] maps a
//! topic to the manager a default-constructed node service gets.

mod factories;
mod handlers;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{DispatchError, ManagerError};

pub use factories::{ManagerFactories, ManagerFactory};
pub use handlers::{decode_args, HandlerFuture, Handlers};

/// Domain logic behind a node service.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// Prepares the host. Called first in `start()`; an error aborts the start.
    async fn init_host(&self) -> Result<(), ManagerError> {
        Ok(())
    }

    /// Periodic maintenance. Errors are logged by the caller and otherwise ignored.
    async fn periodic_tasks(&self, _ctx: &RequestContext) -> Result<(), ManagerError> {
        Ok(())
    }

    /// Serves a bus-dispatched method the node service does not define itself.
    async fn handle(
        &self,
        method: &str,
        _ctx: RequestContext,
        _args: Value,
    ) -> Result<Value, DispatchError> {
        Err(DispatchError::method_not_found(method))
    }

    /// Resource reconciliation capability, for managers that own node resources.
    fn resource_reconciler(&self) -> Option<&dyn ResourceReconciler> {
        None
    }
}

/// Reconciles the resources a node actually has against the registry.
///
/// Invoked once, synchronously, during `start()`; never on heartbeats.
#[async_trait]
pub trait ResourceReconciler: Send + Sync {
    /// Publishes currently available resources.
    async fn update_available_resource(&self, ctx: &RequestContext) -> Result<(), ManagerError>;
}

/// Manager with no behaviour beyond the defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopManager;

#[async_trait]
impl Manager for NoopManager {}
