//! Bus consumption for one node service.
//!
//! A [`ConsumerGroup`] turns the three subscriptions of a node service into
//! calls on a [`Dispatch`] target.

mod group;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::DispatchError;

pub use group::{ConsumerGroup, WaitOutcome};

/// Receiver of bus-dispatched method calls.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Runs `method`; [`DispatchError::MethodNotFound`] if nobody defines it.
    async fn invoke(
        &self,
        method: &str,
        ctx: RequestContext,
        args: Value,
    ) -> Result<Value, DispatchError>;
}
