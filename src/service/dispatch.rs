//! Two-tier dispatch: the node service's own methods first, then the manager.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::consumer::Dispatch;
use crate::context::RequestContext;
use crate::error::{DispatchError, ManagerError};
use crate::events::EventKind;
use crate::service::{Connectivity, NodeService, ServiceState};

/// Methods every node service answers itself.
pub const OWN_METHODS: [&str; 3] = ["report_state", "periodic_tasks", "service_info"];

/// Snapshot returned by the `service_info` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub host: String,
    pub binary: String,
    pub topic: String,
    pub state: ServiceState,
    pub connectivity: Connectivity,
    pub service_id: Option<u64>,
    pub timers: usize,
}

impl NodeService {
    /// Current identity and state.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            host: self.host().to_string(),
            binary: self.binary().to_string(),
            topic: self.topic().to_string(),
            state: self.state(),
            connectivity: self.connectivity(),
            service_id: self.service_id(),
            timers: self.timer_count(),
        }
    }

    async fn invoke_own(&self, method: &str) -> Option<Result<Value, DispatchError>> {
        let result: Result<Value, DispatchError> = match method {
            "report_state" => self
                .report_state()
                .await
                .map(|count| json!({ "report_count": count }))
                .map_err(|e| ManagerError::failed(e).into()),
            "periodic_tasks" => self
                .periodic_tasks()
                .await
                .map(|()| Value::Null)
                .map_err(DispatchError::from),
            "service_info" => {
                serde_json::to_value(self.info()).map_err(|e| ManagerError::failed(e).into())
            }
            _ => return None,
        };
        Some(result)
    }
}

#[async_trait]
impl Dispatch for NodeService {
    async fn invoke(
        &self,
        method: &str,
        ctx: RequestContext,
        args: Value,
    ) -> Result<Value, DispatchError> {
        if let Some(result) = self.invoke_own(method).await {
            return result;
        }

        let result = self.inner.manager.handle(method, ctx, args).await;
        match &result {
            Err(DispatchError::MethodNotFound { .. }) => {
                self.emit(self.event(EventKind::MethodNotFound).with_method(method));
            }
            Err(e) => {
                self.emit(
                    self.event(EventKind::CallFailed)
                        .with_method(method)
                        .with_reason(e.to_string()),
                );
            }
            Ok(_) => {}
        }
        result
    }
}
