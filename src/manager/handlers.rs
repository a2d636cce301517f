//! # Closure-backed manager.
//!
//! [`Handlers`] maps method names to closures `Fn(RequestContext, Value) -> Fut`.
//! Each call creates a fresh future; shared state must be captured explicitly
//! as `Arc<...>`.
//!
//! ## Example
//! ```rust
//! use nodevisor::{decode_args, DispatchError, Handlers};
//! use serde_json::json;
//!
//! let manager = Handlers::new().on("echo", |_ctx, args| async move { Ok::<_, DispatchError>(args) });
//! assert!(manager.has_method("echo"));
//!
//! let n: u64 = decode_args("echo", json!(3)).unwrap();
//! assert_eq!(n, 3);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{DispatchError, ManagerError};
use crate::manager::Manager;

/// Future returned by a method handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, DispatchError>>;

type UnitFuture = BoxFuture<'static, Result<(), ManagerError>>;

type MethodFn = Arc<dyn Fn(RequestContext, Value) -> HandlerFuture + Send + Sync>;
type PeriodicFn = Arc<dyn Fn(RequestContext) -> UnitFuture + Send + Sync>;
type InitFn = Arc<dyn Fn() -> UnitFuture + Send + Sync>;

/// Manager assembled from closures.
#[derive(Clone, Default)]
pub struct Handlers {
    methods: HashMap<String, MethodFn>,
    periodic: Option<PeriodicFn>,
    init: Option<InitFn>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("Handlers")
            .field("methods", &methods)
            .field("periodic", &self.periodic.is_some())
            .field("init", &self.init.is_some())
            .finish()
    }
}

impl Handlers {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bus-callable method, replacing any previous one of that name.
    pub fn on<F, Fut>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        let f: MethodFn = Arc::new(move |ctx: RequestContext, args: Value| -> HandlerFuture {
            Box::pin(f(ctx, args))
        });
        self.methods.insert(method.into(), f);
        self
    }

    /// Sets the periodic-tasks body.
    pub fn on_periodic<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ManagerError>> + Send + 'static,
    {
        let f: PeriodicFn = Arc::new(move |ctx: RequestContext| -> UnitFuture { Box::pin(f(ctx)) });
        self.periodic = Some(f);
        self
    }

    /// Sets the `init_host` body.
    pub fn on_init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ManagerError>> + Send + 'static,
    {
        let f: InitFn = Arc::new(move || -> UnitFuture { Box::pin(f()) });
        self.init = Some(f);
        self
    }

    /// True if `method` is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }
}

#[async_trait]
impl Manager for Handlers {
    async fn init_host(&self) -> Result<(), ManagerError> {
        match &self.init {
            Some(init) => init().await,
            None => Ok(()),
        }
    }

    async fn periodic_tasks(&self, ctx: &RequestContext) -> Result<(), ManagerError> {
        match &self.periodic {
            Some(periodic) => periodic(ctx.clone()).await,
            None => Ok(()),
        }
    }

    async fn handle(
        &self,
        method: &str,
        ctx: RequestContext,
        args: Value,
    ) -> Result<Value, DispatchError> {
        let Some(handler) = self.methods.get(method) else {
            return Err(DispatchError::method_not_found(method));
        };
        handler(ctx, args).await
    }
}

/// Decodes call arguments, mapping failures to [`DispatchError::InvalidArgs`].
pub fn decode_args<T: DeserializeOwned>(method: &str, args: Value) -> Result<T, DispatchError> {
    serde_json::from_value(args).map_err(|e| DispatchError::InvalidArgs {
        method: method.to_string(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct Resize {
        flavor: String,
    }

    #[tokio::test]
    async fn routes_to_registered_method() {
        let manager = Handlers::new().on("resize", |_ctx, args| async move {
            let req: Resize = decode_args("resize", args)?;
            Ok::<_, DispatchError>(json!({ "resized_to": req.flavor }))
        });

        let out = manager
            .handle("resize", RequestContext::admin(), json!({ "flavor": "m1.large" }))
            .await
            .unwrap();
        assert_eq!(out, json!({ "resized_to": "m1.large" }));
    }

    #[tokio::test]
    async fn unknown_method_and_bad_args() {
        let manager = Handlers::new().on("resize", |_ctx, args| async move {
            let _: Resize = decode_args("resize", args)?;
            Ok::<_, DispatchError>(Value::Null)
        });

        let err = manager
            .handle("reboot", RequestContext::admin(), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::method_not_found("reboot"));

        let err = manager
            .handle("resize", RequestContext::admin(), json!({ "size": 3 }))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "dispatch_invalid_args");
    }

    #[tokio::test]
    async fn periodic_and_init_default_to_noop() {
        let manager = Handlers::new();
        assert!(manager.init_host().await.is_ok());
        assert!(manager.periodic_tasks(&RequestContext::admin()).await.is_ok());
        assert!(manager.resource_reconciler().is_none());
    }

    #[tokio::test]
    async fn periodic_body_runs_per_call() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let manager = Handlers::new().on_periodic(move |_ctx| {
            let r = Arc::clone(&r);
            async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ManagerError>(())
            }
        });

        manager.periodic_tasks(&RequestContext::admin()).await.unwrap();
        manager.periodic_tasks(&RequestContext::admin()).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
