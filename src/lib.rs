//! # nodevisor
//!
//! **Nodevisor** turns a worker implementation (a [`Manager`]) into a
//! long-running, cluster-aware node: it registers itself in a shared
//! [`Registry`], answers calls routed over a message bus, reports liveness on
//! a schedule and runs the manager's periodic maintenance.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                        ┌──────────────────────────────┐
//!                        │ Launcher (one process each)  │
//!                        └──────┬────────────────┬──────┘
//!                               ▼                ▼
//! ┌────────────────────────────────────┐   ┌──────────────┐
//! │ NodeService  (compute@node-1)      │   │ NodeService  │
//! │  - Manager (domain methods)        │   │     ...      │
//! │  - ConsumerGroup                   │   └──────────────┘
//! │      topic / topic.host / fanout   │
//! │  - PeriodicTimer report_state      │──► Registry (ServiceRecord)
//! │  - PeriodicTimer periodic_tasks    │
//! │  - events::Bus ─► SubscriberSet    │──► LogWriter (tracing), custom
//! └────────────────────────────────────┘
//!               ▲
//!   MessageBus ─┘ Envelope { method, context, args }
//! ```
//!
//! ### Lifecycle
//! ```text
//! Created ──start()──► Starting ──► Running ──stop()──► Stopping ──► Stopped ──kill()──► Killed
//!
//! Running:
//!   consumer task: ConsumerGroup::wait(token) ─► invoke(method, ctx, args) per delivery
//!   heartbeat:     registry.get ─► (NotFound: recreate) ─► update(report_count + 1)
//!                  Connected ⇄ Disconnected, each transition reported once
//!   periodic:      manager.periodic_tasks(admin ctx)
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                                  |
//! |-----------------|----------------------------------------------------------|--------------------------------------------|
//! | **Service**     | Lifecycle, heartbeat, two-tier dispatch                  | [`NodeService`], [`ServiceBuilder`]        |
//! | **Managers**    | Domain logic, closure tables, per-topic factories        | [`Manager`], [`Handlers`], [`ManagerFactories`] |
//! | **Bus**         | Connection contract and in-process bus                   | [`MessageBus`], [`LocalBus`]               |
//! | **Registry**    | Record contract and in-memory registry                   | [`Registry`], [`MemoryRegistry`]           |
//! | **Timers**      | Cancellable fixed-interval callbacks                     | [`PeriodicTimer`], [`TimerFn`]             |
//! | **Processes**   | One OS process per service, signal-aware process bodies  | [`Launcher`], [`run_service`], [`serve`]   |
//! | **Events**      | Typed lifecycle events and subscribers                   | [`Event`], [`Subscribe`], [`LogWriter`]    |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nodevisor::{
//!     Dispatch, DispatchError, Handlers, LocalBus, MemoryRegistry, NodeService, RequestContext,
//! };
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(MemoryRegistry::new());
//!     let bus = LocalBus::new();
//!
//!     let manager = Handlers::new()
//!         .on("ping", |_ctx, _args| async { Ok::<_, DispatchError>(json!("pong")) });
//!     let service = NodeService::builder(registry.clone(), Arc::new(bus.clone()))
//!         .host("node-1")
//!         .binary("nodevisor-compute")
//!         .manager(Arc::new(manager))
//!         .report_interval(Duration::from_secs(10))
//!         .build()?;
//!
//!     service.start().await?;
//!     assert_eq!(registry.len().await, 1);
//!
//!     let reply = service.invoke("ping", RequestContext::admin(), json!({})).await?;
//!     assert_eq!(reply, json!("pong"));
//!
//!     service.stop().await;
//!     service.wait().await;
//!     Ok(())
//! }
//! ```

mod config;
mod consumer;
mod context;
mod error;
mod events;
mod manager;
mod registry;
mod service;
mod subscribers;
mod timer;

pub mod launcher;
pub mod rpc;

// ---- Public re-exports ----

pub use config::{ServiceConfig, MIN_INTERVAL};
pub use consumer::{ConsumerGroup, Dispatch, WaitOutcome};
pub use context::RequestContext;
pub use error::{
    BusError, DispatchError, LaunchError, ManagerError, RegistryError, ServiceError, TimerError,
};
pub use events::{Bus, Event, EventKind};
pub use launcher::{run_service, serve, Launcher, ServiceCommand};
pub use manager::{
    decode_args, HandlerFuture, Handlers, Manager, ManagerFactories, ManagerFactory, NoopManager,
    ResourceReconciler,
};
pub use registry::{MemoryRegistry, NewServiceRecord, RecordUpdate, Registry, ServiceRecord};
pub use rpc::{Binding, Connection, Delivery, Envelope, LocalBus, MessageBus};
pub use service::{Connectivity, NodeService, ServiceBuilder, ServiceInfo, ServiceState, OWN_METHODS};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use timer::{BoxError, CallbackRef, PeriodicTimer, TickFuture, TimerCallback, TimerFn};
