//! Construction of a [`NodeService`] from explicit settings and config defaults.
//!
//! Building has no side effects: the registry and the bus are only touched
//! by `start()`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync;
use tokio_util::sync::CancellationToken;

use crate::config::{bounded_interval, ServiceConfig};
use crate::error::ServiceError;
use crate::events::Bus;
use crate::manager::{Manager, ManagerFactories};
use crate::registry::Registry;
use crate::rpc::MessageBus;
use crate::service::node::{Inner, Lifecycle};
use crate::service::{Connectivity, NodeService};
use crate::subscribers::{LogWriter, Subscribe};

/// Builder for a [`NodeService`].
///
/// Every field left unset is resolved in [`build`](Self::build):
/// - `host` from [`ServiceConfig::host`]
/// - `binary` from the running executable's file name
/// - `topic` from `binary` via [`ServiceConfig::topic_for`]
/// - `manager` from the [`ManagerFactories`] entry for the topic
/// - intervals from the config
pub struct ServiceBuilder {
    config: ServiceConfig,
    registry: Arc<dyn Registry>,
    bus: Arc<dyn MessageBus>,
    host: Option<String>,
    binary: Option<String>,
    topic: Option<String>,
    manager: Option<Arc<dyn Manager>>,
    factories: ManagerFactories,
    report_interval: Option<Duration>,
    periodic_interval: Option<Duration>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    log_writer: bool,
}

impl ServiceBuilder {
    /// Creates a builder with default configuration.
    pub fn new(registry: Arc<dyn Registry>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config: ServiceConfig::default(),
            registry,
            bus,
            host: None,
            binary: None,
            topic: None,
            manager: None,
            factories: ManagerFactories::default(),
            report_interval: None,
            periodic_interval: None,
            subscribers: Vec::new(),
            log_writer: true,
        }
    }

    /// Replaces the configuration used for defaults.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Uses `manager` instead of looking one up by topic.
    pub fn manager(mut self, manager: Arc<dyn Manager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Table consulted when no manager is set explicitly.
    pub fn factories(mut self, factories: ManagerFactories) -> Self {
        self.factories = factories;
        self
    }

    /// Heartbeat interval; `0` disables, otherwise at least one second.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Periodic-tasks interval; `0` disables, otherwise at least one second.
    pub fn periodic_interval(mut self, interval: Duration) -> Self {
        self.periodic_interval = Some(interval);
        self
    }

    /// Adds an event subscriber.
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Does not install the default [`LogWriter`].
    pub fn without_log_writer(mut self) -> Self {
        self.log_writer = false;
        self
    }

    /// Resolves defaults and creates the service in state `Created`.
    ///
    /// No side effects: nothing is registered or connected until `start()`.
    pub fn build(self) -> Result<NodeService, ServiceError> {
        let cfg = self.config;
        let host = self.host.unwrap_or_else(|| cfg.host.clone());
        let binary = self.binary.unwrap_or_else(current_binary);
        let topic = self.topic.unwrap_or_else(|| cfg.topic_for(&binary));

        let manager = match self.manager {
            Some(manager) => manager,
            None => self
                .factories
                .build(&topic, &host)
                .ok_or_else(|| ServiceError::NoManager {
                    topic: topic.clone(),
                })?,
        };

        let report_interval = match self.report_interval {
            Some(interval) => bounded_interval(interval),
            None => cfg.heartbeat_interval(),
        };
        let periodic_interval = match self.periodic_interval {
            Some(interval) => bounded_interval(interval),
            None => cfg.periodic_tasks_interval(),
        };

        let mut subscribers = self.subscribers;
        if self.log_writer {
            subscribers.insert(0, Arc::new(LogWriter::new()));
        }

        let inner = Inner {
            label: format!("{topic}@{host}").into(),
            host,
            binary,
            topic,
            availability_zone: cfg.availability_zone.clone(),
            manager,
            registry: self.registry,
            bus: self.bus,
            report_interval,
            periodic_interval,
            events: Bus::new(cfg.event_capacity_clamped()),
            subscribers,
            lifecycle: Mutex::new(Lifecycle::new()),
            record_id: Mutex::new(None),
            connectivity: Mutex::new(Connectivity::Connected),
            heartbeat: sync::Mutex::new(()),
            listener_stop: CancellationToken::new(),
        };
        Ok(NodeService {
            inner: Arc::new(inner),
        })
    }
}

/// File name of the running executable.
fn current_binary() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
