//! # NodeService: lifecycle of one cluster-aware worker.
//!
//! ```text
//! start():
//!   ├─► manager.init_host()                      (error → Stopped, returned)
//!   ├─► registry.find(host, binary) / create      (NotFound → create)
//!   ├─► manager.resource_reconciler()?.update_available_resource()
//!   ├─► bus.connect() ─► ConsumerGroup::subscribe(topic, topic.host, fanout topic)
//!   ├─► spawn consumer task: group.wait(token) ─► drop(group) closes connection
//!   ├─► heartbeat timer      every report_interval   → report_state()
//!   └─► periodic-tasks timer every periodic_interval → periodic_tasks()
//!
//! stop():  cancel consumer, await its exit ─► stop timers ─► move them to draining
//! wait():  join consumer task and every timer (active and draining)
//! kill():  stop() ─► wait() ─► lock heartbeat ─► registry.delete(record)  (NotFound → logged, Ok)
//! ```
//!
//! ## Rules
//! - `start()` is accepted once, from `Created`.
//! - `stop()` never fails and is idempotent; the active timer list is empty afterwards.
//! - Timer and consumer failures are reported as events, never returned by
//!   `stop()` or `wait()`.
//! - Lifecycle, record id and connectivity live behind short synchronous
//!   locks that are never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::select;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::consumer::ConsumerGroup;
use crate::context::RequestContext;
use crate::error::{ManagerError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::manager::{Manager, ManagerFactories};
use crate::registry::Registry;
use crate::rpc::MessageBus;
use crate::service::{Connectivity, ServiceBuilder, ServiceState};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::timer::{BoxError, PeriodicTimer, TimerFn};

pub(crate) const HEARTBEAT_TIMER: &str = "report_state";
pub(crate) const PERIODIC_TIMER: &str = "periodic_tasks";

/// Cheap-to-clone handle to a node service.
#[derive(Clone)]
pub struct NodeService {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) host: String,
    pub(super) binary: String,
    pub(super) topic: String,
    pub(super) label: Arc<str>,
    pub(super) availability_zone: String,
    pub(super) manager: Arc<dyn Manager>,
    pub(super) registry: Arc<dyn Registry>,
    pub(super) bus: Arc<dyn MessageBus>,
    pub(super) report_interval: Option<Duration>,
    pub(super) periodic_interval: Option<Duration>,
    pub(super) events: Bus,
    pub(super) subscribers: Vec<Arc<dyn Subscribe>>,
    pub(super) lifecycle: Mutex<Lifecycle>,
    pub(super) record_id: Mutex<Option<u64>>,
    pub(super) connectivity: Mutex<Connectivity>,
    /// Serialises heartbeats from the timer and from bus calls.
    pub(super) heartbeat: tokio::sync::Mutex<()>,
    pub(super) listener_stop: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.listener_stop.cancel();
    }
}

pub(super) struct Lifecycle {
    pub(super) state: ServiceState,
    consumer: Option<ConsumerTask>,
    timers: Vec<Arc<PeriodicTimer>>,
    draining: Vec<Arc<PeriodicTimer>>,
}

impl Lifecycle {
    pub(super) fn new() -> Self {
        Self {
            state: ServiceState::Created,
            consumer: None,
            timers: Vec::new(),
            draining: Vec::new(),
        }
    }
}

/// Background task running [`ConsumerGroup::wait`].
struct ConsumerTask {
    stop: CancellationToken,
    done: CancellationToken,
}

/// Everything `start()` spawns, installed at once.
struct Started {
    record_id: u64,
    consumer: ConsumerTask,
    timers: Vec<Arc<PeriodicTimer>>,
}

pub(super) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NodeService {
    /// Starts a [`ServiceBuilder`] over the given collaborators.
    pub fn builder(registry: Arc<dyn Registry>, bus: Arc<dyn MessageBus>) -> ServiceBuilder {
        ServiceBuilder::new(registry, bus)
    }

    /// Builds a service with every field defaulted from `config`.
    ///
    /// The binary name comes from the running executable, the topic from the
    /// binary name and the manager from `factories`.
    pub fn create(
        config: ServiceConfig,
        factories: ManagerFactories,
        registry: Arc<dyn Registry>,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Self, ServiceError> {
        ServiceBuilder::new(registry, bus)
            .config(config)
            .factories(factories)
            .build()
    }

    /// Node identity.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Program identity.
    pub fn binary(&self) -> &str {
        &self.inner.binary
    }

    /// Routing namespace.
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// `topic@host`, used in logs and events.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Heartbeat interval (`None` = no heartbeat timer).
    pub fn report_interval(&self) -> Option<Duration> {
        self.inner.report_interval
    }

    /// Periodic-tasks interval (`None` = no periodic timer).
    pub fn periodic_interval(&self) -> Option<Duration> {
        self.inner.periodic_interval
    }

    /// The manager behind this service.
    pub fn manager(&self) -> &Arc<dyn Manager> {
        &self.inner.manager
    }

    /// Registry id of this service's record, once resolved.
    pub fn service_id(&self) -> Option<u64> {
        *lock(&self.inner.record_id)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        lock(&self.inner.lifecycle).state
    }

    /// Registry connectivity as seen by the last heartbeat.
    pub fn connectivity(&self) -> Connectivity {
        *lock(&self.inner.connectivity)
    }

    /// Number of active (not stopped) timers.
    pub fn timer_count(&self) -> usize {
        lock(&self.inner.lifecycle).timers.len()
    }

    /// Receiver of this service's lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub(super) fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(Arc::clone(&self.inner.label))
    }

    pub(super) fn emit(&self, event: Event) {
        self.inner.events.publish(event);
    }

    /// Brings the service up; see the module docs for the sequence.
    ///
    /// A failed start leaves the service `Stopped` with its connection closed.
    pub async fn start(&self) -> Result<(), ServiceError> {
        {
            let mut lc = lock(&self.inner.lifecycle);
            if lc.state != ServiceState::Created {
                return Err(ServiceError::InvalidState {
                    op: "start",
                    state: lc.state,
                });
            }
            lc.state = ServiceState::Starting;
        }
        self.spawn_event_listener();
        self.emit(self.event(EventKind::ServiceStarting).with_reason(env!("CARGO_PKG_VERSION")));

        let started = match self.bring_up().await {
            Ok(started) => started,
            Err(e) => {
                {
                    let mut lc = lock(&self.inner.lifecycle);
                    if lc.state == ServiceState::Starting {
                        lc.state = ServiceState::Stopped;
                    }
                }
                self.emit(self.event(EventKind::ServiceStopped).with_reason(e.to_string()));
                return Err(e);
            }
        };
        self.install(started)
    }

    async fn bring_up(&self) -> Result<Started, ServiceError> {
        let inner = &self.inner;
        inner.manager.init_host().await?;

        let record_id = match inner.registry.find(&inner.host, &inner.binary).await {
            Ok(record) => {
                *lock(&inner.record_id) = Some(record.id);
                record.id
            }
            Err(e) if e.is_not_found() => self.create_record().await?,
            Err(e) => return Err(e.into()),
        };

        if let Some(reconciler) = inner.manager.resource_reconciler() {
            reconciler
                .update_available_resource(&RequestContext::admin())
                .await?;
            self.emit(self.event(EventKind::ResourcesReconciled));
        }

        let connection = inner.bus.connect().await?;
        let group =
            ConsumerGroup::subscribe(connection, &inner.topic, &inner.host, Arc::new(self.clone()))
                .await?;
        let consumer = self.spawn_consumer(group);

        let mut timers = Vec::with_capacity(2);
        if let Some(interval) = inner.report_interval {
            let svc = self.clone();
            timers.push(self.start_timer(HEARTBEAT_TIMER, interval, move || {
                let svc = svc.clone();
                async move {
                    // failures are reported through connectivity events
                    let _ = svc.report_state().await;
                    Ok::<(), BoxError>(())
                }
            }));
        }
        if let Some(interval) = inner.periodic_interval {
            let svc = self.clone();
            timers.push(self.start_timer(PERIODIC_TIMER, interval, move || {
                let svc = svc.clone();
                async move {
                    let _ = svc.periodic_tasks().await;
                    Ok::<(), BoxError>(())
                }
            }));
        }

        Ok(Started {
            record_id,
            consumer,
            timers,
        })
    }

    /// Publishes what `bring_up` spawned, unless a concurrent `stop()` won.
    fn install(&self, started: Started) -> Result<(), ServiceError> {
        let Started {
            record_id,
            consumer,
            timers,
        } = started;

        let mut lc = lock(&self.inner.lifecycle);
        if lc.state != ServiceState::Starting {
            consumer.stop.cancel();
            for timer in &timers {
                timer.stop();
            }
            lc.consumer = Some(consumer);
            lc.draining.extend(timers);
            return Err(ServiceError::InvalidState {
                op: "start",
                state: lc.state,
            });
        }
        lc.state = ServiceState::Running;
        lc.consumer = Some(consumer);
        lc.timers = timers;
        drop(lc);

        self.emit(self.event(EventKind::ServiceStarted).with_record(record_id));
        Ok(())
    }

    fn spawn_consumer(&self, mut group: ConsumerGroup) -> ConsumerTask {
        let task = ConsumerTask {
            stop: CancellationToken::new(),
            done: CancellationToken::new(),
        };
        let stop = task.stop.clone();
        let done = task.done.clone();
        let events = self.inner.events.clone();
        let label = Arc::clone(&self.inner.label);

        tokio::spawn(async move {
            let _done = done.drop_guard();
            let outcome = group.wait(&stop).await;
            drop(group);
            events.publish(
                Event::new(EventKind::ConsumerStopped)
                    .with_service(label)
                    .with_reason(outcome.as_str()),
            );
        });
        task
    }

    fn start_timer<F, Fut>(&self, name: &'static str, interval: Duration, f: F) -> Arc<PeriodicTimer>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let timer = PeriodicTimer::start(name, TimerFn::arc(f), interval, false);
        self.emit(
            self.event(EventKind::TimerStarted)
                .with_timer(name)
                .with_delay(interval),
        );
        Arc::new(timer)
    }

    /// Runs the manager's periodic tasks with an administrative context.
    ///
    /// Errors are published as [`EventKind::PeriodicTasksFailed`] and returned;
    /// the periodic timer discards them.
    pub async fn periodic_tasks(&self) -> Result<(), ManagerError> {
        let result = self
            .inner
            .manager
            .periodic_tasks(&RequestContext::admin())
            .await;
        if let Err(e) = &result {
            self.emit(self.event(EventKind::PeriodicTasksFailed).with_reason(e.to_string()));
        }
        result
    }

    /// Stops consuming and cancels every timer. Never fails; idempotent.
    ///
    /// In-flight timer firings are not interrupted; use [`wait`](Self::wait)
    /// to join them.
    pub async fn stop(&self) {
        let (consumer, timers, was_live) = {
            let mut lc = lock(&self.inner.lifecycle);
            let was_live = !lc.state.is_terminal();
            if was_live {
                lc.state = ServiceState::Stopping;
            }
            (lc.consumer.take(), std::mem::take(&mut lc.timers), was_live)
        };

        if let Some(consumer) = &consumer {
            consumer.stop.cancel();
            consumer.done.cancelled().await;
        }
        for timer in &timers {
            timer.stop();
        }

        let stopped = {
            let mut lc = lock(&self.inner.lifecycle);
            lc.draining.extend(timers);
            if lc.state == ServiceState::Stopping {
                lc.state = ServiceState::Stopped;
                true
            } else {
                false
            }
        };
        if was_live && stopped {
            self.emit(self.event(EventKind::ServiceStopped));
        }
    }

    /// Joins the consumer task and every timer, active or stopped.
    ///
    /// While the service runs this blocks until it is stopped elsewhere.
    /// Timer failures are published as [`EventKind::TimerFailed`], not returned.
    pub async fn wait(&self) {
        let (consumer_done, timers) = {
            let lc = lock(&self.inner.lifecycle);
            let timers: Vec<Arc<PeriodicTimer>> =
                lc.timers.iter().chain(lc.draining.iter()).cloned().collect();
            (lc.consumer.as_ref().map(|c| c.done.clone()), timers)
        };

        if let Some(done) = consumer_done {
            done.cancelled().await;
        }
        for timer in &timers {
            if let Err(e) = timer.wait().await {
                self.emit(
                    self.event(EventKind::TimerFailed)
                        .with_timer(timer.name())
                        .with_reason(e.to_string()),
                );
            }
        }

        let mut lc = lock(&self.inner.lifecycle);
        lc.timers.retain(|t| !timers.iter().any(|j| Arc::ptr_eq(t, j)));
        lc.draining.retain(|t| !timers.iter().any(|j| Arc::ptr_eq(t, j)));
        if lc.consumer.as_ref().is_some_and(|c| c.done.is_cancelled()) {
            lc.consumer = None;
        }
    }

    /// Stops the service, joins in-flight timer firings and destroys its
    /// registry record.
    ///
    /// A record that is already gone is reported as
    /// [`EventKind::KillWithoutRecord`] and is not an error.
    pub async fn kill(&self) -> Result<(), ServiceError> {
        self.stop().await;
        self.wait().await;
        // held until Killed is set so no heartbeat can slip in behind the delete
        let _serial = self.inner.heartbeat.lock().await;

        let record_id = self.service_id();
        let deleted = match record_id {
            Some(id) => self.inner.registry.delete(id).await,
            None => Err(self.missing_record()),
        };
        match deleted {
            Ok(()) => {
                self.emit(self.event(EventKind::ServiceKilled).with_record_opt(record_id));
            }
            Err(e) if e.is_not_found() => {
                self.emit(self.event(EventKind::KillWithoutRecord).with_record_opt(record_id));
            }
            Err(e) => return Err(e.into()),
        }

        *lock(&self.inner.record_id) = None;
        lock(&self.inner.lifecycle).state = ServiceState::Killed;
        Ok(())
    }

    /// Forwards events to the subscribers until the service is dropped.
    fn spawn_event_listener(&self) {
        if self.inner.subscribers.is_empty() {
            return;
        }
        let mut rx = self.inner.events.subscribe();
        let set = SubscriberSet::new(self.inner.subscribers.clone(), self.inner.events.clone());
        let stop = self.inner.listener_stop.clone();

        tokio::spawn(async move {
            loop {
                select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        });
    }
}

impl std::fmt::Debug for NodeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeService")
            .field("host", &self.inner.host)
            .field("binary", &self.inner.binary)
            .field("topic", &self.inner.topic)
            .field("state", &self.state())
            .field("service_id", &self.service_id())
            .finish()
    }
}
