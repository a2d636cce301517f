//! # LocalBus: in-process message bus.
//!
//! Routes [`Envelope`]s between node services living in the same process.
//!
//! ## Routing
//! ```text
//! cast/call("compute")        ──► [queue compute]        ──► one consumer
//! cast/call("compute.node-1") ──► [queue compute.node-1] ──► one consumer
//! fanout_cast("compute")      ──► broadcast ─┬─► fanout subscriber 1
//!                                            └─► fanout subscriber N
//! ```
//!
//! ## Rules
//! - Direct keys are work queues: a message reaches exactly one live
//!   consumer; messages published before anyone consumes are buffered.
//! - Fanout messages reach every fanout subscriber alive at publish time.
//! - Closing a connection ends its subscriptions; queued messages stay.
//! - [`LocalBus::sever`] simulates a dead bus: every subscription ends and
//!   `connect` fails with [`BusError::Unavailable`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::BusError;
use crate::rpc::{Binding, Connection, Delivery, Envelope, MessageBus, Reply, Subscription};

const FANOUT_CAPACITY: usize = 256;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>;

struct WorkQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: SharedReceiver,
}

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<String, WorkQueue>>,
    fanout: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    severed: CancellationToken,
}

impl Inner {
    fn queue_sender(&self, key: &str) -> mpsc::UnboundedSender<Delivery> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(key.to_string())
            .or_insert_with(new_queue)
            .tx
            .clone()
    }

    fn queue_receiver(&self, key: &str) -> SharedReceiver {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&queues.entry(key.to_string()).or_insert_with(new_queue).rx)
    }

    fn fanout_sender(&self, topic: &str) -> broadcast::Sender<Envelope> {
        let mut fanout = self.fanout.lock().unwrap_or_else(PoisonError::into_inner);
        fanout
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(FANOUT_CAPACITY).0)
            .clone()
    }

    fn ensure_live(&self) -> Result<(), BusError> {
        if self.severed.is_cancelled() {
            Err(BusError::unavailable("bus connection lost"))
        } else {
            Ok(())
        }
    }
}

fn new_queue() -> WorkQueue {
    let (tx, rx) = mpsc::unbounded_channel();
    WorkQueue {
        tx,
        rx: Arc::new(tokio::sync::Mutex::new(rx)),
    }
}

/// In-process bus shared by cloning.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

impl LocalBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes to a direct key without waiting for an answer.
    pub fn cast(&self, key: &str, envelope: Envelope) -> Result<(), BusError> {
        self.inner.ensure_live()?;
        self.inner
            .queue_sender(key)
            .send(Delivery::cast(envelope))
            .map_err(|_| BusError::Closed)
    }

    /// Publishes to a direct key and waits for the consumer's reply.
    ///
    /// Fails with [`BusError::NoReply`] if the delivery is dropped unanswered.
    pub async fn call(&self, key: &str, envelope: Envelope) -> Result<Reply, BusError> {
        self.inner.ensure_live()?;
        let method = envelope.method.clone();
        let (tx, rx) = oneshot::channel();
        self.inner
            .queue_sender(key)
            .send(Delivery {
                envelope,
                reply: Some(tx),
            })
            .map_err(|_| BusError::Closed)?;
        rx.await.map_err(|_| BusError::NoReply { method })
    }

    /// Publishes to every fanout subscriber of `topic`.
    ///
    /// Returns how many subscribers received the message.
    pub fn fanout_cast(&self, topic: &str, envelope: Envelope) -> Result<usize, BusError> {
        self.inner.ensure_live()?;
        Ok(self.inner.fanout_sender(topic).send(envelope).unwrap_or(0))
    }

    /// Kills the bus for every connection, present and future.
    ///
    /// Queued messages are discarded, so pending calls fail with `NoReply`.
    pub fn sever(&self) {
        self.inner.severed.cancel();
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// True once [`sever`](Self::sever) was called.
    pub fn is_severed(&self) -> bool {
        self.inner.severed.is_cancelled()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn connect(&self) -> Result<Arc<dyn Connection>, BusError> {
        self.inner.ensure_live()?;
        Ok(Arc::new(LocalConnection {
            inner: Arc::clone(&self.inner),
            closed: CancellationToken::new(),
        }))
    }
}

/// Connection handed out by [`LocalBus`].
struct LocalConnection {
    inner: Arc<Inner>,
    closed: CancellationToken,
}

impl LocalConnection {
    fn direct(&self, key: &str) -> Subscription {
        let state = (
            self.inner.queue_receiver(key),
            self.closed.clone(),
            self.inner.severed.clone(),
        );
        stream::unfold(state, |(rx, closed, severed)| async move {
            let next = select! {
                biased;
                _ = closed.cancelled() => None,
                _ = severed.cancelled() => None,
                delivery = async { rx.lock().await.recv().await } => delivery,
            };
            next.map(|delivery| (delivery, (rx, closed, severed)))
        })
        .boxed()
    }

    fn fanout(&self, topic: &str) -> Subscription {
        let state = (
            self.inner.fanout_sender(topic).subscribe(),
            self.closed.clone(),
            self.inner.severed.clone(),
            topic.to_string(),
        );
        stream::unfold(state, |(mut rx, closed, severed, topic)| async move {
            loop {
                let next = select! {
                    biased;
                    _ = closed.cancelled() => return None,
                    _ = severed.cancelled() => return None,
                    next = rx.recv() => next,
                };
                match next {
                    Ok(envelope) => {
                        return Some((Delivery::cast(envelope), (rx, closed, severed, topic)))
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "fanout subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

#[async_trait]
impl Connection for LocalConnection {
    async fn subscribe(&self, binding: Binding) -> Result<Subscription, BusError> {
        self.inner.ensure_live()?;
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        Ok(if binding.fanout {
            self.fanout(&binding.routing_key)
        } else {
            self.direct(&binding.routing_key)
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
