//! # ConsumerGroup: three subscriptions, one wait, one close.
//!
//! ```text
//!   connection ──► subscribe(direct  "compute")        ─┐
//!              ──► subscribe(direct  "compute.node-1") ─┼─► select_all ─► wait()
//!              ──► subscribe(fanout  "compute")        ─┘        │
//!                                                     per delivery: spawn
//!                                                     target.invoke(method, ctx, args)
//!                                                       └─► reply (if the caller waits)
//! ```
//!
//! ## Rules
//! - `wait()` returns [`WaitOutcome::Cancelled`] when the token fires and
//!   [`WaitOutcome::Drained`] when every subscription has ended.
//! - Handlers run on their own tasks; a slow handler never blocks the
//!   receive loop. Handler panics are caught and answered as manager errors.
//! - `close()` runs once; `Drop` calls it, so the subscriptions and the
//!   connection are released however the owning task ends.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::{select_all, SelectAll};
use futures::{FutureExt, StreamExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::consumer::Dispatch;
use crate::error::{BusError, DispatchError, ManagerError};
use crate::rpc::{node_key, Binding, Connection, Delivery, Subscription};
use crate::subscribers::panic_message;

/// Why [`ConsumerGroup::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The cancellation token fired.
    Cancelled,
    /// All subscriptions ended (connection closed or bus lost).
    Drained,
}

impl WaitOutcome {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitOutcome::Cancelled => "cancelled",
            WaitOutcome::Drained => "drained",
        }
    }
}

/// Subscriptions of one node service on its own connection.
pub struct ConsumerGroup {
    label: Arc<str>,
    bindings: Vec<Binding>,
    connection: Arc<dyn Connection>,
    streams: Option<SelectAll<Subscription>>,
    target: Arc<dyn Dispatch>,
}

impl ConsumerGroup {
    /// Subscribes `topic`, `topic.host` and fanout `topic` on `connection`.
    ///
    /// The group owns the connection from here on: on failure it is closed
    /// before the error is returned.
    pub async fn subscribe(
        connection: Arc<dyn Connection>,
        topic: &str,
        host: &str,
        target: Arc<dyn Dispatch>,
    ) -> Result<Self, BusError> {
        let bindings = vec![
            Binding::direct(topic),
            Binding::direct(node_key(topic, host)),
            Binding::fanout(topic),
        ];

        let mut subscriptions = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            match connection.subscribe(binding.clone()).await {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => {
                    connection.close();
                    return Err(e);
                }
            }
        }
        debug!(topic, host, "consumer group subscribed");

        Ok(Self {
            label: format!("{topic}@{host}").into(),
            bindings,
            connection,
            streams: Some(select_all(subscriptions)),
            target,
        })
    }

    /// Bindings this group consumes, in subscription order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.streams.is_none()
    }

    /// Receives and dispatches deliveries until cancelled or drained.
    pub async fn wait(&mut self, token: &CancellationToken) -> WaitOutcome {
        let Some(streams) = self.streams.as_mut() else {
            return WaitOutcome::Drained;
        };
        loop {
            select! {
                biased;
                _ = token.cancelled() => return WaitOutcome::Cancelled,
                next = streams.next() => match next {
                    Some(delivery) => dispatch(&self.label, &self.target, delivery),
                    None => return WaitOutcome::Drained,
                },
            }
        }
    }

    /// Drops the subscriptions and closes the connection. Runs once.
    pub fn close(&mut self) {
        if self.streams.take().is_some() {
            self.connection.close();
            debug!(service = %self.label, "consumer group closed");
        }
    }
}

impl Drop for ConsumerGroup {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch(label: &Arc<str>, target: &Arc<dyn Dispatch>, delivery: Delivery) {
    let label = Arc::clone(label);
    let target = Arc::clone(target);
    tokio::spawn(async move {
        let Delivery { envelope, reply } = delivery;
        let method = envelope.method;
        let call = target.invoke(&method, envelope.context, envelope.args);
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(DispatchError::Manager(ManagerError::failed(format!(
                "handler panicked: {}",
                panic_message(&*panic)
            )))),
        };

        match reply {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!(service = %label, method = %method, "caller went away before reply");
                }
            }
            None => {
                if let Err(e) = result {
                    warn!(service = %label, method = %method, error = %e, "cast failed");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::rpc::{Envelope, LocalBus, MessageBus};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dispatch for Recorder {
        async fn invoke(
            &self,
            method: &str,
            _ctx: RequestContext,
            args: Value,
        ) -> Result<Value, DispatchError> {
            if method == "explode" {
                panic!("handler exploded");
            }
            self.calls.lock().await.push(method.to_string());
            Ok(args)
        }
    }

    /// Counts `close()` calls on the wrapped connection.
    struct CountingConnection {
        inner: Arc<dyn Connection>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for CountingConnection {
        async fn subscribe(&self, binding: Binding) -> Result<Subscription, BusError> {
            self.inner.subscribe(binding).await
        }
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close();
        }
    }

    async fn group_on(bus: &LocalBus, host: &str, target: Arc<Recorder>) -> ConsumerGroup {
        let conn = bus.connect().await.unwrap();
        ConsumerGroup::subscribe(conn, "compute", host, target).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn subscribes_three_bindings() {
        let bus = LocalBus::new();
        let group = group_on(&bus, "node-1", Arc::default()).await;
        assert_eq!(
            group.bindings(),
            &[
                Binding::direct("compute"),
                Binding::direct("compute.node-1"),
                Binding::fanout("compute"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_and_replies_until_cancelled() {
        let bus = LocalBus::new();
        let target = Arc::new(Recorder::default());
        let mut group = group_on(&bus, "node-1", Arc::clone(&target)).await;

        let token = CancellationToken::new();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { group.wait(&token).await }
        });

        let reply = bus
            .call("compute.node-1", Envelope::new("echo", json!({ "x": 1 })))
            .await
            .unwrap();
        assert_eq!(reply, Ok(json!({ "x": 1 })));

        bus.fanout_cast("compute", Envelope::new("refresh", Value::Null))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        token.cancel();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Cancelled);
        assert_eq!(*target.calls.lock().await, vec!["echo", "refresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_panic_is_answered_as_error() {
        let bus = LocalBus::new();
        let mut group = group_on(&bus, "node-1", Arc::default()).await;
        let token = CancellationToken::new();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { group.wait(&token).await }
        });

        let reply = bus
            .call("compute", Envelope::new("explode", Value::Null))
            .await
            .unwrap();
        assert_eq!(reply.unwrap_err().as_label(), "dispatch_manager_failed");

        token.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn severed_bus_drains_the_group() {
        let bus = LocalBus::new();
        let mut group = group_on(&bus, "node-1", Arc::default()).await;

        bus.sever();
        let outcome = group.wait(&CancellationToken::new()).await;
        assert_eq!(outcome, WaitOutcome::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn close_runs_once_including_drop() {
        let bus = LocalBus::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = Arc::new(CountingConnection {
            inner: bus.connect().await.unwrap(),
            closes: Arc::clone(&closes),
        });

        let mut group = ConsumerGroup::subscribe(conn, "compute", "node-1", Arc::new(Recorder::default()))
            .await
            .unwrap();
        group.close();
        group.close();
        assert!(group.is_closed());
        assert_eq!(group.wait(&CancellationToken::new()).await, WaitOutcome::Drained);
        drop(group);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_waiter_still_closes_connection() {
        let bus = LocalBus::new();
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = Arc::new(CountingConnection {
            inner: bus.connect().await.unwrap(),
            closes: Arc::clone(&closes),
        });
        let mut group = ConsumerGroup::subscribe(conn, "compute", "node-1", Arc::new(Recorder::default()))
            .await
            .unwrap();

        let waiter = tokio::spawn(async move { group.wait(&CancellationToken::new()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
