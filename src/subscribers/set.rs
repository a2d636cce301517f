//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] hands each [`Event`] to every subscriber's lane and
//! returns; a slow subscriber only delays itself.
//!
//! Events keep their order within one lane. There is no ordering across
//! lanes and no retry after an overflow. Subscriber panics come back as
//! `SubscriberPanicked` events.
//!
//! ```text
//! emit(&Event) ─► Arc<Event> ─┬─► lane "log"    ─► drain_lane ─► LogWriter::on_event
//!                             └─► lane "alerts" ─► drain_lane ─► Alerts::on_event
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Bounded queue feeding one subscriber's worker.
struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out of node service events to every registered subscriber.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: JoinSet<()>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Panics and overflows are published on `bus`.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut workers = JoinSet::new();
        let lanes = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let name = sub.name();
                workers.spawn(drain_lane(sub, rx, bus.clone()));
                Lane { name, tx }
            })
            .collect();

        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Queues `event` for every subscriber without waiting on any of them.
    ///
    /// A full or closed lane drops the event for that subscriber and publishes
    /// `SubscriberOverflow`, unless the event is itself an overflow report.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        for lane in &self.lanes {
            let Err(err) = lane.tx.try_send(Arc::clone(&shared)) else {
                continue;
            };
            if shared.kind == EventKind::SubscriberOverflow {
                continue;
            }
            let reason = match err {
                TrySendError::Full(_) => "full",
                TrySendError::Closed(_) => "closed",
            };
            self.bus.publish(Event::subscriber_overflow(lane.name, reason));
        }
    }

    /// Closes every lane and waits until the workers have drained them.
    pub async fn shutdown(mut self) {
        self.lanes.clear();
        while self.workers.join_next().await.is_some() {}
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

async fn drain_lane(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(event) = rx.recv().await {
        let delivered = AssertUnwindSafe(sub.on_event(&event)).catch_unwind().await;
        if let Err(panic) = delivered {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*panic)));
        }
    }
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
