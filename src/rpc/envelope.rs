//! Bus message types.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::context::RequestContext;
use crate::error::DispatchError;

/// Result of a dispatched call as seen by the caller.
pub type Reply = Result<Value, DispatchError>;

/// One method call travelling over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Method to invoke on the receiving node service.
    pub method: String,
    /// Caller identity.
    pub context: RequestContext,
    /// Keyword arguments as a JSON object (or `null`).
    pub args: Value,
}

impl Envelope {
    /// Envelope carrying an administrative context.
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            context: RequestContext::admin(),
            args,
        }
    }

    /// Replaces the caller context.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// A message handed to a subscriber, with an optional reply channel.
#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    /// Present when the publisher waits for an answer.
    pub reply: Option<oneshot::Sender<Reply>>,
}

impl Delivery {
    /// Delivery nobody waits on.
    pub fn cast(envelope: Envelope) -> Self {
        Self {
            envelope,
            reply: None,
        }
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    /// `topic` or `topic.host` for direct bindings, `topic` for fanout.
    pub routing_key: String,
    /// Every subscriber gets every message instead of one of them.
    pub fanout: bool,
}

impl Binding {
    /// Load-balanced binding on `key`.
    pub fn direct(key: impl Into<String>) -> Self {
        Self {
            routing_key: key.into(),
            fanout: false,
        }
    }

    /// Fanout binding on `topic`.
    pub fn fanout(topic: impl Into<String>) -> Self {
        Self {
            routing_key: topic.into(),
            fanout: true,
        }
    }
}

/// Stream of deliveries for one binding; ends when the connection closes.
pub type Subscription = BoxStream<'static, Delivery>;

/// Routing key addressing one node of a topic.
pub fn node_key(topic: &str, host: &str) -> String {
    format!("{topic}.{host}")
}
