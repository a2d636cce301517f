//! # Message bus contract.
//!
//! A node service opens one [`Connection`] through a [`MessageBus`] and
//! subscribes three [`Binding`]s on it (see [`ConsumerGroup`](crate::ConsumerGroup)).
//! Each subscription yields [`Delivery`]s: an [`Envelope`] naming the method
//! plus, for calls, a reply channel.
//!
//! The wire format of a real bus is out of scope here; [`LocalBus`] routes
//! envelopes between services inside one process.

mod connection;
mod envelope;
mod local;

pub use connection::{Connection, MessageBus};
pub use envelope::{node_key, Binding, Delivery, Envelope, Reply, Subscription};
pub use local::LocalBus;
