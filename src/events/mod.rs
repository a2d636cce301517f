//! Node service events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by a [`NodeService`](crate::NodeService).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `NodeService` lifecycle, heartbeat, periodic tasks,
//!   consumer dispatch, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the service's event listener (fans out to `SubscriberSet`)
//!   and any receiver from `NodeService::subscribe_events`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
