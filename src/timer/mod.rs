//! # Periodic timers.
//!
//! - [`PeriodicTimer`] - cancellable fixed-interval loop on a background task
//! - [`TimerCallback`] - work performed on each firing
//! - [`TimerFn`] - closure-backed callback
//!
//! Timers know nothing about node services; the heartbeat and the manager's
//! periodic tasks are both just callbacks.

mod callback;
mod periodic;

pub use callback::{BoxError, CallbackRef, TickFuture, TimerCallback, TimerFn};
pub use periodic::PeriodicTimer;
