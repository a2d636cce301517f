//! # Timer callbacks and the function-backed implementation.
//!
//! [`TimerCallback`] produces one fresh future per firing. [`TimerFn`] wraps a
//! closure `F: Fn() -> Fut`, so no hidden state is shared between firings; if a
//! callback needs state, capture an `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use nodevisor::{BoxError, TimerFn, TimerCallback};
//!
//! let tick = TimerFn::arc(|| async {
//!     // do work...
//!     Ok::<(), BoxError>(())
//! });
//! let _fut = tick.tick();
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

/// Error type a callback may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future returned by one firing of a timer callback.
pub type TickFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Shared handle to a timer callback.
pub type CallbackRef = Arc<dyn TimerCallback>;

/// Work performed on every timer firing.
///
/// Returning `Err` stops the timer; the error is reported by
/// [`PeriodicTimer::wait`](crate::PeriodicTimer::wait).
pub trait TimerCallback: Send + Sync + 'static {
    /// Creates the future for one firing.
    fn tick(&self) -> TickFuture;
}

/// Function-backed timer callback.
#[derive(Debug)]
pub struct TimerFn<F> {
    f: F,
}

impl<F> TimerFn<F> {
    /// Creates a new function-backed callback.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the callback and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F, Fut> TimerCallback for TimerFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn tick(&self) -> TickFuture {
        Box::pin((self.f)())
    }
}
