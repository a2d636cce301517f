//! # PeriodicTimer: restartable fixed-interval callback loop.
//!
//! Runs one [`TimerCallback`] on a background task, once per interval.
//!
//! ## Architecture
//! ```text
//! PeriodicTimer::start() ──► tokio::spawn(run())
//!
//! run():
//!   ├─► if !fire_immediately: sleep(interval)   (cancellable)
//!   └─► loop {
//!         ├─► stop requested?        → exit
//!         ├─► callback.tick().await  (NOT cancellable, panics caught)
//!         │     ├─ Ok   → continue
//!         │     └─ Err  → record TimerError::Failed, exit
//!         └─► sleep(interval)        (cancellable)
//!       }
//!   on exit (any path): `done` token is cancelled → wait() returns
//! ```
//!
//! ## Rules
//! - Firings never overlap; the interval runs from the end of one firing to
//!   the start of the next.
//! - `stop()` only prevents the **next** firing; an in-flight one completes.
//! - `wait()` is the only way to know a prior firing has finished.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::TimerError;
use crate::subscribers::panic_message;
use crate::timer::callback::CallbackRef;

/// Handle to a running (or finished) periodic loop.
///
/// Dropping the handle does **not** stop the loop; call [`stop`](Self::stop).
#[derive(Debug)]
pub struct PeriodicTimer {
    name: Arc<str>,
    interval: Duration,
    stop: CancellationToken,
    done: CancellationToken,
    outcome: Arc<Mutex<Option<TimerError>>>,
}

impl PeriodicTimer {
    /// Schedules `callback` every `interval` on a new task.
    ///
    /// With `fire_immediately = false` the first firing happens after one full
    /// interval. Must be called inside a tokio runtime.
    pub fn start(
        name: impl Into<Arc<str>>,
        callback: CallbackRef,
        interval: Duration,
        fire_immediately: bool,
    ) -> Self {
        let timer = Self {
            name: name.into(),
            interval,
            stop: CancellationToken::new(),
            done: CancellationToken::new(),
            outcome: Arc::new(Mutex::new(None)),
        };

        let run = TimerLoop {
            name: Arc::clone(&timer.name),
            callback,
            interval,
            stop: timer.stop.clone(),
            outcome: Arc::clone(&timer.outcome),
        };
        let done = timer.done.clone();
        tokio::spawn(async move {
            let _done = done.drop_guard();
            run.run(fire_immediately).await;
        });

        timer
    }

    /// Timer name (for logs).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Prevents future firings. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// True until the loop has exited.
    pub fn is_running(&self) -> bool {
        !self.done.is_cancelled()
    }

    /// Waits for the loop to exit and any in-flight firing to complete.
    ///
    /// Returns the error that ended the loop, if the callback failed or
    /// panicked. A loop ended by [`stop`](Self::stop) waits successfully.
    pub async fn wait(&self) -> Result<(), TimerError> {
        self.done.cancelled().await;
        let outcome = match self.outcome.lock() {
            Ok(guard) => Option::clone(&guard),
            Err(poisoned) => Option::clone(&poisoned.into_inner()),
        };
        outcome.map_or(Ok(()), Err)
    }
}

/// State moved into the background task.
struct TimerLoop {
    name: Arc<str>,
    callback: CallbackRef,
    interval: Duration,
    stop: CancellationToken,
    outcome: Arc<Mutex<Option<TimerError>>>,
}

impl TimerLoop {
    async fn run(self, fire_immediately: bool) {
        if !fire_immediately && !self.sleep_interval().await {
            return;
        }

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            let callback = Arc::clone(&self.callback);
            let fired = AssertUnwindSafe(async move { callback.tick().await })
                .catch_unwind()
                .await;
            match fired {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.record(TimerError::Failed {
                        timer: self.name.to_string(),
                        error: e.to_string(),
                    });
                    break;
                }
                Err(panic) => {
                    self.record(TimerError::Panicked {
                        timer: self.name.to_string(),
                        info: panic_message(&*panic),
                    });
                    break;
                }
            }

            if !self.sleep_interval().await {
                break;
            }
        }
    }

    /// Sleeps one interval; returns `false` if stopped meanwhile.
    async fn sleep_interval(&self) -> bool {
        let sleep = time::sleep(self.interval);
        tokio::pin!(sleep);
        select! {
            _ = &mut sleep => true,
            _ = self.stop.cancelled() => false,
        }
    }

    fn record(&self, err: TimerError) {
        match self.outcome.lock() {
            Ok(mut guard) => *guard = Some(err),
            Err(poisoned) => *poisoned.into_inner() = Some(err),
        }
    }
}
