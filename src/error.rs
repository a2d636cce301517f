//! Error types used by node services, their collaborators and the launcher.
//!
//! Every enum here mirrors one failure domain:
//!
//! - [`RegistryError`]: the external service registry (record lookups and writes).
//! - [`BusError`]: the message bus (connections and subscriptions).
//! - [`ManagerError`]: faults raised by a [`Manager`](crate::Manager) implementation.
//! - [`DispatchError`]: a bus-delivered call that could not be served.
//! - [`TimerError`]: a periodic timer whose loop ended abnormally.
//! - [`ServiceError`]: node service lifecycle failures.
//! - [`LaunchError`]: OS process supervision failures.
//!
//! All of them provide [`as_label`](ServiceError::as_label), a short stable
//! snake_case label for logs and metrics.
//!
//! Cancellation is not an error: a stopped consumer reports
//! [`WaitOutcome::Cancelled`](crate::WaitOutcome::Cancelled) instead of failing.

use std::io;

use thiserror::Error;

use crate::service::ServiceState;

/// # Errors produced by a service registry.
///
/// `NotFound` is recoverable: the heartbeat and `start` paths recreate the
/// record, `kill` only logs it. `Unavailable` covers everything else
/// (connection refused, storage down, ...).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No record matches the lookup key.
    #[error("service record not found: {key}")]
    NotFound {
        /// Human-readable lookup key (`id=7` or `host/binary`).
        key: String,
    },

    /// The registry could not be reached or refused the operation.
    #[error("registry unavailable: {error}")]
    Unavailable {
        /// The underlying error message.
        error: String,
    },
}

impl RegistryError {
    /// Shorthand for a `NotFound` error on a record id.
    pub fn not_found_id(id: u64) -> Self {
        RegistryError::NotFound {
            key: format!("id={id}"),
        }
    }

    /// Shorthand for an `Unavailable` error.
    pub fn unavailable(error: impl std::fmt::Display) -> Self {
        RegistryError::Unavailable {
            error: error.to_string(),
        }
    }

    /// True if the record is absent (as opposed to the registry being unreachable).
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::RegistryError;
    ///
    /// assert_eq!(RegistryError::not_found_id(3).as_label(), "registry_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::Unavailable { .. } => "registry_unavailable",
        }
    }
}

/// # Errors produced by the message bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus cannot be reached (connect or subscribe failed).
    #[error("message bus unavailable: {error}")]
    Unavailable {
        /// The underlying error message.
        error: String,
    },

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// A call was published but the consumer went away before replying.
    #[error("no reply for call to {method}")]
    NoReply {
        /// The method that was called.
        method: String,
    },
}

impl BusError {
    /// Shorthand for an `Unavailable` error.
    pub fn unavailable(error: impl std::fmt::Display) -> Self {
        BusError::Unavailable {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Unavailable { .. } => "bus_unavailable",
            BusError::Closed => "bus_closed",
            BusError::NoReply { .. } => "bus_no_reply",
        }
    }
}

/// # Fault raised by a manager implementation.
///
/// From `init_host` it is fatal to the service process; from
/// `periodic_tasks` or a dispatched call it stays the manager's business.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// The manager operation failed.
    #[error("manager failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },
}

impl ManagerError {
    /// Shorthand for a `Failed` error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        ManagerError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::Failed { .. } => "manager_failed",
        }
    }
}

/// # Errors returned to the caller of a bus-dispatched method.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Neither the node service nor its manager defines the method.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// The requested method name.
        method: String,
    },

    /// The arguments could not be decoded for the method.
    #[error("invalid arguments for {method}: {error}")]
    InvalidArgs {
        /// The requested method name.
        method: String,
        /// Decoding failure.
        error: String,
    },

    /// The handler ran and failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl DispatchError {
    /// Shorthand for a `MethodNotFound` error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        DispatchError::MethodNotFound {
            method: method.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::MethodNotFound { .. } => "dispatch_method_not_found",
            DispatchError::InvalidArgs { .. } => "dispatch_invalid_args",
            DispatchError::Manager(_) => "dispatch_manager_failed",
        }
    }
}

/// # Abnormal end of a periodic timer loop.
///
/// Returned by [`PeriodicTimer::wait`](crate::PeriodicTimer::wait). A timer
/// that was simply stopped waits successfully.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The callback returned an error; the timer stopped itself.
    #[error("timer {timer} callback failed: {error}")]
    Failed {
        /// Timer name.
        timer: String,
        /// The callback's error message.
        error: String,
    },

    /// The callback panicked; the timer stopped itself.
    #[error("timer {timer} callback panicked: {info}")]
    Panicked {
        /// Timer name.
        timer: String,
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl TimerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TimerError::Failed { .. } => "timer_failed",
            TimerError::Panicked { .. } => "timer_panicked",
        }
    }
}

/// # Errors produced by the node service lifecycle.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {op} a service in state {state:?}")]
    InvalidState {
        /// The attempted operation.
        op: &'static str,
        /// State at the time of the call.
        state: ServiceState,
    },

    /// No manager was given and none is configured for the topic.
    #[error("no manager configured for topic {topic}")]
    NoManager {
        /// The resolved topic.
        topic: String,
    },

    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A bus operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The manager failed during start-up.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::{ServiceError, ServiceState};
    ///
    /// let err = ServiceError::InvalidState { op: "start", state: ServiceState::Running };
    /// assert_eq!(err.as_label(), "service_invalid_state");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::InvalidState { .. } => "service_invalid_state",
            ServiceError::NoManager { .. } => "service_no_manager",
            ServiceError::Registry(e) => e.as_label(),
            ServiceError::Bus(e) => e.as_label(),
            ServiceError::Manager(e) => e.as_label(),
        }
    }
}

/// # Errors produced while supervising service processes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The process could not be spawned.
    #[error("failed to spawn service {role}: {source}")]
    Spawn {
        /// Service role passed to the child.
        role: String,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// The current executable could not be resolved.
    #[error("cannot resolve current executable: {0}")]
    CurrentExe(#[source] io::Error),

    /// Joining a child process failed.
    #[error("failed to wait for service {role}: {source}")]
    Wait {
        /// Service role of the child.
        role: String,
        /// OS error.
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Spawn { .. } => "launch_spawn_failed",
            LaunchError::CurrentExe(_) => "launch_current_exe",
            LaunchError::Wait { .. } => "launch_wait_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_not_found_is_distinguished() {
        assert!(RegistryError::not_found_id(1).is_not_found());
        assert!(!RegistryError::unavailable("down").is_not_found());
    }

    #[test]
    fn service_error_label_delegates_to_source() {
        let err = ServiceError::from(RegistryError::unavailable("down"));
        assert_eq!(err.as_label(), "registry_unavailable");

        let err = ServiceError::from(ManagerError::failed("boom"));
        assert_eq!(err.as_label(), "manager_failed");
    }

    #[test]
    fn dispatch_error_wraps_manager_error() {
        let err = DispatchError::from(ManagerError::failed("nope"));
        assert_eq!(err.to_string(), "manager failed: nope");
        assert_eq!(err.as_label(), "dispatch_manager_failed");
    }
}
