use serde::{Deserialize, Serialize};

use crate::events::EventKind;

/// Lifecycle of a node service.
///
/// ```text
/// Created ─► Starting ─► Running ─► Stopping ─► Stopped ─► Killed
///               │                                  ▲
///               └──────────── start failed ────────┘
/// ```
/// There is no way back from `Stopped` or `Killed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Killed,
}

impl ServiceState {
    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Created => "created",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Killed => "killed",
        }
    }

    /// True for `Starting` and `Running`, the only states that may create a record.
    pub fn is_live(&self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running)
    }

    /// True for `Stopped` and `Killed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Killed)
    }
}

/// Health of the registry connection as observed by heartbeats.
///
/// Each transition is reported once: entering `Disconnected` publishes
/// [`EventKind::ModelDisconnected`], entering `Connected` again publishes
/// [`EventKind::ModelRecovered`]. Repeated outcomes are silent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Connected,
    Disconnected,
}

impl Connectivity {
    /// Feeds one heartbeat outcome; returns the event to publish on a transition.
    pub(crate) fn observe(&mut self, healthy: bool) -> Option<EventKind> {
        match (*self, healthy) {
            (Connectivity::Connected, false) => {
                *self = Connectivity::Disconnected;
                Some(EventKind::ModelDisconnected)
            }
            (Connectivity::Disconnected, true) => {
                *self = Connectivity::Connected;
                Some(EventKind::ModelRecovered)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_reported_once() {
        let mut c = Connectivity::default();
        assert_eq!(c.observe(true), None);
        assert_eq!(c.observe(false), Some(EventKind::ModelDisconnected));
        assert_eq!(c.observe(false), None);
        assert_eq!(c.observe(false), None);
        assert_eq!(c.observe(true), Some(EventKind::ModelRecovered));
        assert_eq!(c.observe(true), None);
        assert_eq!(c, Connectivity::Connected);
    }

    #[test]
    fn terminal_states() {
        assert!(ServiceState::Stopped.is_terminal());
        assert!(ServiceState::Killed.is_terminal());
        assert!(!ServiceState::Stopping.is_terminal());
        assert_eq!(ServiceState::Running.as_str(), "running");
    }

    #[test]
    fn only_starting_and_running_are_live() {
        assert!(ServiceState::Starting.is_live());
        assert!(ServiceState::Running.is_live());
        assert!(!ServiceState::Stopping.is_live());
        assert!(!ServiceState::Stopped.is_live());
        assert!(!ServiceState::Killed.is_live());
    }
}
